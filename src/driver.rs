//! C6 — the resolver driver: decides whether the resolver needs to run at
//! all, invokes it when it does, and loops on platform-incomplete results
//! per spec.md's §4.6 pseudocode.

use crate::context::Context;
use crate::convergence::{ChangeFlags, LockedState};
use crate::dependency::Dependency;
use crate::planner::{Planner, BUNDLER_DEP};
use crate::resolver::{Resolver, ResolverError};
use crate::source::{Source, SourceRegistry};
use crate::spec::{MaterializedSet, Spec, SpecSet};
use crate::unlock::UnlockModel;
use std::collections::{HashMap, HashSet};

/// A resolution attempt that made no progress twice in a row cannot
/// possibly converge; bail out rather than spin. spec.md's termination
/// argument bounds this by `|incomplete|`, so in practice this is never
/// reached — it exists purely as a backstop against a buggy `Resolver`
/// impl that keeps returning the same incomplete set.
const MAX_INCOMPLETE_ITERATIONS: usize = 64;

pub struct Driver<'a> {
    resolver: &'a dyn Resolver,
}

impl<'a> Driver<'a> {
    #[must_use]
    pub fn new(resolver: &'a dyn Resolver) -> Self {
        Self { resolver }
    }

    /// Decides among the three outcomes spec.md's §4.6 `resolve()`
    /// describes: reuse the locked set verbatim, reuse a filtered subset,
    /// or invoke the resolver. A dependency merely deleted from the
    /// manifest doesn't set `dependency_changes` (that's convergence step
    /// 5's job, spec.md §4.3), so it's detected here directly against
    /// `original_locked_dependencies` and handled with the same cheap
    /// filtered-reuse path as a new platform, never a full resolve.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        locked: &mut LockedState,
        flags: &ChangeFlags,
        unlock: &UnlockModel,
        declared_dependencies: &[Dependency],
        original_locked_dependencies: &[Dependency],
        context: &Context,
        registry: &mut SourceRegistry,
        original_locked_specs: &SpecSet,
        may_include_redundant_platform_specific_gems: bool,
    ) -> Result<SpecSet, ResolverError> {
        if context.frozen {
            return Ok(locked.specs.clone());
        }

        let deleted_deps = original_locked_dependencies
            .iter()
            .any(|dep| !declared_dependencies.iter().any(|d| d.name == dep.name));

        let no_resolve_needed = flags.nothing_changed() && !unlock.is_unlocking();
        if no_resolve_needed {
            if flags.new_platform || may_include_redundant_platform_specific_gems || deleted_deps {
                return Ok(Self::filter_to_declared(&locked.specs, declared_dependencies, &locked.platforms));
            }
            return Ok(locked.specs.clone());
        }

        self.start_resolution(locked, declared_dependencies, context, registry, unlock, original_locked_specs)
    }

    fn filter_to_declared(specs: &SpecSet, declared: &[Dependency], platforms: &[String]) -> SpecSet {
        let materialized = specs.for_dependencies(declared, &[], platforms);
        let mut result = SpecSet::new();
        for spec in materialized.specs {
            result.insert(spec);
        }
        result
    }

    fn start_resolution(
        &self,
        locked: &mut LockedState,
        declared_dependencies: &[Dependency],
        context: &Context,
        registry: &mut SourceRegistry,
        unlock: &UnlockModel,
        original_locked_specs: &SpecSet,
    ) -> Result<SpecSet, ResolverError> {
        let mut planner = Planner::new(registry);
        let plan = planner.plan(locked, original_locked_specs, declared_dependencies, context, unlock)?;

        crate::debug::debug_log(&format!(
            "driver: invoking resolver for {} dependencies across platforms {:?}",
            plan.dependencies.len(),
            plan.platforms,
        ));
        let resolved = self.resolver.start(&plan)?;
        let mut set = SpecSet::new();
        for spec in resolved {
            set.insert(spec);
        }

        if let Some(bundler_spec) = set.get(BUNDLER_DEP).first() {
            locked.bundler_version = Some(bundler_spec.version.to_string());
        }

        Ok(Self::filter_to_declared(&set, declared_dependencies, &locked.platforms))
    }

    /// Materializes `deps` against `resolved`, per spec.md's §4.6
    /// `materialize()` pseudocode: fail loudly on anything genuinely
    /// missing, keep re-resolving around platform-incomplete specs until
    /// either everything checks out or two successive attempts produce
    /// the identical incomplete set (which can't converge, so we raise
    /// instead of looping forever), and inject the metadata `bundler`
    /// pseudo-spec the lockfile's `BUNDLED WITH` section needs before
    /// returning.
    #[allow(clippy::too_many_arguments)]
    pub fn materialize(
        &self,
        mut resolved: SpecSet,
        declared_dependencies: &[Dependency],
        groups: &[String],
        platforms: &[String],
        remote: bool,
        locked_specs: &SpecSet,
        context: &Context,
        registry: &mut SourceRegistry,
        unlock: &UnlockModel,
        original_locked_specs: &SpecSet,
        bundler_version: Option<&str>,
    ) -> Result<MaterializedSet, ResolverError> {
        let mut materialized = resolved.for_dependencies(declared_dependencies, groups, platforms);

        if !materialized.missing.is_empty() {
            return Err(Self::missing_specs_error(&materialized.missing, locked_specs, remote));
        }

        let mut previous_incomplete = identity_set(&materialized.incomplete);
        let mut excluded_versions: HashMap<String, Vec<semver::Version>> = HashMap::new();
        let mut iterations = 0;
        while !materialized.incomplete.is_empty() {
            if iterations >= MAX_INCOMPLETE_ITERATIONS {
                return Err(ResolverError::ResolutionFailed {
                    message: "gave up retrying incomplete platform-specific specs".to_string(),
                });
            }
            iterations += 1;

            crate::debug::debug_log(&format!(
                "driver: re-resolving around {} platform-incomplete spec(s), attempt {iterations}",
                materialized.incomplete.len(),
            ));

            for incomplete in &materialized.incomplete {
                resolved.remove_spec(&incomplete.name, &incomplete.version, &incomplete.platform);
                excluded_versions
                    .entry(incomplete.name.clone())
                    .or_default()
                    .push(incomplete.version.clone());
            }

            let mut planner = Planner::new(registry);
            let mut plan = planner.plan(
                &LockedState {
                    specs: resolved.clone(),
                    platforms: platforms.to_vec(),
                    ..LockedState::empty()
                },
                original_locked_specs,
                declared_dependencies,
                context,
                unlock,
            )?;
            for incomplete in &materialized.incomplete {
                plan.base_requirements.remove(&incomplete.name);
            }
            plan.excluded_versions = excluded_versions.clone();

            let next_resolved = self.resolver.start(&plan)?;
            resolved = SpecSet::new();
            for spec in next_resolved {
                resolved.insert(spec);
            }

            let next_materialized = resolved.for_dependencies(declared_dependencies, groups, platforms);
            let next_incomplete = identity_set(&next_materialized.incomplete);
            if next_incomplete == previous_incomplete {
                return Err(ResolverError::ResolutionFailed {
                    message: "could not find specs for every requested platform".to_string(),
                });
            }
            previous_incomplete = next_incomplete;
            materialized = next_materialized;
        }

        if let Some(version) = bundler_version {
            if let Ok(parsed) = semver::Version::parse(version) {
                let metadata_source = registry.intern(Source::Metadata);
                materialized.specs.push(Spec::new(BUNDLER_DEP, parsed, "ruby", metadata_source));
            }
        }

        Ok(materialized)
    }

    fn missing_specs_error(missing: &[Dependency], locked_specs: &SpecSet, remote: bool) -> ResolverError {
        if remote {
            for dep in missing {
                if let Some(locked_spec) = locked_specs.get(&dep.name).first() {
                    return ResolverError::GemNotFound {
                        message: format!(
                            "The author of {} {} has removed it. Could not resolve this gem, try unlocking it.",
                            locked_spec.name, locked_spec.version
                        ),
                    };
                }
            }
        }
        let names: Vec<&str> = missing.iter().map(|d| d.name.as_str()).collect();
        ResolverError::GemNotFound {
            message: format!("Could not find gems {names:?} in any of the sources"),
        }
    }
}

fn identity_set(specs: &[Spec]) -> HashSet<(String, String, String)> {
    specs
        .iter()
        .map(|s| (s.name.clone(), s.version.to_string(), s.platform.clone()))
        .collect()
}
