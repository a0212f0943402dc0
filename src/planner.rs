//! C5 — the resolution planner: turns converged state into the concrete
//! inputs a resolver backend needs, per spec.md's §4.5.
//!
//! Nothing here talks to a resolver; it only builds the `ResolutionPlan`
//! value the driver (C6) hands to one.

use crate::context::Context;
use crate::convergence::LockedState;
use crate::dependency::{Dependency, DependencyKind, VersionReq};
use crate::source::{Source, SourceId, SourceRegistry};
use crate::source_map::{SourceMap, SourceMapError};
use crate::spec::SpecSet;
use crate::unlock::UnlockModel;
use std::collections::HashMap;

/// Synthetic dependency names the metadata source answers for. The `\0`
/// suffix mirrors the original's trick of keeping them out of the
/// ordinary gem namespace so a real gem can never collide with them.
pub const RUBY_METADATA_DEP: &str = "Ruby\0";
pub const RUBYGEMS_METADATA_DEP: &str = "RubyGems\0";
pub const BUNDLER_DEP: &str = "bundler";

/// Everything a `Resolver` needs to drive one resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    /// Which source answers for each gem name, direct and transitive.
    pub source_requirements: HashMap<String, SourceId>,
    /// Source used for any name with no explicit entry.
    pub default_source: SourceId,
    /// Dependencies to resolve from: the manifest's declared list plus the
    /// synthetic `Ruby\0`/`RubyGems\0` metadata dependencies (pinned to the
    /// running ruby/rubygems version, so any candidate's own constraint on
    /// them is checked by the solver) and, when bundler itself is being
    /// unlocked to a target version, a prepended `bundler` constraint.
    pub dependencies: Vec<Dependency>,
    /// Version floors for specs that were in the original locked set but
    /// got dropped during convergence/validation, preventing an
    /// unrelated transitive dependency from quietly downgrading.
    pub base_requirements: HashMap<String, VersionReq>,
    /// Platform set the resolved spec set must cover.
    pub platforms: Vec<String>,
    /// Final expanded unlock set (gem names the resolver is free to
    /// repin regardless of what's locked).
    pub unlock_gems: Vec<String>,
    /// The locked set as it stood before convergence mutated it, passed
    /// through as a resolver hint (e.g. to prefer already-locked
    /// versions when nothing forces a change).
    pub locked_specs: SpecSet,
    /// Versions the driver has already tried and found platform-incomplete,
    /// keyed by gem name. `Driver::materialize`'s retry loop populates this
    /// between resolve attempts so the next attempt can't just pick the
    /// same incomplete version again and spin forever.
    pub excluded_versions: HashMap<String, Vec<semver::Version>>,
}

pub struct Planner<'a> {
    registry: &'a mut SourceRegistry,
}

impl<'a> Planner<'a> {
    #[must_use]
    pub fn new(registry: &'a mut SourceRegistry) -> Self {
        Self { registry }
    }

    /// Builds a `ResolutionPlan` from converged state. `original_locked_specs`
    /// is the pre-convergence snapshot (for `base_requirements`);
    /// `locked` is the post-convergence/validation state.
    pub fn plan(
        &mut self,
        locked: &LockedState,
        original_locked_specs: &SpecSet,
        declared_dependencies: &[Dependency],
        context: &Context,
        unlock: &UnlockModel,
    ) -> Result<ResolutionPlan, SourceMapError> {
        let default_source = locked.sources.first().copied().unwrap_or_else(|| {
            self.registry.intern(Source::Rubygems {
                remotes: vec![crate::DEFAULT_GEM_SOURCE.to_string()],
            })
        });

        let mut explicit = HashMap::new();
        for dep in declared_dependencies {
            if let Some(source) = dep.source {
                if let Some(existing) = explicit.get(&dep.name) {
                    if *existing != source {
                        return Err(SourceMapError::AmbiguousSource(dep.name.clone()));
                    }
                }
                explicit.insert(dep.name.clone(), source);
            }
        }

        let source_map = SourceMap::build(&explicit, &locked.specs, default_source)?;
        let mut source_requirements = source_map.all_requirements;
        if context.prefer_local {
            for (name, source) in &source_map.locked_requirements {
                source_requirements.entry(name.clone()).or_insert(*source);
            }
        }

        // The synthetic Ruby\0/RubyGems\0/bundler names always route to the
        // metadata source (spec.md §4.5), regardless of what the manifest's
        // own sources cover.
        let metadata_source = self.registry.intern(Source::Metadata);
        source_requirements.insert(RUBY_METADATA_DEP.to_string(), metadata_source);
        source_requirements.insert(RUBYGEMS_METADATA_DEP.to_string(), metadata_source);
        source_requirements.insert(BUNDLER_DEP.to_string(), metadata_source);

        let base_requirements = Self::base_requirements(original_locked_specs, &locked.specs, self.registry);

        let mut dependencies = declared_dependencies.to_vec();
        dependencies.extend(Self::metadata_dependencies(
            context.runtime.ruby_version.as_deref(),
            context.runtime.rubygems_version.as_deref(),
        ));
        if let Some(version) = &unlock.bundler {
            if let Ok(req) = VersionReq::parse(&format!("= {version}")) {
                let mut dep = Dependency::new(BUNDLER_DEP, req);
                dep.kind = DependencyKind::Runtime;
                dependencies.insert(0, dep);
            }
        }

        Ok(ResolutionPlan {
            source_requirements,
            default_source,
            dependencies,
            base_requirements,
            platforms: locked.platforms.clone(),
            unlock_gems: unlock.gems.iter().cloned().collect(),
            locked_specs: locked.specs.clone(),
            excluded_versions: HashMap::new(),
        })
    }

    /// A floor requirement for every spec the original lockfile carried
    /// that convergence/validation has since dropped, skipping path
    /// sources (a local checkout has no meaningful version floor).
    fn base_requirements(
        original: &SpecSet,
        current: &SpecSet,
        registry: &SourceRegistry,
    ) -> HashMap<String, VersionReq> {
        let mut floors = HashMap::new();
        for spec in original.iter() {
            if current.lookup(&spec.name, &spec.version, &spec.platform).is_some() {
                continue;
            }
            if matches!(registry.get(spec.source), Source::Path { .. } | Source::Gemspec { .. }) {
                continue;
            }
            let Ok(floor) = VersionReq::parse(&format!(">= {}", spec.version)) else {
                continue;
            };
            floors.insert(spec.name.clone(), floor);
        }
        floors
    }

    /// The extra dependencies `plan` mixes into the resolver's dependency
    /// list for ruby/rubygems metadata: each known version becomes an exact
    /// pin on its `\0`-suffixed synthetic name, so any real gem's own
    /// constraint on that name gets checked against the version actually
    /// running rather than left unenforced.
    #[must_use]
    pub fn metadata_dependencies(ruby_version: Option<&str>, rubygems_version: Option<&str>) -> Vec<Dependency> {
        let mut deps = Vec::new();
        if let Some(version) = ruby_version {
            if let Ok(req) = VersionReq::parse(version) {
                let mut dep = Dependency::new(RUBY_METADATA_DEP, req);
                dep.kind = DependencyKind::Runtime;
                deps.push(dep);
            }
        }
        if let Some(version) = rubygems_version {
            if let Ok(req) = VersionReq::parse(version) {
                let mut dep = Dependency::new(RUBYGEMS_METADATA_DEP, req);
                dep.kind = DependencyKind::Runtime;
                deps.push(dep);
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::spec::Spec;
    use semver::Version;

    #[test]
    fn plan_defaults_to_first_locked_source() {
        let mut registry = SourceRegistry::new();
        let src = registry.intern(Source::Rubygems {
            remotes: vec!["https://rubygems.org".to_string()],
        });
        let locked = LockedState {
            sources: vec![src],
            ..LockedState::empty()
        };
        let mut planner = Planner::new(&mut registry);
        let plan = planner
            .plan(
                &locked,
                &SpecSet::new(),
                &[Dependency::new("rack", VersionReq::any())],
                &Context::default(),
                &UnlockModel::from_input(crate::unlock::UnlockInput::None, None, None),
            )
            .unwrap();
        assert_eq!(plan.default_source, src);
    }

    #[test]
    fn base_requirements_floor_dropped_specs() {
        let mut registry = SourceRegistry::new();
        let src = registry.intern(Source::Rubygems {
            remotes: vec!["https://rubygems.org".to_string()],
        });
        let mut original = SpecSet::new();
        original.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src));

        let current = SpecSet::new();
        let floors = Planner::base_requirements(&original, &current, &registry);
        assert!(floors.get("rack").unwrap().matches(&Version::new(3, 0, 8)));
        assert!(!floors.get("rack").unwrap().matches(&Version::new(2, 9, 0)));
    }

    #[test]
    fn conflicting_explicit_sources_for_one_gem_are_ambiguous() {
        let mut registry = SourceRegistry::new();
        let a = registry.intern(Source::Rubygems {
            remotes: vec!["https://rubygems.org".to_string()],
        });
        let b = registry.intern(Source::Rubygems {
            remotes: vec!["https://gems.example.com".to_string()],
        });
        let locked = LockedState {
            sources: vec![a],
            ..LockedState::empty()
        };

        let mut first = Dependency::new("rack", VersionReq::any());
        first.source = Some(a);
        let mut second = Dependency::new("rack", VersionReq::any());
        second.source = Some(b);

        let mut planner = Planner::new(&mut registry);
        let result = planner.plan(
            &locked,
            &SpecSet::new(),
            &[first, second],
            &Context::default(),
            &UnlockModel::from_input(crate::unlock::UnlockInput::None, None, None),
        );
        assert!(matches!(result, Err(SourceMapError::AmbiguousSource(_))));
    }

    #[test]
    fn base_requirements_skip_path_sources() {
        let mut registry = SourceRegistry::new();
        let src = registry.intern(Source::Path {
            path: "/vendor/rack".into(),
        });
        let mut original = SpecSet::new();
        original.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src));

        let floors = Planner::base_requirements(&original, &SpecSet::new(), &registry);
        assert!(floors.is_empty());
    }
}
