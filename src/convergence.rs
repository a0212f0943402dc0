//! C3 — the convergence engine: folds the locked state and the freshly
//! declared manifest together, step by step, recording every difference
//! that matters for the "do we need to re-resolve?" decision in
//! `ChangeFlags`.
//!
//! Each step is a pure function `LockedState -> (LockedState, ChangeFlags)`
//! the way the design notes recommend, folded together by `Convergence::run`
//! in a fixed order. Flags are only ever ORed in — once a step sets one, a
//! later step must not clear it.

use crate::context::Context;
use crate::dependency::Dependency;
use crate::source::{Source, SourceId, SourceRegistry};
use crate::spec::SpecSet;
use crate::unlock::UnlockModel;

/// State carried across convergence, validation, and planning. The facade
/// owns exactly one of these during a `build`, mutating it step by step;
/// afterwards it's read-only until the next `build`.
#[derive(Debug, Clone)]
pub struct LockedState {
    pub sources: Vec<SourceId>,
    pub dependencies: Vec<Dependency>,
    pub specs: SpecSet,
    pub platforms: Vec<String>,
    pub ruby_version: Option<String>,
    pub bundler_version: Option<String>,
}

impl LockedState {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            dependencies: Vec::new(),
            specs: SpecSet::new(),
            platforms: Vec::new(),
            ruby_version: None,
            bundler_version: None,
        }
    }
}

/// Every reason convergence or validation found to believe the lockfile no
/// longer matches reality. Booleans are monotonic: once a step sets one,
/// nothing clears it for the rest of the `build`.
#[derive(Debug, Clone, Default)]
pub struct ChangeFlags {
    pub source_changes: bool,
    pub dependency_changes: bool,
    pub path_changes: bool,
    pub local_changes: bool,
    pub new_platform: bool,
    pub unlocking_bundler: bool,
    pub missing_lockfile_dep: Option<String>,
    pub invalid_lockfile_dep: Option<String>,
}

impl ChangeFlags {
    pub fn merge(&mut self, other: &Self) {
        self.source_changes |= other.source_changes;
        self.dependency_changes |= other.dependency_changes;
        self.path_changes |= other.path_changes;
        self.local_changes |= other.local_changes;
        self.new_platform |= other.new_platform;
        self.unlocking_bundler |= other.unlocking_bundler;
        if self.missing_lockfile_dep.is_none() {
            self.missing_lockfile_dep = other.missing_lockfile_dep.clone();
        }
        if self.invalid_lockfile_dep.is_none() {
            self.invalid_lockfile_dep = other.invalid_lockfile_dep.clone();
        }
    }

    /// The six conditions that together decide whether re-resolution can
    /// be skipped: the five structural booleans plus "the lockfile no
    /// longer validates against the manifest" (missing or invalid locked
    /// dependency), folded into one condition.
    #[must_use]
    pub fn nothing_changed(&self) -> bool {
        !self.source_changes
            && !self.dependency_changes
            && !self.path_changes
            && !self.local_changes
            && !self.new_platform
            && self.missing_lockfile_dep.is_none()
            && self.invalid_lockfile_dep.is_none()
    }
}

/// Capability the convergence engine needs from a source backend: whether
/// a declared source's available specs differ from what's locked. Real
/// fetches (hitting an index, checking a git remote, stat-ing a path) are
/// the caller's concern; errors here are swallowed and treated as "no
/// change" per the error handling rules, since a transient network/FS
/// failure shouldn't force an unwanted re-resolution.
pub trait SourceBackend {
    fn specs_changed(&self, declared: &Source, locked: Option<&Source>) -> Result<bool, String>;
}

/// A backend that never reports a change, useful for tests and for
/// offline/frozen-mode convergence where re-checking would be pointless.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticBackend;

impl SourceBackend for StaticBackend {
    fn specs_changed(&self, _declared: &Source, _locked: Option<&Source>) -> Result<bool, String> {
        Ok(false)
    }
}

pub struct Convergence<'a> {
    pub registry: &'a mut SourceRegistry,
    pub backend: &'a dyn SourceBackend,
}

impl<'a> Convergence<'a> {
    #[must_use]
    pub fn new(registry: &'a mut SourceRegistry, backend: &'a dyn SourceBackend) -> Self {
        Self { registry, backend }
    }

    /// Runs the fixed seven-step convergence process and returns the
    /// updated locked state plus every flag any step set.
    pub fn run(
        &mut self,
        mut locked: LockedState,
        declared_sources: &[SourceId],
        declared_dependencies: &[Dependency],
        context: &Context,
        unlock: &mut UnlockModel,
    ) -> (LockedState, ChangeFlags) {
        let mut flags = ChangeFlags::default();

        self.step1_promote_path_sources(&mut locked, declared_sources);
        flags.merge(&self.step2_detect_path_changes(&locked, declared_sources));
        flags.merge(&self.step3_source_convergence(&mut locked, declared_sources));
        self.step4_unlock_expansion(&locked, declared_dependencies, unlock);
        flags.merge(&self.step5_dependency_convergence(&mut locked, declared_dependencies));
        flags.merge(&self.step6_local_overrides(&mut locked, context));
        flags.merge(&self.step7_platform_adjustment(&mut locked, context));

        crate::debug::debug_log(&format!(
            "convergence: nothing_changed={} source_changes={} dependency_changes={} path_changes={} local_changes={} new_platform={} unlocking_bundler={}",
            flags.nothing_changed(),
            flags.source_changes,
            flags.dependency_changes,
            flags.path_changes,
            flags.local_changes,
            flags.new_platform,
            flags.unlocking_bundler,
        ));

        (locked, flags)
    }

    /// Step 1: a locked `Path` source whose directory the manifest now
    /// references via a `gemspec` directive is promoted in place to a
    /// `Gemspec` source, so step 3 compares it against the declared source
    /// by its new identity instead of flagging an unrelated source change.
    /// No filesystem access here; whether a directory actually carries a
    /// gemspec was already decided by whoever parsed the manifest.
    fn step1_promote_path_sources(&mut self, locked: &mut LockedState, declared_sources: &[SourceId]) {
        let mut promotions: Vec<(SourceId, Source)> = Vec::new();
        for declared_id in declared_sources {
            let declared = self.registry.get(*declared_id).clone();
            let Source::Gemspec { path, .. } = &declared else {
                continue;
            };
            for locked_id in &locked.sources {
                if let Source::Path { path: locked_path } = self.registry.get(*locked_id) {
                    if locked_path == path {
                        promotions.push((*locked_id, declared.clone()));
                    }
                }
            }
        }
        for (id, source) in promotions {
            *self.registry.get_mut(id) = source;
        }
    }

    /// Step 2: every manifest path/gemspec source is paired with its locked
    /// counterpart at the same path (or `None` if the manifest just added
    /// it) and handed to the backend, which covers all three
    /// `specs_changed?` cases: no locked counterpart, a diverged dependency
    /// list, or a diverged spec index.
    fn step2_detect_path_changes(&self, locked: &LockedState, declared_sources: &[SourceId]) -> ChangeFlags {
        let mut flags = ChangeFlags::default();
        for declared_id in declared_sources {
            let declared = self.registry.get(*declared_id);
            let declared_path = match declared {
                Source::Path { path } => path,
                Source::Gemspec { path, .. } => path,
                _ => continue,
            };
            let locked_match = locked.sources.iter().find_map(|locked_id| {
                let candidate = self.registry.get(*locked_id);
                let candidate_path = match candidate {
                    Source::Path { path } | Source::Gemspec { path, .. } => path,
                    _ => return None,
                };
                (candidate_path == declared_path).then_some(candidate)
            });
            if self.backend.specs_changed(declared, locked_match).unwrap_or(false) {
                flags.path_changes = true;
            }
        }
        flags
    }

    /// Step 3: compares the declared source list against the locked one.
    /// A declared source not covered by any locked source, or a locked
    /// source whose backend reports changed specs, sets `source_changes`.
    fn step3_source_convergence(
        &mut self,
        locked: &mut LockedState,
        declared_sources: &[SourceId],
    ) -> ChangeFlags {
        let mut flags = ChangeFlags::default();

        for declared_id in declared_sources {
            let declared = self.registry.get(*declared_id).clone();
            let covered = locked
                .sources
                .iter()
                .any(|locked_id| self.registry.get(*locked_id).includes(&declared));
            if !covered {
                flags.source_changes = true;
            }
        }

        for locked_id in &locked.sources {
            let locked_source = self.registry.get(*locked_id);
            if self
                .backend
                .specs_changed(locked_source, Some(locked_source))
                .unwrap_or(false)
            {
                flags.source_changes = true;
            }
        }

        locked.sources = declared_sources.to_vec();
        flags
    }

    /// Step 4: in conservative mode every declared dependency becomes
    /// unlocked outright; otherwise the gems the caller named are expanded
    /// through the locked dependency graph so unlocking a gem also
    /// unlocks whatever it depends on, the way `UnlockModel::
    /// expand_transitively` does for the standalone unlock-model API.
    fn step4_unlock_expansion(
        &self,
        locked: &LockedState,
        declared_dependencies: &[Dependency],
        unlock: &mut UnlockModel,
    ) {
        if unlock.conservative {
            unlock.gems = declared_dependencies.iter().map(|d| d.name.clone()).collect();
            return;
        }
        unlock.expand_transitively(&locked.specs);
    }

    /// Step 5: compares each *declared* dependency against the locked
    /// dependency list by the `Dependency` equality predicate (which
    /// deliberately ignores `kind`), per spec.md §4.3: a declared dep that
    /// mismatches or has no locked counterpart sets `dependency_changes`.
    /// A dep simply *removed* from the manifest does not set this flag —
    /// the driver's cheap filtered-reuse path (spec.md §4.6) handles that
    /// case without forcing a full re-resolve.
    fn step5_dependency_convergence(
        &self,
        locked: &mut LockedState,
        declared_dependencies: &[Dependency],
    ) -> ChangeFlags {
        let mut flags = ChangeFlags::default();

        let added_or_changed = declared_dependencies
            .iter()
            .any(|dep| !locked.dependencies.contains(dep));

        if added_or_changed {
            flags.dependency_changes = true;
        }

        locked.dependencies = declared_dependencies.to_vec();
        flags
    }

    /// Step 6: `bundle config local.<gem> <path>` overrides are applied
    /// directly to the registry entries the locked sources point at.
    fn step6_local_overrides(&mut self, locked: &mut LockedState, context: &Context) -> ChangeFlags {
        let mut flags = ChangeFlags::default();
        for id in &locked.sources {
            let source = self.registry.get(*id).clone();
            if !source.supports_local_override() {
                continue;
            }
            let name = source.label();
            if let Some(path) = context.local_overrides.get(&name) {
                if self.registry.get_mut(*id).apply_local_override(path.clone()) {
                    flags.local_changes = true;
                }
            }
        }
        flags
    }

    /// Step 7, per spec.md §4.3: if not frozen and the current runtime
    /// platform isn't already covered, add it (`new_platform`). Frozen
    /// mode forbids mutating locked state at all, so this whole step is a
    /// no-op under it — the platform list is exactly what the lockfile
    /// said, even if that leaves the running platform uncovered.
    ///
    /// Conversely: if the locked platform list still carries the generic
    /// `ruby` platform alongside a platform-specific runtime, and some
    /// locked spec only has a `ruby`-platform variant with no counterpart
    /// for the current platform, `ruby` is dropped and the current
    /// platform re-added — otherwise resolution would keep treating specs
    /// the running platform can't actually use as satisfying coverage.
    fn step7_platform_adjustment(&self, locked: &mut LockedState, context: &Context) -> ChangeFlags {
        const RUBY: &str = "ruby";

        let mut flags = ChangeFlags::default();
        if context.frozen {
            return flags;
        }

        let current = &context.runtime.current_platform;

        if !locked.platforms.iter().any(|p| p == current) {
            locked.platforms.push(current.clone());
            flags.new_platform = true;
        }

        if current != RUBY && locked.platforms.iter().any(|p| p == RUBY) {
            let missing_ruby_only_specs = locked.specs.iter().any(|spec| {
                spec.platform == RUBY
                    && !locked
                        .specs
                        .iter()
                        .any(|other| other.name == spec.name && other.platform == *current)
            });

            if missing_ruby_only_specs {
                locked.platforms.retain(|p| p != RUBY);
                if !locked.platforms.iter().any(|p| p == current) {
                    locked.platforms.push(current.clone());
                }
                flags.new_platform = true;
            }
        }

        flags
    }
}
