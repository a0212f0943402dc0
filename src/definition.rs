//! C7 — the Definition facade: the single entry point that owns a build's
//! worth of mutable state and drives C3 (convergence) → C4 (validation) →
//! C5/C6 (planning/resolving) in order, per spec.md's §4.7 operation table.

use std::fs;
use std::path::Path;

use crate::context::{Context, NullUi, UiSink};
use crate::convergence::{ChangeFlags, Convergence, LockedState, SourceBackend};
use crate::dependency::Dependency;
use crate::error::{DefinitionError, RubyMismatch};
use crate::gemfile::Gemfile;
use crate::lockfile::Lockfile;
use crate::resolver::Resolver;
use crate::source::SourceRegistry;
use crate::spec::{MaterializedSet, SpecSet};
use crate::unlock::{UnlockInput, UnlockModel};
use crate::validator::Validator;

/// Holds every piece of state a single `build`→`resolve` operation needs:
/// the interned source registry, the converged locked state, the change
/// flags convergence/validation set, and the unlock model, plus what's
/// needed to diff against the pre-convergence snapshot (frozen-mode
/// equivalence checks, `base_requirements`). Per spec.md §3's lifecycle
/// note, everything here is mutable only during `build`; afterwards only
/// `resolved` (the memoized `resolve()` result) and the platform-edit
/// methods touch it.
pub struct Definition<'a> {
    registry: SourceRegistry,
    locked: LockedState,
    flags: ChangeFlags,
    unlock: UnlockModel,
    declared_sources: Vec<crate::source::SourceId>,
    declared_dependencies: Vec<Dependency>,
    original_locked_dependencies: Vec<Dependency>,
    original_locked_platforms: Vec<String>,
    original_locked_specs: SpecSet,
    original_lockfile: Option<Lockfile>,
    context: Context,
    may_include_redundant_platform_specific_gems: bool,
    resolver: &'a dyn Resolver,
    ui: &'a dyn UiSink,
    resolved: Option<SpecSet>,
}

impl<'a> Definition<'a> {
    /// Constructs a `Definition` from an already-parsed manifest and an
    /// optional already-parsed lockfile (`None` = first-ever resolve, no
    /// lockfile on disk yet), running convergence (C3) and validation (C4)
    /// immediately. Per spec.md §4.7, failure here is limited to what C3/C4
    /// themselves can fail on — parsing failures are the caller's concern
    /// (see [`Definition::open`] for the path-based convenience that
    /// surfaces `GemfileNotFound`).
    pub fn build(
        gemfile: &Gemfile,
        lockfile: Option<&Lockfile>,
        unlock_input: UnlockInput,
        resolver: &'a dyn Resolver,
        backend: &dyn SourceBackend,
        context: Context,
    ) -> Result<Self, DefinitionError> {
        Self::build_with_ui(gemfile, lockfile, unlock_input, resolver, backend, context, &NullUi)
    }

    /// As [`Definition::build`], but with an explicit [`UiSink`] for the
    /// diagnostics `lock()` emits under a frozen-mode no-op.
    pub fn build_with_ui(
        gemfile: &Gemfile,
        lockfile: Option<&Lockfile>,
        unlock_input: UnlockInput,
        resolver: &'a dyn Resolver,
        backend: &dyn SourceBackend,
        context: Context,
        ui: &'a dyn UiSink,
    ) -> Result<Self, DefinitionError> {
        let mut registry = SourceRegistry::new();
        let (declared_sources, declared_dependencies) = gemfile.to_core(&mut registry);

        let locked = lockfile.map_or_else(LockedState::empty, |lf| lf.to_locked_state(&mut registry));
        let original_locked_specs = locked.specs.clone();
        let original_locked_dependencies = locked.dependencies.clone();
        let original_locked_platforms = locked.platforms.clone();

        let mut unlock = UnlockModel::from_input(
            unlock_input,
            locked.ruby_version.as_deref(),
            gemfile.ruby_version.as_deref(),
        );

        let (mut locked, mut flags) = {
            let mut convergence = Convergence::new(&mut registry, backend);
            convergence.run(locked, &declared_sources, &declared_dependencies, &context, &mut unlock)
        };

        Validator::run(&mut locked, &mut flags);

        let may_include_redundant_platform_specific_gems =
            lockfile.is_some_and(Lockfile::may_include_redundant_platform_specific_gems);

        Ok(Self {
            registry,
            locked,
            flags,
            unlock,
            declared_sources,
            declared_dependencies,
            original_locked_dependencies,
            original_locked_platforms,
            original_locked_specs,
            original_lockfile: lockfile.cloned(),
            context,
            may_include_redundant_platform_specific_gems,
            resolver,
            ui,
            resolved: None,
        })
    }

    /// Reads the Gemfile and (if present) lockfile from disk and builds a
    /// `Definition` from their contents. Fails `GemfileNotFound` if the
    /// manifest path doesn't exist, per spec.md §4.7.
    pub fn open(
        gemfile_path: &Path,
        lockfile_path: &Path,
        unlock_input: UnlockInput,
        resolver: &'a dyn Resolver,
        backend: &dyn SourceBackend,
        context: Context,
        ui: &'a dyn UiSink,
    ) -> Result<Self, DefinitionError> {
        if !gemfile_path.exists() {
            return Err(DefinitionError::GemfileNotFound(gemfile_path.to_path_buf()));
        }
        let gemfile = Gemfile::parse_file(gemfile_path)?;

        let lockfile = if lockfile_path.exists() {
            let text = fs::read_to_string(lockfile_path)
                .map_err(|e| DefinitionError::LockfileUnreadable(lockfile_path.to_path_buf(), e))?;
            Some(Lockfile::parse(&text)?)
        } else {
            None
        };

        Self::build_with_ui(&gemfile, lockfile.as_ref(), unlock_input, resolver, backend, context, ui)
    }

    /// C6's `resolve()`: returns the cached `SpecSet` if one's already been
    /// computed this build, otherwise runs the driver and memoizes the
    /// result. Per spec.md's invariant 6, calling this twice always
    /// returns the same set.
    pub fn resolve(&mut self) -> Result<&SpecSet, DefinitionError> {
        if self.resolved.is_none() {
            let driver = crate::driver::Driver::new(self.resolver);
            let specs = driver.resolve(
                &mut self.locked,
                &self.flags,
                &self.unlock,
                &self.declared_dependencies,
                &self.original_locked_dependencies,
                &self.context,
                &mut self.registry,
                &self.original_locked_specs,
                self.may_include_redundant_platform_specific_gems,
            )?;
            self.resolved = Some(specs);
        }
        Ok(self.resolved.as_ref().expect("populated just above"))
    }

    /// Materialized specs for every declared dependency, across every group
    /// not excluded by `context.without`/`with` (§3's `Context` settings).
    pub fn specs(&mut self) -> Result<MaterializedSet, DefinitionError> {
        let groups = self.active_groups();
        self.specs_for(&groups)
    }

    /// Every group named by a declared dependency, minus whatever
    /// `context.without` excludes and `context.with` forces back in.
    fn active_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for dep in &self.declared_dependencies {
            for group in &dep.groups {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        groups.retain(|group| !self.context.excludes_group(group));
        groups
    }

    /// Materialized specs filtered to `groups` (an empty slice means every
    /// group), per spec.md §4.7's `specs_for`.
    pub fn specs_for(&mut self, groups: &[String]) -> Result<MaterializedSet, DefinitionError> {
        let resolved = self.resolve()?.clone();
        let driver = crate::driver::Driver::new(self.resolver);
        let platforms = self.locked.platforms.clone();
        let declared = self.declared_dependencies.clone();
        let remote = !self.context.prefer_local;
        let original_locked_specs = self.original_locked_specs.clone();

        let bundler_version = self.locked.bundler_version.clone();
        let materialized = driver.materialize(
            resolved,
            &declared,
            groups,
            &platforms,
            remote,
            &original_locked_specs,
            &self.context,
            &mut self.registry,
            &self.unlock,
            &original_locked_specs,
            bundler_version.as_deref(),
        )?;
        Ok(materialized)
    }

    /// Probe version of `specs()`: true if materialization would report a
    /// missing spec, or if resolution/materialization fails outright. Per
    /// spec.md §7, a failure here resets the memoized `resolve()` result so
    /// a subsequent real call doesn't silently reuse a half-finished
    /// resolution.
    pub fn missing_specs(&mut self) -> bool {
        match self.specs() {
            Ok(materialized) => !materialized.missing.is_empty(),
            Err(_) => {
                self.resolved = None;
                true
            }
        }
    }

    /// Serializes the resolved set via the lockfile generator and writes it
    /// to `path`. Under frozen mode, refuses to write (logging instead of
    /// erroring) when the generated content would differ from what's on
    /// disk, per spec.md §4.7 and testable property 7 — frozen-mode write
    /// refusal is a no-op, never a raised error. Outside frozen mode, a
    /// semantic no-op write (content identical once `RUBY VERSION`/
    /// `BUNDLED WITH` are ignored, per spec.md §6(c)) is skipped too, since
    /// there's nothing to do.
    pub fn lock(&mut self, path: &Path, preserve_unknown: bool) -> Result<(), DefinitionError> {
        let resolved = self.resolve()?.clone();
        let mut new_lockfile = Lockfile::from_locked_state(
            &resolved,
            &self.registry,
            &self.declared_dependencies,
            &self.locked.platforms,
            self.locked.ruby_version.clone(),
            self.locked.bundler_version.clone(),
        );

        if let Some(original) = &self.original_lockfile {
            new_lockfile.uses_crlf = original.uses_crlf;
            if preserve_unknown && !self.unlock.is_unlocking() {
                new_lockfile.unknown_sections.clone_from(&original.unknown_sections);
            }
        }

        let unchanged = self
            .original_lockfile
            .as_ref()
            .is_some_and(|original| semantic_text(&new_lockfile) == semantic_text(original));

        if self.context.frozen {
            if unchanged {
                return Ok(());
            }
            self.ui.warn(&format!(
                "running in frozen mode, but the lockfile at {} is out of date:\n{}",
                path.display(),
                self.change_reason()
            ));
            return Ok(());
        }

        if unchanged {
            return Ok(());
        }

        fs::write(path, new_lockfile.render())
            .map_err(|e| DefinitionError::LockfileUnwritable(path.to_path_buf(), e))?;
        self.original_lockfile = Some(new_lockfile);
        Ok(())
    }

    /// Raises `NotEquivalent` under frozen mode if the Gemfile and lockfile
    /// have diverged, enumerating added/deleted/changed deps, platforms,
    /// and source migrations — spec.md §4.7 and scenario S5.
    pub fn ensure_equivalent_gemfile_and_lockfile(&self) -> Result<(), DefinitionError> {
        if !self.context.frozen {
            return Ok(());
        }

        let mut sections: Vec<String> = Vec::new();

        let added: Vec<&Dependency> = self
            .declared_dependencies
            .iter()
            .filter(|d| !self.original_locked_dependencies.iter().any(|l| l.name == d.name))
            .collect();
        if !added.is_empty() {
            sections.push(format_diff_section("You have added to the Gemfile:", &added));
        }

        let deleted: Vec<&Dependency> = self
            .original_locked_dependencies
            .iter()
            .filter(|l| !self.declared_dependencies.iter().any(|d| d.name == l.name))
            .collect();
        if !deleted.is_empty() {
            sections.push(format_diff_section("You have deleted from the Gemfile:", &deleted));
        }

        let changed: Vec<&Dependency> = self
            .declared_dependencies
            .iter()
            .filter(|d| {
                self.original_locked_dependencies
                    .iter()
                    .any(|l| l.name == d.name && l != *d)
            })
            .collect();
        if !changed.is_empty() {
            sections.push(format_diff_section("You have changed in the Gemfile:", &changed));
        }

        if self.flags.new_platform {
            sections.push(format!("* {} platform added", self.context.runtime.current_platform));
        }
        if self.flags.source_changes {
            sections.push("You have changed your source configuration".to_string());
        }

        if sections.is_empty() {
            Ok(())
        } else {
            Err(DefinitionError::NotEquivalent(sections.join("\n")))
        }
    }

    /// Checks the running ruby engine/version against the lockfile's, and
    /// that the local platform was already among the lockfile's, per
    /// spec.md §4.7. Checked against the pre-convergence platform snapshot
    /// rather than `self.locked.platforms`, since step 7 of convergence
    /// (spec.md §4.3) unconditionally adds the running platform to the
    /// latter — checking the post-convergence list would make this always
    /// pass.
    pub fn validate_runtime(&self) -> Result<(), DefinitionError> {
        let current = &self.context.runtime.current_platform;
        if !self.original_locked_platforms.is_empty() && !self.original_locked_platforms.iter().any(|p| p == current)
        {
            return Err(DefinitionError::PlatformMismatch {
                local: current.clone(),
                locked: self.original_locked_platforms.clone(),
            });
        }

        if let (Some(locked_ruby), Some(declared_ruby)) =
            (&self.locked.ruby_version, &self.context.runtime.ruby_version)
        {
            if locked_ruby != declared_ruby {
                return Err(DefinitionError::RubyVersionMismatch(RubyMismatch {
                    engine: Some(self.context.runtime.ruby_engine.clone()),
                    version: Some(declared_ruby.clone()),
                    engine_version: self.context.runtime.ruby_engine_version.clone(),
                    patchlevel: self.context.runtime.ruby_patchlevel.clone(),
                }));
            }
        }

        Ok(())
    }

    /// Adds a platform to the locked set, invalidating the memoized resolve
    /// (a new platform may pull in platform-specific specs the cached set
    /// doesn't have).
    pub fn add_platform(&mut self, platform: impl Into<String>) {
        let platform = platform.into();
        if !self.locked.platforms.iter().any(|p| *p == platform) {
            self.locked.platforms.push(platform);
            self.flags.new_platform = true;
            self.resolved = None;
        }
    }

    /// Removes a platform from the locked set. Fails `InvalidOption` if the
    /// platform wasn't locked in the first place, per spec.md §4.7.
    pub fn remove_platform(&mut self, platform: &str) -> Result<(), DefinitionError> {
        let before = self.locked.platforms.len();
        self.locked.platforms.retain(|p| p != platform);
        if self.locked.platforms.len() == before {
            return Err(DefinitionError::InvalidOption(format!(
                "platform '{platform}' is not locked"
            )));
        }
        self.resolved = None;
        Ok(())
    }

    /// The human-readable reason `resolve()` would re-resolve instead of
    /// reusing the locked set verbatim; empty string if nothing changed
    /// (scenario S1), matching spec.md §8's `change_reason()` mention.
    #[must_use]
    pub fn change_reason(&self) -> String {
        let mut reasons = Vec::new();
        if self.flags.source_changes {
            reasons.push("the list of sources changed");
        }
        if self.flags.dependency_changes {
            reasons.push("the dependencies in your gemfile changed");
        }
        if self.flags.path_changes {
            reasons.push("a path source's contents changed");
        }
        if self.flags.local_changes {
            reasons.push("a local override changed");
        }
        if self.flags.new_platform {
            reasons.push("a new platform was added");
        }
        if self.flags.missing_lockfile_dep.is_some() {
            reasons.push("the lockfile is missing a dependency");
        }
        if self.flags.invalid_lockfile_dep.is_some() {
            reasons.push("the lockfile has an unsatisfied dependency");
        }
        if self.unlock.is_unlocking() {
            reasons.push("you requested an update");
        }
        reasons.join(", ")
    }

    #[must_use]
    pub fn nothing_changed(&self) -> bool {
        self.flags.nothing_changed() && !self.unlock.is_unlocking()
    }

    #[must_use]
    pub const fn flags(&self) -> &ChangeFlags {
        &self.flags
    }

    #[must_use]
    pub const fn locked_platforms(&self) -> &Vec<String> {
        &self.locked.platforms
    }
}

fn format_diff_section(header: &str, deps: &[&Dependency]) -> String {
    let mut lines = vec![header.to_string()];
    let mut sorted: Vec<&&Dependency> = deps.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for dep in sorted {
        lines.push(format!("* {} ({})", dep.name, dep.requirement));
    }
    lines.join("\n")
}

/// Renders `lockfile` with `RUBY VERSION`/`BUNDLED WITH` blanked out, per
/// spec.md §6(c): those two sections must be ignored when deciding whether
/// a regenerated lockfile is semantically a no-op rewrite of what's on
/// disk.
fn semantic_text(lockfile: &Lockfile) -> String {
    let mut stripped = lockfile.clone();
    stripped.ruby_version = None;
    stripped.bundled_with = None;
    stripped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::StaticBackend;
    use crate::resolver::{Candidate, FixtureUniverse, PubgrubResolver};
    use crate::unlock::UnlockInput;
    use semver::Version;

    fn gemfile(src: &str) -> Gemfile {
        Gemfile::parse(src).unwrap()
    }

    #[test]
    fn unchanged_manifest_and_lockfile_resolve_without_the_resolver() {
        let gemfile = gemfile("gem \"rack\", \"~> 1.0\"");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack (~> 1.0)\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let universe = FixtureUniverse::new();
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.runtime.current_platform = "ruby".to_string();

        let mut definition =
            Definition::build(&gemfile, Some(&lockfile), UnlockInput::None, &resolver, &backend, context).unwrap();

        assert!(definition.nothing_changed());
        let specs = definition.resolve().unwrap();
        assert_eq!(specs.len(), 1);
        assert!(specs.contains("rack"));
        assert_eq!(definition.change_reason(), "");
    }

    #[test]
    fn added_dependency_forces_resolution() {
        let gemfile = gemfile("gem \"rack\", \"~> 1.0\"\ngem \"rspec\"");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack (~> 1.0)\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let mut universe = FixtureUniverse::new();
        universe.add(
            "rack",
            Candidate {
                version: Version::new(1, 0, 3),
                platform: "ruby".to_string(),
                source: crate::source::SourceId(0),
                dependencies: vec![],
            },
        );
        universe.add(
            "rspec",
            Candidate {
                version: Version::new(3, 12, 0),
                platform: "ruby".to_string(),
                source: crate::source::SourceId(0),
                dependencies: vec![],
            },
        );
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.runtime.current_platform = "ruby".to_string();

        let mut definition =
            Definition::build(&gemfile, Some(&lockfile), UnlockInput::None, &resolver, &backend, context).unwrap();

        assert!(!definition.nothing_changed());
        assert!(definition.change_reason().contains("the dependencies in your gemfile changed"));
        let specs = definition.resolve().unwrap();
        assert!(specs.contains("rack"));
        assert!(specs.contains("rspec"));
    }

    #[test]
    fn frozen_mode_blocks_added_dependency() {
        let gemfile = gemfile("gem \"rack\"\ngem \"baz\"");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let universe = FixtureUniverse::new();
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.frozen = true;
        context.runtime.current_platform = "ruby".to_string();

        let definition =
            Definition::build(&gemfile, Some(&lockfile), UnlockInput::None, &resolver, &backend, context).unwrap();

        let err = definition.ensure_equivalent_gemfile_and_lockfile().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("* baz (>= 0)"));
        assert!(message.contains("added to the Gemfile"));
    }

    #[test]
    fn frozen_mode_never_writes_lockfile() {
        let gemfile = gemfile("gem \"rack\"\ngem \"baz\"");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let universe = FixtureUniverse::new();
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.frozen = true;
        context.runtime.current_platform = "ruby".to_string();

        let mut definition =
            Definition::build(&gemfile, Some(&lockfile), UnlockInput::None, &resolver, &backend, context).unwrap();

        let temp = tempfile::NamedTempFile::new().unwrap();
        definition.lock(temp.path(), true).unwrap();
        let contents = std::fs::read_to_string(temp.path()).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn remove_platform_rejects_unlocked_platform() {
        let gemfile = gemfile("gem \"rack\"");
        let universe = FixtureUniverse::new();
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.runtime.current_platform = "ruby".to_string();

        let mut definition = Definition::build(&gemfile, None, UnlockInput::None, &resolver, &backend, context).unwrap();
        let result = definition.remove_platform("arm64-darwin");
        assert!(matches!(result, Err(DefinitionError::InvalidOption(_))));
    }

    #[test]
    fn unlock_forces_resolution_even_with_nothing_else_changed() {
        let gemfile = gemfile("gem \"rack\", \">= 0\"");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack (>= 0)\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let mut universe = FixtureUniverse::new();
        universe.add(
            "rack",
            Candidate {
                version: Version::new(1, 0, 4),
                platform: "ruby".to_string(),
                source: crate::source::SourceId(0),
                dependencies: vec![],
            },
        );
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.runtime.current_platform = "ruby".to_string();

        let unlock = UnlockInput::Partial {
            gems: vec!["rack".to_string()],
            sources: vec![],
            ruby: false,
            bundler: None,
            conservative: false,
        };

        let mut definition =
            Definition::build(&gemfile, Some(&lockfile), unlock, &resolver, &backend, context).unwrap();

        assert!(definition.flags().nothing_changed());
        assert!(!definition.nothing_changed());
        let specs = definition.resolve().unwrap();
        assert_eq!(specs.get("rack").first().unwrap().version, Version::new(1, 0, 4));
    }

    #[test]
    fn specs_honors_context_without_for_grouped_dependencies() {
        let gemfile = gemfile("gem \"rack\"\ngem \"rspec\", group: :test");
        let lockfile_text = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (1.0.3)\n    rspec (3.0.0)\n\nPLATFORMS\n  ruby\n\nDEPENDENCIES\n  rack\n  rspec\n";
        let lockfile = Lockfile::parse(lockfile_text).unwrap();

        let universe = FixtureUniverse::new();
        let resolver = PubgrubResolver::new(&universe);
        let backend = StaticBackend;
        let mut context = Context::default();
        context.runtime.current_platform = "ruby".to_string();
        context.without.push("test".to_string());

        let mut definition =
            Definition::build(&gemfile, Some(&lockfile), UnlockInput::None, &resolver, &backend, context).unwrap();

        let materialized = definition.specs().unwrap();
        assert!(materialized.specs.iter().any(|s| s.name == "rack"));
        assert!(!materialized.specs.iter().any(|s| s.name == "rspec"));
    }
}
