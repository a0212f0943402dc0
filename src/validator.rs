//! C4 — the lockfile validator: runs right after convergence and prunes
//! any locked spec whose own dependency list no longer checks out against
//! the rest of the locked set, per spec.md's §4.4 precedence rules.
//!
//! A dependency is "missing" when nothing locked carries its name at all,
//! and "invalid" when something does but no locked version satisfies the
//! requirement. Either way the spec that declared it is dropped before
//! planning ever sees it — a stale lockfile entry should force
//! re-resolution, not silently ride along.

use crate::convergence::{ChangeFlags, LockedState};
use crate::dependency::DependencyKind;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("lockfile has no recorded ruby version but one was declared")]
    MissingRubyVersion,
}

pub struct Validator;

impl Validator {
    /// Prunes missing/invalid specs from `locked.specs` and folds the
    /// findings into `flags`. Flags are only ever set here, never cleared
    /// — consistent with the monotonic-flags rule the convergence engine
    /// already follows.
    pub fn run(locked: &mut LockedState, flags: &mut ChangeFlags) {
        let mut missing_dep_name: Option<String> = None;
        let mut invalid_dep_name: Option<String> = None;
        let mut to_drop: Vec<(String, semver::Version, String)> = Vec::new();

        for spec in locked.specs.iter() {
            for dep in spec.dependencies.iter().filter(|d| d.kind == DependencyKind::Runtime) {
                let satisfiers = locked.specs.get(&dep.name);
                if satisfiers.is_empty() {
                    missing_dep_name.get_or_insert_with(|| dep.name.clone());
                    to_drop.push((spec.name.clone(), spec.version.clone(), spec.platform.clone()));
                } else if !satisfiers.iter().any(|s| dep.requirement.matches(&s.version)) {
                    invalid_dep_name.get_or_insert_with(|| dep.name.clone());
                    to_drop.push((spec.name.clone(), spec.version.clone(), spec.platform.clone()));
                }
            }
        }

        if !to_drop.is_empty() {
            crate::debug::debug_log(&format!(
                "validator: pruning {} locked spec(s) with missing or invalid dependencies",
                to_drop.len(),
            ));
        }
        for (name, version, platform) in &to_drop {
            locked.specs.remove_spec(name, version, platform);
        }

        if let Some(name) = missing_dep_name {
            flags.missing_lockfile_dep.get_or_insert(name);
        } else if !flags.dependency_changes {
            // No spec was outright missing a dependency, and nothing about
            // the declared dependency list changed — but a declared dep
            // might still have no locked spec at all (a fresh Gemfile
            // entry the lockfile never saw, one step short of a full
            // `dependency_changes`). Bundler itself is excluded: it's
            // tracked via BUNDLED WITH, not a locked spec.
            for dep in &locked.dependencies {
                if dep.name == "bundler" {
                    continue;
                }
                if locked.specs.get(&dep.name).is_empty() {
                    flags.missing_lockfile_dep.get_or_insert(dep.name.clone());
                    break;
                }
            }
        }

        if let Some(name) = invalid_dep_name {
            flags.invalid_lockfile_dep.get_or_insert(name);
        }
    }
}
