//! C8 — the unlock model: what a caller asked to re-resolve, normalized
//! into something the convergence engine and resolver driver can consult
//! uniformly regardless of how it was requested (`bundle update`,
//! `bundle update --all`, `bundle update --ruby`, or nothing at all).

use crate::dependency::{Dependency, VersionReq};
use crate::spec::SpecSet;
use std::collections::HashSet;

/// How the ruby-version unlock was decided. Resolved from Open Question 1:
/// rather than a single overloaded boolean, a caller that knows both the
/// locked and declared ruby versions gets a `Diff` recording whether they
/// actually differ; a caller that only knows "unlock ruby or don't" gets a
/// plain `Bool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockRuby {
    Bool(bool),
    Diff {
        locked: Option<String>,
        declared: Option<String>,
    },
}

impl UnlockRuby {
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Diff { locked, declared } => locked != declared,
        }
    }
}

/// What the caller asked to unlock, before gem-name expansion against the
/// locked dependency graph.
#[derive(Debug, Clone, Default)]
pub enum UnlockInput {
    /// Nothing requested; convergence may still force an unlock via
    /// `ChangeFlags`.
    #[default]
    None,
    /// `bundle update --all`.
    All,
    /// `bundle update gem1 gem2 --source foo --ruby --bundler 2.5.0`.
    Partial {
        gems: Vec<String>,
        sources: Vec<String>,
        ruby: bool,
        bundler: Option<String>,
        conservative: bool,
    },
}

/// The four construction cases from the unlock model: nothing requested,
/// everything requested, a partial gem/source list, and the derived
/// "unlocking bundler" flag used to decide whether the locked bundler
/// version constrains resolution.
#[derive(Debug, Clone)]
pub struct UnlockModel {
    pub all: bool,
    pub gems: HashSet<String>,
    pub sources: HashSet<String>,
    pub ruby: UnlockRuby,
    pub bundler: Option<String>,
    pub conservative: bool,
    pub unlocking_bundler: bool,
}

impl UnlockModel {
    #[must_use]
    pub fn from_input(input: UnlockInput, locked_ruby: Option<&str>, declared_ruby: Option<&str>) -> Self {
        match input {
            UnlockInput::None => Self {
                all: false,
                gems: HashSet::new(),
                sources: HashSet::new(),
                ruby: UnlockRuby::Diff {
                    locked: locked_ruby.map(str::to_string),
                    declared: declared_ruby.map(str::to_string),
                },
                bundler: None,
                conservative: false,
                unlocking_bundler: false,
            },
            UnlockInput::All => Self {
                all: true,
                gems: HashSet::new(),
                sources: HashSet::new(),
                ruby: UnlockRuby::Bool(true),
                bundler: None,
                conservative: false,
                unlocking_bundler: true,
            },
            UnlockInput::Partial {
                gems,
                sources,
                ruby,
                bundler,
                conservative,
            } => {
                let unlocking_bundler = bundler.is_some();
                Self {
                    all: false,
                    gems: gems.into_iter().collect(),
                    sources: sources.into_iter().collect(),
                    ruby: if ruby {
                        UnlockRuby::Bool(true)
                    } else {
                        UnlockRuby::Diff {
                            locked: locked_ruby.map(str::to_string),
                            declared: declared_ruby.map(str::to_string),
                        }
                    },
                    bundler,
                    conservative,
                    unlocking_bundler,
                }
            }
        }
    }

    #[must_use]
    pub fn is_unlocking(&self) -> bool {
        self.all
            || !self.gems.is_empty()
            || !self.sources.is_empty()
            || self.ruby.is_unlocked()
            || self.unlocking_bundler
    }

    #[must_use]
    pub fn gem_is_unlocked(&self, name: &str) -> bool {
        self.all || self.gems.contains(name)
    }

    #[must_use]
    pub fn source_is_unlocked(&self, source_label: &str) -> bool {
        self.all || self.sources.contains(source_label)
    }

    /// Expands the requested gem set to everything reachable from it
    /// through the locked dependency graph — per spec.md's step 4, "any
    /// spec reachable from an unlocked name (via `for`) is added to the
    /// unlock set". Unlocking `rails` also unlocks whatever `rails`
    /// depends on, since resolving a new `rails` version may need a
    /// different range of those dependencies too.
    pub fn expand_transitively(&mut self, locked_specs: &SpecSet) {
        if self.all || self.gems.is_empty() {
            return;
        }

        let roots: Vec<Dependency> = self
            .gems
            .iter()
            .map(|name| Dependency::new(name.clone(), VersionReq::any()))
            .collect();
        let reachable = locked_specs.for_dependencies(&roots, &[], &[]);
        for spec in reachable.specs {
            self.gems.insert(spec.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;
    use crate::spec::Spec;
    use crate::dependency::{Dependency, VersionReq};
    use semver::Version;

    #[test]
    fn none_input_derives_ruby_diff() {
        let model = UnlockModel::from_input(UnlockInput::None, Some("3.2.0"), Some("3.3.0"));
        assert!(model.ruby.is_unlocked());
        assert!(model.is_unlocking());
    }

    #[test]
    fn all_input_unlocks_everything() {
        let model = UnlockModel::from_input(UnlockInput::All, None, None);
        assert!(model.gem_is_unlocked("anything"));
        assert!(model.is_unlocking());
    }

    #[test]
    fn partial_input_only_unlocks_named_gems() {
        let model = UnlockModel::from_input(
            UnlockInput::Partial {
                gems: vec!["rack".to_string()],
                sources: vec![],
                ruby: false,
                bundler: None,
                conservative: false,
            },
            Some("3.2.0"),
            Some("3.2.0"),
        );
        assert!(model.gem_is_unlocked("rack"));
        assert!(!model.gem_is_unlocked("rails"));
    }

    #[test]
    fn expand_transitively_pulls_in_dependencies() {
        let mut locked = SpecSet::new();
        let mut rails = Spec::new("rails", Version::new(7, 0, 8), "ruby", SourceId(0));
        rails.dependencies.push(Dependency::new("rack", VersionReq::any()));
        locked.insert(rails);
        locked.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", SourceId(0)));

        let mut model = UnlockModel::from_input(
            UnlockInput::Partial {
                gems: vec!["rails".to_string()],
                sources: vec![],
                ruby: false,
                bundler: None,
                conservative: false,
            },
            None,
            None,
        );
        model.expand_transitively(&locked);
        assert!(model.gem_is_unlocked("rack"));
    }

    #[test]
    fn expand_transitively_does_not_unlock_dependents() {
        let mut locked = SpecSet::new();
        let mut rails = Spec::new("rails", Version::new(7, 0, 8), "ruby", SourceId(0));
        rails.dependencies.push(Dependency::new("rack", VersionReq::any()));
        locked.insert(rails);
        locked.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", SourceId(0)));

        let mut model = UnlockModel::from_input(
            UnlockInput::Partial {
                gems: vec!["rack".to_string()],
                sources: vec![],
                ruby: false,
                bundler: None,
                conservative: false,
            },
            None,
            None,
        );
        model.expand_transitively(&locked);
        assert!(!model.gem_is_unlocked("rails"));
    }
}
