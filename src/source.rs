//! Source identity: where a spec comes from, and what a source backend is
//! capable of (unlocking, local override) without the core ever dispatching
//! to a concrete backend implementation itself.
//!
//! Generalizes the gem-source-as-URL-string model in `gemfile.rs` into a
//! proper tagged union, so `SourceMap`/`Convergence` can compare sources
//! structurally instead of by string equality.

use std::path::PathBuf;

/// An interned handle into a `SourceRegistry`. `Spec` holds one of these
/// rather than an owning reference to a `Source`, so specs never form a
/// reference cycle back through their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub(crate) u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    Branch(String),
    Tag(String),
    Revision(String),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A rubygems-compatible index, potentially mirrored across several
    /// remotes.
    Rubygems { remotes: Vec<String> },
    /// A git repository, optionally pinned to a specific revision once
    /// resolved (cleared again by `unlock`).
    Git {
        repository: String,
        reference: GitRef,
        pinned_revision: Option<String>,
    },
    /// A local directory containing a gemspec, included directly without
    /// going through an index.
    Path { path: PathBuf },
    /// A gemspec file referenced directly (`gemspec` directive).
    Gemspec {
        path: PathBuf,
        gemspec_file: PathBuf,
    },
    /// The synthetic source for metadata-only dependencies (`Ruby\0`,
    /// `RubyGems\0`, `bundler`).
    Metadata,
    /// Several rubygems sources combined under `source ... do ... end`.
    Aggregate { remotes: Vec<String> },
}

impl Source {
    #[must_use]
    pub const fn supports_unlock(&self) -> bool {
        matches!(self, Self::Git { .. })
    }

    #[must_use]
    pub const fn supports_local_override(&self) -> bool {
        matches!(self, Self::Path { .. } | Self::Gemspec { .. })
    }

    /// Clears a pinned git revision, forcing the next resolution to refetch
    /// the tip of the configured branch/tag.
    pub fn unlock(&mut self) {
        if let Self::Git {
            pinned_revision, ..
        } = self
        {
            *pinned_revision = None;
        }
    }

    /// Applies a `bundle config local.<gem> <path>` override. Returns
    /// whether the override actually changed anything.
    pub fn apply_local_override(&mut self, override_path: PathBuf) -> bool {
        match self {
            Self::Path { path } => {
                let changed = *path != override_path;
                *path = override_path;
                changed
            }
            Self::Gemspec { path, .. } => {
                let changed = *path != override_path;
                *path = override_path;
                changed
            }
            _ => false,
        }
    }

    /// Whether `self` covers every remote that `other` needs, used to
    /// decide if a declared source still satisfies a locked one without
    /// forcing re-resolution.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Rubygems { remotes: a }, Self::Rubygems { remotes: b })
            | (Self::Aggregate { remotes: a }, Self::Rubygems { remotes: b })
            | (Self::Aggregate { remotes: a }, Self::Aggregate { remotes: b }) => {
                b.iter().all(|r| a.contains(r))
            }
            _ => self == other,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Rubygems { remotes } | Self::Aggregate { remotes } => remotes.join(", "),
            Self::Git { repository, .. } => repository.clone(),
            Self::Path { path } | Self::Gemspec { path, .. } => path.display().to_string(),
            Self::Metadata => "metadata".to_string(),
        }
    }
}

/// Owns every distinct `Source` a manifest or lockfile refers to, handing
/// out stable `SourceId`s so specs can reference a source without owning
/// it.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `source`, reusing an existing id if an identical source is
    /// already registered.
    pub fn intern(&mut self, source: Source) -> SourceId {
        if let Some(index) = self.sources.iter().position(|s| *s == source) {
            return SourceId(u32::try_from(index).expect("source registry overflow"));
        }
        self.sources.push(source);
        SourceId(u32::try_from(self.sources.len() - 1).expect("source registry overflow"))
    }

    #[must_use]
    pub fn get(&self, id: SourceId) -> &Source {
        &self.sources[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SourceId) -> &mut Source {
        &mut self.sources[id.0 as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
