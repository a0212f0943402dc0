//! Crate-wide error aggregation.
//!
//! Individual modules define their own `thiserror` enums for the failures
//! specific to them (parsing, validation, resolution). `DefinitionError`
//! wraps those for the facade's public API, the way a caller only ever
//! wants one error type to match on at the boundary.

use crate::gemfile::GemfileError;
use crate::lockfile::LockfileError;
use crate::resolver::ResolverError;
use crate::source_map::SourceMapError;
use crate::validator::ValidationError;
use std::fmt;
use std::path::PathBuf;

/// The ruby engine/version/patchlevel mismatch spec.md's §7 "Ruby-mismatch"
/// error kind describes. `patchlevel` is a plain `String` rather than an
/// `Option`, per spec.md §7's note that an unparseable patchlevel means the
/// error itself is misconfigured rather than a field a caller needs to
/// unwrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubyMismatch {
    pub engine: Option<String>,
    pub version: Option<String>,
    pub engine_version: Option<String>,
    pub patchlevel: String,
}

impl fmt::Display for RubyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "your Ruby version is {}, but the lockfile was generated for {} (patchlevel {})",
            self.version.as_deref().unwrap_or("unknown"),
            self.engine.as_deref().unwrap_or("ruby"),
            self.patchlevel
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("no Gemfile found at {0}")]
    GemfileNotFound(PathBuf),

    #[error("failed to read lockfile at {0}")]
    LockfileUnreadable(PathBuf, #[source] std::io::Error),

    #[error("failed to write lockfile at {0}")]
    LockfileUnwritable(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Gemfile(#[from] GemfileError),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error(transparent)]
    SourceMap(#[from] SourceMapError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("running in frozen mode, but the lockfile is out of date:\n{0}")]
    FrozenViolation(String),

    #[error("could not find a compatible set of gems for platform(s) {0:?}")]
    MissingSpecs(Vec<String>),

    #[error("Gemfile and Gemfile.lock are out of sync:\n{0}")]
    NotEquivalent(String),

    #[error("{0}")]
    RubyVersionMismatch(#[from] RubyMismatch),

    #[error("your platform '{local}' isn't in the lockfile's platform list {locked:?}")]
    PlatformMismatch { local: String, locked: Vec<String> },

    #[error("invalid option: {0}")]
    InvalidOption(String),
}
