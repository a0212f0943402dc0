//! Dependency definition core: reconciles a Gemfile manifest with a
//! Gemfile.lock, decides whether re-resolution is needed, and drives a
//! `PubGrub`-backed resolver to produce a materialized gem set.
//!
//! The pipeline a [`definition::Definition`] drives, in order:
//! [`gemfile`] + [`lockfile`] parse the two on-disk formats and bridge them
//! into [`convergence::LockedState`]; [`convergence`] folds declared and
//! locked state together into [`convergence::ChangeFlags`]; [`validator`]
//! prunes locked specs that no longer check out; [`planner`] turns the
//! converged state into a [`planner::ResolutionPlan`]; [`driver`] decides
//! whether the [`resolver::Resolver`] needs to run at all, and materializes
//! its result against the declared dependency list.

/// Default gem source URL (CDN/mirror)
pub const DEFAULT_GEM_SOURCE: &str = "https://rubygems.org";

/// Official RubyGems.org URL (for API operations like push/yank/signin)
pub const RUBYGEMS_ORG_URL: &str = "https://rubygems.org";

pub mod context;
pub mod convergence;
pub mod debug;
pub mod definition;
pub mod dependency;
pub mod driver;
pub mod error;
pub mod gemfile;
pub mod lockfile;
pub mod paths;
pub mod planner;
pub mod platform;
pub mod resolver;
pub mod source;
pub mod source_map;
pub mod spec;
pub mod unlock;
pub mod validator;

// Re-export common types for convenience
pub use context::{Context, LocalOverrides, NullUi, RuntimeInfo, UiSink};
pub use convergence::{ChangeFlags, Convergence, LockedState, SourceBackend, StaticBackend};
pub use debug::{debug_log, debug_logf, init_debug, is_debug_enabled};
pub use definition::Definition;
pub use dependency::{Dependency, DependencyKind, VersionReq, VersionReqError};
pub use driver::Driver;
pub use error::DefinitionError;
pub use gemfile::{GemDependency, Gemfile, GemfileError};
pub use lockfile::{GemSpec, GitGemSpec, Lockfile, LockfileError, PathGemSpec};
pub use paths::{
    find_gemfile, find_gemfile_in, find_lockfile, find_lockfile_in, gemfile_for_lockfile,
    lockfile_for_gemfile,
};
pub use planner::{Planner, ResolutionPlan};
pub use platform::{detect_current_platform, platform_matches};
pub use resolver::{Candidate, FixtureUniverse, PackageUniverse, PubgrubResolver, Resolver, ResolverError};
pub use source::{GitRef, Source, SourceId, SourceRegistry};
pub use source_map::{SourceMap, SourceMapError};
pub use spec::{MaterializedSet, Spec, SpecSet};
pub use unlock::{UnlockInput, UnlockModel, UnlockRuby};
pub use validator::{ValidationError, Validator};
