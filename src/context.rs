//! Settings snapshot, UI sink, and runtime info threaded explicitly through
//! the facade, in place of the process-global settings/singletons pattern.
//!
//! Mirrors the subset of the old `BundleConfig` env-var-backed settings
//! (`frozen`, `without`, `with`, `path`, `force_ruby_platform`, local
//! overrides) that the convergence and resolution logic actually consult.
//! Loading these values from `.bundle/config` or environment variables is
//! the caller's job; this struct only carries the resolved values.

use std::collections::HashMap;
use std::path::PathBuf;

/// Where diagnostic/progress messages go. Host applications implement this
/// to route messages to a terminal, a log file, or nowhere at all.
pub trait UiSink {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// A sink that discards everything, used when no caller-supplied sink is
/// given and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUi;

impl UiSink for NullUi {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}

/// Runtime platform/engine info the convergence logic needs but shouldn't
/// detect for itself (callers may want to pin it for reproducible tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub current_platform: String,
    pub ruby_engine: String,
    pub ruby_engine_version: Option<String>,
    pub ruby_version: Option<String>,
    /// Always a string per spec.md §7: an unparseable patchlevel means the
    /// `Ruby-mismatch` error itself is misconfigured, not a value a caller
    /// has to unwrap.
    pub ruby_patchlevel: String,
    /// The running RubyGems version, used to build the synthetic
    /// `RubyGems\0` metadata dependency (spec.md §4.5) the planner mixes
    /// into resolution so a gem's `required_rubygems_version` is checked
    /// the same way its `required_ruby_version` is.
    pub rubygems_version: Option<String>,
}

impl RuntimeInfo {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            current_platform: crate::platform::detect_current_platform(),
            ruby_engine: "ruby".to_string(),
            ruby_engine_version: None,
            ruby_version: None,
            ruby_patchlevel: "0".to_string(),
            rubygems_version: None,
        }
    }
}

/// Local path overrides installed via `bundle config local.<gem> <path>`,
/// keyed by gem name.
pub type LocalOverrides = HashMap<String, PathBuf>;

/// Settings snapshot consulted by the convergence engine and the resolver
/// driver. Plain data; no file I/O happens here.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolution must fail rather than diverge from the lockfile.
    pub frozen: bool,
    /// Groups to exclude from the resolved/materialized set.
    pub without: Vec<String>,
    /// Groups to force-include even if excluded elsewhere.
    pub with: Vec<String>,
    /// `bundle config local.<gem> <path>` overrides, applied during
    /// convergence step 6.
    pub local_overrides: LocalOverrides,
    /// Lock extension-built gems to the host platform rather than a
    /// precompiled platform variant.
    pub force_ruby_platform: bool,
    /// Prefer the locally cached/installed copy over fetching an update.
    pub prefer_local: bool,
    pub runtime: RuntimeInfo,
}

impl Context {
    #[must_use]
    pub fn new(runtime: RuntimeInfo) -> Self {
        Self {
            frozen: false,
            without: Vec::new(),
            with: Vec::new(),
            local_overrides: HashMap::new(),
            force_ruby_platform: false,
            prefer_local: false,
            runtime,
        }
    }

    #[must_use]
    pub fn excludes_group(&self, group: &str) -> bool {
        self.without.iter().any(|g| g == group) && !self.with.iter().any(|g| g == group)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(RuntimeInfo::detect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_group_respects_with_override() {
        let mut ctx = Context::default();
        ctx.without.push("test".to_string());
        assert!(ctx.excludes_group("test"));

        ctx.with.push("test".to_string());
        assert!(!ctx.excludes_group("test"));
    }

    #[test]
    fn default_context_has_no_overrides() {
        let ctx = Context::default();
        assert!(!ctx.frozen);
        assert!(ctx.local_overrides.is_empty());
    }
}
