//! C2 — `SourceMap`: which source each gem name resolves through, at three
//! layers of precedence (explicitly declared in the manifest, locked in the
//! lockfile, implied by the default source).

use crate::source::SourceId;
use crate::spec::SpecSet;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SourceMapError {
    #[error("gem '{0}' is declared from two different, incompatible sources")]
    AmbiguousSource(String),
}

/// Maps gem names to the source that provides them, at each layer the
/// convergence engine needs to reason about separately: what the manifest
/// explicitly pins, what's locked, and what falls through to a default.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub direct_requirements: HashMap<String, SourceId>,
    pub all_requirements: HashMap<String, SourceId>,
    pub locked_requirements: HashMap<String, SourceId>,
}

impl SourceMap {
    /// Builds the map from a manifest's explicit per-gem source pins, the
    /// sources recorded in the lockfile's specs, and a default source that
    /// covers everything else. Precedence is explicit > locked > default:
    /// an explicit pin silently overrides whatever the lockfile recorded
    /// for the same gem (the user moved it in the Gemfile, nothing
    /// ambiguous about that). The only error this layer raises is for two
    /// *explicit* declarations disagreeing with each other, which is
    /// `Planner::plan`'s job since this map only ever sees an
    /// already-deduplicated `explicit` map.
    pub fn build(
        explicit: &HashMap<String, SourceId>,
        locked_specs: &SpecSet,
        default_source: SourceId,
    ) -> Result<Self, SourceMapError> {
        let mut locked_requirements = HashMap::new();
        for spec in locked_specs.iter() {
            locked_requirements.insert(spec.name.clone(), spec.source);
        }

        let mut all_requirements = locked_requirements.clone();
        for (name, source) in explicit {
            all_requirements.insert(name.clone(), *source);
        }

        Ok(Self {
            direct_requirements: explicit.clone(),
            all_requirements,
            locked_requirements,
        })
    }

    #[must_use]
    pub fn source_for(&self, name: &str, default_source: SourceId) -> SourceId {
        self.all_requirements
            .get(name)
            .copied()
            .unwrap_or(default_source)
    }
}
