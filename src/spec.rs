//! C1 — the `Spec`/`SpecSet` data model: a single resolved gem at a
//! specific version/platform, and the set operations the rest of the Core
//! performs over collections of them.

use crate::dependency::{Dependency, DependencyKind};
use crate::source::SourceId;
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// A single resolved (name, version, platform) triple and the
/// dependencies it declares.
///
/// Identity is `(name, version, platform)` — two specs with the same
/// identity but different dependency lists (e.g. one parsed from a stale
/// lockfile, one freshly resolved) are still the same spec as far as
/// `SpecSet` deduplication and lookup are concerned. `Spec` holds a
/// `SourceId` handle rather than an owning reference to its `Source`, so
/// specs never form a cycle back through the registry that owns them.
#[derive(Debug, Clone)]
pub struct Spec {
    pub name: String,
    pub version: Version,
    pub platform: String,
    pub source: SourceId,
    pub dependencies: Vec<Dependency>,
}

impl Spec {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version, platform: impl Into<String>, source: SourceId) -> Self {
        Self {
            name: name.into(),
            version,
            platform: platform.into(),
            source,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        if self.platform.is_empty() || self.platform == "ruby" {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }

    #[must_use]
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Runtime)
    }
}

impl PartialEq for Spec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.platform == other.platform
    }
}
impl Eq for Spec {}

impl Hash for Spec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.platform.hash(state);
    }
}

/// The result of materializing a dependency list against a `SpecSet`:
/// the specs that cover it, any dependency that no installed spec
/// satisfies, and any spec whose own dependencies aren't fully covered
/// (incomplete for the requested platform set).
#[derive(Debug, Clone, Default)]
pub struct MaterializedSet {
    pub specs: Vec<Spec>,
    pub missing: Vec<Dependency>,
    pub incomplete: Vec<Spec>,
}

impl MaterializedSet {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }
}

/// An indexed collection of specs, keyed by name, supporting the lookup
/// and transitive-closure operations the convergence engine and the
/// facade need.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    by_name: HashMap<String, Vec<Spec>>,
}

impl SpecSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: Spec) {
        let bucket = self.by_name.entry(spec.name.clone()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|s| **s == spec) {
            *existing = spec;
        } else {
            bucket.push(spec);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> &[Spec] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn lookup(&self, name: &str, version: &Version, platform: &str) -> Option<&Spec> {
        self.get(name)
            .iter()
            .find(|s| &s.version == version && s.platform == platform)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Vec<Spec> {
        self.by_name.remove(name).unwrap_or_default()
    }

    /// Drops every spec for which `keep` returns `false`, by identity.
    /// Used by the validator to prune specs whose dependencies no longer
    /// check out against the rest of the locked set.
    pub fn retain(&mut self, mut keep: impl FnMut(&Spec) -> bool) {
        for bucket in self.by_name.values_mut() {
            bucket.retain(|spec| keep(spec));
        }
        self.by_name.retain(|_, bucket| !bucket.is_empty());
    }

    /// Removes a single spec by identity, returning whether it was present.
    pub fn remove_spec(&mut self, name: &str, version: &Version, platform: &str) -> bool {
        let Some(bucket) = self.by_name.get_mut(name) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|s| !(s.version == *version && s.platform == platform));
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.by_name.remove(name);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spec> {
        self.by_name.values().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Specs present in `self` but not in `other`, by identity.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for spec in self.iter() {
            if other.lookup(&spec.name, &spec.version, &spec.platform).is_none() {
                result.insert(spec.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for spec in other.iter() {
            result.insert(spec.clone());
        }
        result
    }

    /// Walks the dependency graph starting from `roots`, returning every
    /// spec reachable through runtime dependencies that are in-group and
    /// match one of `platforms`. Discovery order, not a strict topological
    /// sort — callers that need install order resolve that separately.
    ///
    /// A dependency with no version-satisfying spec at all is `missing`.
    /// One with a satisfying spec for some but not every requested platform
    /// is `incomplete` — e.g. a native extension gem locked only for
    /// `x86_64-linux` when `arm64-darwin` was also requested — per
    /// spec.md §4.1's `materialize` contract.
    #[must_use]
    pub fn for_dependencies(
        &self,
        roots: &[Dependency],
        groups: &[String],
        platforms: &[String],
    ) -> MaterializedSet {
        let mut result = MaterializedSet::default();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut queue: Vec<Dependency> = roots
            .iter()
            .filter(|d| groups.is_empty() || d.groups.iter().any(|g| groups.contains(g)))
            .cloned()
            .collect();

        while let Some(dep) = queue.pop() {
            let matching: Vec<&Spec> = self
                .get(&dep.name)
                .iter()
                .filter(|s| dep.requirement.matches(&s.version))
                .collect();

            if matching.is_empty() {
                result.missing.push(dep);
                continue;
            }

            let covering: Vec<&Spec> = matching
                .iter()
                .copied()
                .filter(|s| platforms.is_empty() || platforms.iter().any(|p| p == &s.platform) || s.platform == "ruby")
                .collect();

            if covering.is_empty() {
                result.incomplete.push(matching[0].clone());
                continue;
            }

            let covered: HashSet<&str> = covering.iter().map(|s| s.platform.as_str()).collect();
            let all_platforms_covered = platforms
                .iter()
                .all(|p| covered.contains(p.as_str()) || covered.contains("ruby"));

            for spec in &covering {
                let key = (spec.name.clone(), spec.platform.clone());
                if !seen.insert(key) {
                    continue;
                }
                result.specs.push((*spec).clone());
                for child in spec.runtime_dependencies() {
                    queue.push(child.clone());
                }
            }

            if !all_platforms_covered {
                result.incomplete.push(covering[0].clone());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::VersionReq;
    use crate::source::SourceId;

    fn src() -> SourceId {
        SourceId(0)
    }

    #[test]
    fn insert_deduplicates_by_identity() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn lookup_finds_exact_identity() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        assert!(set.lookup("rack", &Version::new(3, 0, 8), "ruby").is_some());
        assert!(set.lookup("rack", &Version::new(3, 0, 9), "ruby").is_none());
    }

    #[test]
    fn difference_excludes_shared_specs() {
        let mut a = SpecSet::new();
        a.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        a.insert(Spec::new("rails", Version::new(7, 0, 8), "ruby", src()));

        let mut b = SpecSet::new();
        b.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));

        let diff = a.difference(&b);
        assert_eq!(diff.len(), 1);
        assert!(diff.contains("rails"));
    }

    #[test]
    fn for_dependencies_reports_missing() {
        let set = SpecSet::new();
        let dep = Dependency::new("rack", VersionReq::any());
        let materialized = set.for_dependencies(&[dep], &[], &[]);
        assert_eq!(materialized.missing.len(), 1);
        assert!(!materialized.is_complete());
    }

    #[test]
    fn retain_drops_specs_by_predicate() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        set.insert(Spec::new("rails", Version::new(7, 0, 8), "ruby", src()));
        set.retain(|s| s.name != "rails");
        assert_eq!(set.len(), 1);
        assert!(set.contains("rack"));
        assert!(!set.contains("rails"));
    }

    #[test]
    fn remove_spec_targets_single_identity() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));
        set.insert(Spec::new("rack", Version::new(3, 1, 0), "ruby", src()));
        assert!(set.remove_spec("rack", &Version::new(3, 0, 8), "ruby"));
        assert_eq!(set.get("rack").len(), 1);
        assert!(!set.remove_spec("rack", &Version::new(9, 9, 9), "ruby"));
    }

    #[test]
    fn for_dependencies_flags_spec_missing_a_requested_platform() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("nokogiri", Version::new(1, 16, 0), "x86_64-linux", src()));

        let dep = Dependency::new("nokogiri", VersionReq::any());
        let materialized = set.for_dependencies(&[dep], &[], &["x86_64-linux".to_string(), "arm64-darwin".to_string()]);

        assert!(!materialized.is_complete());
        assert_eq!(materialized.incomplete.len(), 1);
        assert_eq!(materialized.incomplete[0].platform, "x86_64-linux");
        assert!(materialized.missing.is_empty());
    }

    #[test]
    fn for_dependencies_is_complete_once_every_platform_has_a_variant() {
        let mut set = SpecSet::new();
        set.insert(Spec::new("nokogiri", Version::new(1, 16, 0), "x86_64-linux", src()));
        set.insert(Spec::new("nokogiri", Version::new(1, 16, 0), "arm64-darwin", src()));

        let dep = Dependency::new("nokogiri", VersionReq::any());
        let materialized = set.for_dependencies(&[dep], &[], &["x86_64-linux".to_string(), "arm64-darwin".to_string()]);

        assert!(materialized.is_complete());
    }

    #[test]
    fn for_dependencies_walks_transitive_deps() {
        let mut set = SpecSet::new();
        let mut rails = Spec::new("rails", Version::new(7, 0, 8), "ruby", src());
        rails.dependencies.push(Dependency::new("rack", VersionReq::any()));
        set.insert(rails);
        set.insert(Spec::new("rack", Version::new(3, 0, 8), "ruby", src()));

        let dep = Dependency::new("rails", VersionReq::any());
        let materialized = set.for_dependencies(&[dep], &[], &[]);
        assert!(materialized.is_complete());
        assert_eq!(materialized.specs.len(), 2);
    }
}
