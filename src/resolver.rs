//! C6 (external interface) — the SAT-style resolver the driver invokes.
//!
//! Generalizes the old RubyGems-specific `PubGrub` provider into one
//! driven entirely by the Core's `Dependency`/`Source`/`Spec` model. The
//! resolver never talks to a network or a filesystem itself; it consults
//! a `PackageUniverse` the host application implements against whatever
//! index/git/path backend is actually in play. That keeps the same
//! division of labor the teacher drew between `Resolver` and
//! `RubyGemsClient`, just with the client swapped for a trait.

use crate::dependency::{Dependency, VersionReq};
use crate::planner::ResolutionPlan;
use crate::source::SourceId;
use crate::spec::Spec;
use pubgrub::{
    DefaultStringReporter, DependencyConstraints, Dependencies as PubgrubDependencies,
    DependencyProvider, PackageResolutionStatistics, PubGrubError, Ranges, Reporter,
    SemanticVersion,
};
use semver::Version;
use std::collections::HashMap;
use std::convert::Infallible;
use thiserror::Error;

/// Errors the resolver interface can surface. `ResolutionFailed` carries
/// `PubGrub`'s own explanation of the conflict; `GemNotFound` is raised by
/// the driver (C6) rather than the resolver itself, for the
/// yanked-vs-unknown distinction spec.md's materialization-gap error
/// describes.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("unable to resolve dependencies: {message}")]
    ResolutionFailed { message: String },

    #[error("{message}")]
    GemNotFound { message: String },

    #[error("invalid version constraint '{constraint}' for gem '{gem}': {reason}")]
    InvalidConstraint {
        gem: String,
        constraint: String,
        reason: String,
    },

    #[error(transparent)]
    SourceMap(#[from] crate::source_map::SourceMapError),
}

/// One version a `PackageUniverse` can offer the resolver for a given gem
/// name, and what it would bring in if chosen.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub version: Version,
    pub platform: String,
    pub source: SourceId,
    pub dependencies: Vec<Dependency>,
}

/// Stand-in for "the live package universe" (a rubygems index, a git
/// checkout's gemspec, a path gem's gemspec) spec.md treats as an
/// external collaborator. Real host applications implement this against
/// an actual index; tests implement it over an in-memory fixture.
pub trait PackageUniverse {
    fn candidates(&self, name: &str) -> Vec<Candidate>;
}

/// An in-memory `PackageUniverse`, the fixture backend tests and small
/// embedders use instead of a real index.
#[derive(Debug, Clone, Default)]
pub struct FixtureUniverse {
    packages: HashMap<String, Vec<Candidate>>,
}

impl FixtureUniverse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, candidate: Candidate) {
        self.packages.entry(name.into()).or_default().push(candidate);
    }
}

impl PackageUniverse for FixtureUniverse {
    fn candidates(&self, name: &str) -> Vec<Candidate> {
        self.packages.get(name).cloned().unwrap_or_default()
    }
}

/// A resolver backend the driver can invoke. `PubgrubResolver` is the
/// concrete implementation; tests may swap in a fixture-backed fake that
/// returns a canned `Vec<Spec>` or error without touching `PubGrub` at
/// all.
pub trait Resolver {
    /// # Errors
    ///
    /// Returns an error if the plan's constraints have no solution, or if
    /// a constraint in the plan cannot be parsed.
    fn start(&self, plan: &ResolutionPlan) -> Result<Vec<Spec>, ResolverError>;
}

/// `PubGrub`-backed resolver over a `PackageUniverse`.
pub struct PubgrubResolver<'a> {
    universe: &'a dyn PackageUniverse,
}

impl<'a> PubgrubResolver<'a> {
    #[must_use]
    pub fn new(universe: &'a dyn PackageUniverse) -> Self {
        Self { universe }
    }

    /// Converts a Ruby-style requirement into the half-open ranges
    /// `PubGrub` reasons over. Multiple constraints (`>= 1.0, < 2.0`)
    /// intersect; a bare `VersionReq::any()` is the full range.
    fn to_range(requirement: &VersionReq) -> Ranges<SemanticVersion> {
        use crate::dependency::{Op, pessimistic_ceiling};

        let mut range = Ranges::full();
        for constraint in requirement.constraints() {
            let sem = to_pubgrub(&constraint.version);
            let bound = match constraint.op {
                Op::Eq => Ranges::singleton(sem),
                Op::Gt => Ranges::strictly_higher_than(sem),
                Op::Gte => Ranges::higher_than(sem),
                Op::Lt => Ranges::strictly_lower_than(sem),
                Op::Lte => Ranges::strictly_lower_than(sem.bump_patch()),
                Op::Pessimistic => Ranges::between(sem, to_pubgrub(&pessimistic_ceiling(&constraint.version))),
            };
            range = range.intersection(&bound);
        }
        range
    }
}

impl Resolver for PubgrubResolver<'_> {
    fn start(&self, plan: &ResolutionPlan) -> Result<Vec<Spec>, ResolverError> {
        let provider = CoreDependencyProvider { universe: self.universe, plan };

        let root = "___root___".to_string();
        let root_version = SemanticVersion::zero();
        let solution = pubgrub::resolve(&provider, root.clone(), root_version).map_err(|err| {
            let message = match err {
                PubGrubError::NoSolution(tree) => DefaultStringReporter::report(&tree),
                PubGrubError::ErrorRetrievingDependencies { package, version, source } => {
                    format!("error retrieving dependencies for {package} {version}: {source:?}")
                }
            };
            ResolverError::ResolutionFailed { message }
        })?;

        let mut specs = Vec::new();
        for (name, version) in solution {
            if name == root || version == SemanticVersion::zero() {
                continue;
            }
            let target = from_pubgrub(&version);
            for candidate in self.universe.candidates(&name) {
                if candidate.version != target {
                    continue;
                }
                if !plan.platforms.is_empty()
                    && !plan.platforms.contains(&candidate.platform)
                    && candidate.platform != "ruby"
                {
                    continue;
                }
                specs.push(Spec {
                    name: name.clone(),
                    version: candidate.version.clone(),
                    platform: candidate.platform.clone(),
                    source: candidate.source,
                    dependencies: candidate.dependencies.clone(),
                });
            }
        }

        Ok(specs)
    }
}

struct CoreDependencyProvider<'a> {
    universe: &'a dyn PackageUniverse,
    plan: &'a ResolutionPlan,
}

impl DependencyProvider for CoreDependencyProvider<'_> {
    type P = String;
    type V = SemanticVersion;
    type VS = Ranges<SemanticVersion>;
    type M = String;
    type Err = Infallible;
    type Priority = usize;

    fn prioritize(
        &self,
        _package: &Self::P,
        _range: &Self::VS,
        _conflicts_counts: &PackageResolutionStatistics,
    ) -> Self::Priority {
        0
    }

    fn choose_version(&self, package: &Self::P, range: &Self::VS) -> Result<Option<Self::V>, Self::Err> {
        if package == "___root___" {
            return Ok(Some(SemanticVersion::zero()));
        }

        let excluded = self.plan.excluded_versions.get(package);
        let mut versions: Vec<SemanticVersion> = self
            .universe
            .candidates(package)
            .into_iter()
            .filter(|c| {
                self.plan.platforms.is_empty() || c.platform == "ruby" || self.plan.platforms.contains(&c.platform)
            })
            .filter(|c| excluded.is_none_or(|versions| !versions.contains(&c.version)))
            .map(|c| to_pubgrub(&c.version))
            .filter(|v| range.contains(v))
            .collect();

        versions.sort_unstable();
        versions.dedup();
        Ok(versions.last().copied())
    }

    fn get_dependencies(
        &self,
        package: &Self::P,
        version: &Self::V,
    ) -> Result<PubgrubDependencies<Self::P, Self::VS, Self::M>, Self::Err> {
        if package == "___root___" {
            let mut deps = DependencyConstraints::default();
            for dep in &self.plan.dependencies {
                let mut range = PubgrubResolver::to_range(&dep.requirement);
                if let Some(floor) = self.plan.base_requirements.get(&dep.name) {
                    range = range.intersection(&PubgrubResolver::to_range(floor));
                }
                deps.insert(dep.name.clone(), range);
            }
            return Ok(PubgrubDependencies::Available(deps));
        }

        let target = from_pubgrub(version);
        let Some(candidate) = self
            .universe
            .candidates(package)
            .into_iter()
            .find(|c| c.version == target)
        else {
            return Ok(PubgrubDependencies::Unavailable(format!(
                "version {target} not found for {package}"
            )));
        };

        let mut deps = DependencyConstraints::default();
        for dep in &candidate.dependencies {
            deps.insert(dep.name.clone(), PubgrubResolver::to_range(&dep.requirement));
        }
        Ok(PubgrubDependencies::Available(deps))
    }
}

fn to_pubgrub(version: &Version) -> SemanticVersion {
    SemanticVersion::new(
        u32::try_from(version.major).unwrap_or(u32::MAX),
        u32::try_from(version.minor).unwrap_or(u32::MAX),
        u32::try_from(version.patch).unwrap_or(u32::MAX),
    )
}

fn from_pubgrub(version: &SemanticVersion) -> Version {
    let text = version.to_string();
    let mut parts = text.splitn(3, '.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Version::new(major, minor, patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Dependency;
    use crate::source::SourceId;
    use std::collections::HashMap;

    fn plan_for(deps: Vec<Dependency>) -> ResolutionPlan {
        ResolutionPlan {
            source_requirements: HashMap::new(),
            default_source: SourceId(0),
            dependencies: deps,
            base_requirements: HashMap::new(),
            platforms: vec!["ruby".to_string()],
            unlock_gems: Vec::new(),
            locked_specs: crate::spec::SpecSet::new(),
            excluded_versions: HashMap::new(),
        }
    }

    #[test]
    fn resolves_simple_dependency_to_highest_matching_version() {
        let mut universe = FixtureUniverse::new();
        universe.add(
            "rack",
            Candidate {
                version: Version::new(3, 0, 8),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );
        universe.add(
            "rack",
            Candidate {
                version: Version::new(2, 2, 0),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );

        let resolver = PubgrubResolver::new(&universe);
        let plan = plan_for(vec![Dependency::new("rack", VersionReq::any())]);
        let specs = resolver.start(&plan).unwrap();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "rack");
        assert_eq!(specs[0].version, Version::new(3, 0, 8));
    }

    #[test]
    fn resolves_transitive_dependency() {
        let mut universe = FixtureUniverse::new();
        universe.add(
            "rails",
            Candidate {
                version: Version::new(7, 0, 8),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![Dependency::new("rack", VersionReq::parse(">= 2.2.0").unwrap())],
            },
        );
        universe.add(
            "rack",
            Candidate {
                version: Version::new(3, 0, 8),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );

        let resolver = PubgrubResolver::new(&universe);
        let plan = plan_for(vec![Dependency::new("rails", VersionReq::any())]);
        let specs = resolver.start(&plan).unwrap();

        assert_eq!(specs.len(), 2);
        assert!(specs.iter().any(|s| s.name == "rails"));
        assert!(specs.iter().any(|s| s.name == "rack"));
    }

    #[test]
    fn unsatisfiable_constraint_fails_resolution() {
        let mut universe = FixtureUniverse::new();
        universe.add(
            "rack",
            Candidate {
                version: Version::new(1, 0, 0),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );

        let resolver = PubgrubResolver::new(&universe);
        let plan = plan_for(vec![Dependency::new("rack", VersionReq::parse(">= 2.0.0").unwrap())]);
        assert!(resolver.start(&plan).is_err());
    }

    #[test]
    fn base_requirement_floor_excludes_lower_candidate() {
        let mut universe = FixtureUniverse::new();
        universe.add(
            "rack",
            Candidate {
                version: Version::new(1, 0, 0),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );
        universe.add(
            "rack",
            Candidate {
                version: Version::new(3, 0, 8),
                platform: "ruby".to_string(),
                source: SourceId(0),
                dependencies: vec![],
            },
        );

        let mut plan = plan_for(vec![Dependency::new("rack", VersionReq::any())]);
        plan.base_requirements
            .insert("rack".to_string(), VersionReq::parse(">= 3.0.0").unwrap());

        let resolver = PubgrubResolver::new(&universe);
        let specs = resolver.start(&plan).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].version, Version::new(3, 0, 8));
    }
}
