//! The `Dependency` and `VersionReq` types shared by the manifest, the
//! lockfile, and the resolver.
//!
//! `VersionReq` parses Ruby's gem requirement syntax (`~>`, comma-separated
//! constraints, bare comparisons) into a structured constraint list up
//! front, rather than keeping it as a raw string the way the old
//! `GemDependency::version_requirement` field did — every downstream
//! consumer (the convergence engine, the validator, the resolver) needs to
//! evaluate it against candidate versions, not just display it.

use semver::Version;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::source::SourceId;

#[derive(Debug, thiserror::Error)]
pub enum VersionReqError {
    #[error("invalid version requirement '{0}'")]
    InvalidRequirement(String),
    #[error("invalid version '{0}' in requirement")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Constraint {
    pub(crate) op: Op,
    pub(crate) version: Version,
}

/// A parsed Ruby-style gem version requirement (`~> 1.2`, `>= 1.0, < 2.0`,
/// a bare `1.2.3`, or empty meaning "any version").
#[derive(Debug, Clone)]
pub struct VersionReq {
    constraints: Vec<Constraint>,
    raw: String,
}

impl VersionReq {
    #[must_use]
    pub fn any() -> Self {
        Self {
            constraints: Vec::new(),
            raw: String::new(),
        }
    }

    pub fn parse(requirement: &str) -> Result<Self, VersionReqError> {
        let trimmed = requirement.trim();
        if trimmed.is_empty() || trimmed == ">= 0" {
            return Ok(Self::any());
        }

        let constraints = if trimmed.contains(',') {
            trimmed
                .split(',')
                .map(str::trim)
                .map(Self::parse_single)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![Self::parse_single(trimmed)?]
        };

        Ok(Self {
            constraints,
            raw: trimmed.to_string(),
        })
    }

    fn parse_single(part: &str) -> Result<Constraint, VersionReqError> {
        if let Some(rest) = part.strip_prefix("~>") {
            let version = parse_partial_version(rest.trim())?;
            return Ok(Constraint {
                op: Op::Pessimistic,
                version,
            });
        }
        if let Some(rest) = part.strip_prefix(">=") {
            return Ok(Constraint {
                op: Op::Gte,
                version: parse_partial_version(rest.trim())?,
            });
        }
        if let Some(rest) = part.strip_prefix('>') {
            return Ok(Constraint {
                op: Op::Gt,
                version: parse_partial_version(rest.trim())?,
            });
        }
        if let Some(rest) = part.strip_prefix("<=") {
            return Ok(Constraint {
                op: Op::Lte,
                version: parse_partial_version(rest.trim())?,
            });
        }
        if let Some(rest) = part.strip_prefix('<') {
            return Ok(Constraint {
                op: Op::Lt,
                version: parse_partial_version(rest.trim())?,
            });
        }
        if let Some(rest) = part.strip_prefix('=') {
            return Ok(Constraint {
                op: Op::Eq,
                version: parse_partial_version(rest.trim())?,
            });
        }
        Ok(Constraint {
            op: Op::Eq,
            version: parse_partial_version(part.trim())?,
        })
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| match c.op {
            Op::Eq => version == &c.version,
            Op::Gt => version > &c.version,
            Op::Gte => version >= &c.version,
            Op::Lt => version < &c.version,
            Op::Lte => version <= &c.version,
            Op::Pessimistic => version >= &c.version && version < &pessimistic_ceiling(&c.version),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.constraints.is_empty()
    }

    pub(crate) fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

/// The upper, exclusive bound implied by a pessimistic (`~>`) constraint.
/// `~> 1.2.3` bumps the minor version (`< 1.3.0`); `~> 1.2` bumps the major
/// version (`< 2.0.0`). `pub(crate)` so the resolver's range conversion
/// can reuse the exact same rule rather than re-deriving it.
pub(crate) fn pessimistic_ceiling(version: &Version) -> Version {
    if version.patch != 0 {
        Version::new(version.major, version.minor + 1, 0)
    } else {
        Version::new(version.major + 1, 0, 0)
    }
}

/// Ruby requirement strings allow omitting trailing segments (`"2"`,
/// `"1.2"`); semver requires all three, so missing segments default to 0.
fn parse_partial_version(raw: &str) -> Result<Version, VersionReqError> {
    let mut parts = raw.splitn(3, '.');
    let major = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| VersionReqError::InvalidVersion(raw.to_string()))?;
    let minor = parts.next().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
    let patch = parts
        .next()
        .map(|s| {
            s.split(['.', '-']).next().unwrap_or(s).parse::<u64>().unwrap_or(0)
        })
        .unwrap_or(0);
    Ok(Version::new(major, minor, patch))
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            write!(f, ">= 0")
        } else {
            write!(f, "{}", self.raw)
        }
    }
}

impl PartialEq for VersionReq {
    fn eq(&self, other: &Self) -> bool {
        self.constraints == other.constraints
    }
}
impl Eq for VersionReq {}

impl Hash for VersionReq {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.constraints.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Runtime,
    Development,
}

/// A named requirement on a gem, as declared in a Gemfile or embedded in a
/// resolved spec's own dependency list.
///
/// `kind` is deliberately excluded from `PartialEq`/`Hash`: it is
/// informational bookkeeping (did this come from a `Gemfile` or from a
/// gemspec's `development_dependencies`), not part of a dependency's
/// identity. The old type-field mutation hack — rewriting a locked
/// dependency's kind in place so equality checks would pass — is gone; the
/// equality predicate simply doesn't look at it.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub requirement: VersionReq,
    pub groups: Vec<String>,
    pub platforms: Vec<String>,
    pub source: Option<SourceId>,
    pub kind: DependencyKind,
}

impl Dependency {
    #[must_use]
    pub fn new(name: impl Into<String>, requirement: VersionReq) -> Self {
        Self {
            name: name.into(),
            requirement,
            groups: vec!["default".to_string()],
            platforms: Vec::new(),
            source: None,
            kind: DependencyKind::Runtime,
        }
    }

    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    #[must_use]
    pub fn matches_platform(&self, platform: &str) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| p == platform)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.requirement == other.requirement
            && self.groups == other.groups
            && self.platforms == other.platforms
            && self.source == other.source
    }
}
impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.requirement.hash(state);
        self.groups.hash(state);
        self.platforms.hash(state);
        self.source.hash(state);
    }
}
