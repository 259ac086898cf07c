//! A peer's advertised API version and the rules deciding whether this pool can talk to it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Semantic version triple of a JSON-RPC API.
///
/// Deserializes from the per-API entries of a peer's `version` result, which carry `major`, `minor` and `patch`
/// alongside fields this crate does not read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Semver {
    /// Incremented on breaking API changes.
    pub major: u32,
    /// Incremented on backwards compatible additions.
    pub minor: u32,
    /// Incremented on bug fixes.
    pub patch: u32,
}

impl Semver {
    /// Constructs a version from its three components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if a peer advertising `self` can serve a client that requires `required`, under the default
    /// [`CompatibilityPolicy::Additive`] rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use rpc_version::Semver;
    ///
    /// let required = Semver::new(5, 1, 0);
    /// assert!(Semver::new(5, 1, 0).is_compatible_with(&required));
    /// assert!(Semver::new(5, 1, 7).is_compatible_with(&required));
    /// assert!(Semver::new(5, 4, 0).is_compatible_with(&required));
    /// assert!(!Semver::new(5, 0, 9).is_compatible_with(&required));
    /// assert!(!Semver::new(6, 1, 0).is_compatible_with(&required));
    /// assert!(!Semver::new(4, 9, 0).is_compatible_with(&required));
    /// ```
    #[must_use]
    pub fn is_compatible_with(&self, required: &Semver) -> bool {
        CompatibilityPolicy::default().is_compatible(required, self)
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a [`Semver`] from a `major.minor.patch` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemverParseError {
    /// Wrong number of dot separated components.
    #[error("expected 3 dot separated components, found {0}")]
    ComponentCount(usize),
    /// A component is not an unsigned integer.
    #[error("invalid version component '{0}'")]
    InvalidComponent(String),
}

impl FromStr for Semver {
    type Err = SemverParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s.trim().split('.').collect::<Vec<_>>();
        if components.len() != 3 {
            return Err(SemverParseError::ComponentCount(components.len()));
        }
        let parse = |component: &str| {
            component
                .parse::<u32>()
                .map_err(|_| SemverParseError::InvalidComponent(component.to_string()))
        };

        Ok(Self {
            major: parse(components[0])?,
            minor: parse(components[1])?,
            patch: parse(components[2])?,
        })
    }
}

/// Rule deciding which advertised versions satisfy a required version.
///
/// Every policy rejects a differing major version, as a major bump marks a breaking API change. The policies only
/// differ in how they treat minor and patch components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompatibilityPolicy {
    /// Minor versions only add to the API so any minor at or above the required one is accepted. Patch releases
    /// are bug fix only and never affect compatibility.
    #[default]
    Additive,
    /// As [`Self::Additive`], except that when the minor versions are equal the advertised patch must be at or
    /// above the required patch.
    AdditivePatch,
    /// Major and minor must match exactly. Patch is ignored.
    Exact,
}

impl CompatibilityPolicy {
    /// Returns true if a peer advertising `actual` satisfies `required`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rpc_version::{CompatibilityPolicy, Semver};
    ///
    /// let required = Semver::new(6, 0, 2);
    /// assert!(CompatibilityPolicy::Additive.is_compatible(&required, &Semver::new(6, 0, 0)));
    /// assert!(!CompatibilityPolicy::AdditivePatch.is_compatible(&required, &Semver::new(6, 0, 0)));
    /// assert!(CompatibilityPolicy::AdditivePatch.is_compatible(&required, &Semver::new(6, 1, 0)));
    /// assert!(!CompatibilityPolicy::Exact.is_compatible(&required, &Semver::new(6, 1, 0)));
    /// ```
    #[must_use]
    pub fn is_compatible(&self, required: &Semver, actual: &Semver) -> bool {
        if required.major != actual.major {
            return false;
        }
        match self {
            Self::Additive => actual.minor >= required.minor,
            Self::AdditivePatch => {
                actual.minor > required.minor
                    || (actual.minor == required.minor && actual.patch >= required.patch)
            }
            Self::Exact => actual.minor == required.minor,
        }
    }
}

impl fmt::Display for CompatibilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Additive => write!(f, "additive"),
            Self::AdditivePatch => write!(f, "additive-patch"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

impl FromStr for CompatibilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "additive" => Ok(Self::Additive),
            "additive-patch" => Ok(Self::AdditivePatch),
            "exact" => Ok(Self::Exact),
            _ => Err(format!(
                "invalid compatibility policy '{s}'. expected one of: additive, additive-patch, exact"
            )),
        }
    }
}

#[test]
fn stringify_display() {
    assert_eq!(Semver::new(6, 0, 1).to_string(), "6.0.1");
}

#[test]
fn parse_rejects_malformed() {
    assert_eq!("5.1".parse::<Semver>(), Err(SemverParseError::ComponentCount(2)));
    assert_eq!(
        "5.x.0".parse::<Semver>(),
        Err(SemverParseError::InvalidComponent("x".to_string()))
    );
    assert_eq!("5.1.0".parse::<Semver>(), Ok(Semver::new(5, 1, 0)));
}

#[test]
fn deserialize_peer_version_entry() {
    let entry = r#"{"versionstring":"5.1.2","major":5,"minor":1,"patch":2,"prerelease":"","buildmetadata":""}"#;
    let version: Semver = serde_json::from_str(entry).unwrap();
    assert_eq!(version, Semver::new(5, 1, 2));
}
