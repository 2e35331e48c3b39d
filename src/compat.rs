//! Component version compatibility
//!
//! An installed component is upgraded in place only within its major version.

use std::fmt;
use std::str::FromStr;

use reconciler_common::{Error, Result};

/// `MAJOR.MINOR.PATCH` version of an installed or desired component
///
/// A leading `v` is accepted and the patch part may carry a suffix
/// (`1.4.2-rc.1`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentVersion {
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version including any suffix
    pub patch: String,
}

impl FromStr for ComponentVersion {
    type Err = Error;

    fn from_str(version: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::validation_for_field(
                "version",
                format!("failed to get major version from '{}': {}", version, reason),
            )
        };

        let trimmed = version.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = trimmed.splitn(3, '.');

        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| invalid("missing major version"))?
            .parse::<u64>()
            .map_err(|e| invalid(&e.to_string()))?;
        let minor = parts
            .next()
            .ok_or_else(|| invalid("missing minor version"))?
            .parse::<u64>()
            .map_err(|e| invalid(&e.to_string()))?;
        let patch = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| invalid("missing patch version"))?;

        Ok(Self {
            major,
            minor,
            patch: patch.to_string(),
        })
    }
}

impl fmt::Display for ComponentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Check whether `actual` can be upgraded to `desired` in place
pub fn is_compatible(actual: &str, desired: &str) -> Result<bool> {
    let actual: ComponentVersion = actual.parse()?;
    let desired: ComponentVersion = desired.parse()?;
    Ok(actual.major == desired.major)
}

/// What to do with a component given its installed and desired versions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeDecision {
    /// Nothing is installed yet
    Install,
    /// The desired version is already installed
    UpToDate,
    /// The installed version is upgraded within its major version
    Upgrade,
}

impl UpgradeDecision {
    /// Decide how to move from `actual` to `desired`
    ///
    /// Fails with a validation error if the major versions differ or either
    /// version cannot be parsed.
    pub fn decide(actual: Option<&str>, desired: &str) -> Result<Self> {
        let Some(actual) = actual.filter(|a| !a.trim().is_empty()) else {
            return Ok(Self::Install);
        };

        let compatible = is_compatible(actual, desired)?;
        if actual == desired {
            Ok(Self::UpToDate)
        } else if compatible {
            Ok(Self::Upgrade)
        } else {
            Err(Error::validation(format!(
                "not performing update due to different major versions: actual {} vs desired {}",
                actual, desired
            )))
        }
    }
}

impl fmt::Display for UpgradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "Install"),
            Self::UpToDate => write!(f, "UpToDate"),
            Self::Upgrade => write!(f, "Upgrade"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0.5.2", 0, 5, "2")]
    #[case("v0.12.0", 0, 12, "0")]
    #[case("1.4.2-rc.1", 1, 4, "2-rc.1")]
    fn test_parse(
        #[case] input: &str,
        #[case] major: u64,
        #[case] minor: u64,
        #[case] patch: &str,
    ) {
        let version: ComponentVersion = input.parse().unwrap();
        assert_eq!(version.major, major);
        assert_eq!(version.minor, minor);
        assert_eq!(version.patch, patch);
    }

    #[rstest]
    #[case("")]
    #[case("latest")]
    #[case("1")]
    #[case("1.2")]
    #[case("1.x.0")]
    fn test_parse_rejects_malformed(#[case] input: &str) {
        let err = input.parse::<ComponentVersion>().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[rstest]
    #[case("0.5.2", "0.6.0", true)]
    #[case("1.0.0", "1.9.3", true)]
    #[case("0.5.2", "1.0.0", false)]
    #[case("2.0.0", "1.9.9", false)]
    fn test_is_compatible_compares_both_versions(
        #[case] actual: &str,
        #[case] desired: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(is_compatible(actual, desired).unwrap(), expected);
    }

    #[test]
    fn test_unparsable_desired_version_is_an_error() {
        assert!(is_compatible("0.5.2", "next").is_err());
    }

    #[rstest]
    #[case(None, "0.6.0", UpgradeDecision::Install)]
    #[case(Some(""), "0.6.0", UpgradeDecision::Install)]
    #[case(Some("0.6.0"), "0.6.0", UpgradeDecision::UpToDate)]
    #[case(Some("0.5.2"), "0.6.0", UpgradeDecision::Upgrade)]
    fn test_decide(
        #[case] actual: Option<&str>,
        #[case] desired: &str,
        #[case] expected: UpgradeDecision,
    ) {
        assert_eq!(UpgradeDecision::decide(actual, desired).unwrap(), expected);
    }

    #[test]
    fn test_major_upgrade_is_refused() {
        let err = UpgradeDecision::decide(Some("0.5.2"), "1.0.0").unwrap_err();
        assert!(err.to_string().contains("different major versions"));
        assert!(!err.is_retryable());
    }
}
