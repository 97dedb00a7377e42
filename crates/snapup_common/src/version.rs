//! Version identifiers and the update-needed policy.
//!
//! Versions are `major.minor` pairs. Parsing is strict: a malformed
//! identifier is an error, never a silent default, because skipping an
//! update silently is worse than surfacing the failure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// A `major.minor` application version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId {
    pub major: u32,
    pub minor: u32,
}

impl VersionId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for VersionId {
    type Err = UpdateError;

    /// Parses "1.2" (extra dot-separated segments such as a patch level
    /// are tolerated and ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');

        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| UpdateError::malformed_version(s))?;

        let minor = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| UpdateError::malformed_version(s))?;

        Ok(Self { major, minor })
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Returns true when `server` is strictly ahead of `current`.
///
/// A higher current major version never triggers an update regardless
/// of the minor component.
pub fn needs_update(current: &VersionId, server: &VersionId) -> bool {
    current.major < server.major || (current.major == server.major && current.minor < server.minor)
}

/// String-input convenience used at API boundaries; either side failing
/// to parse fails the comparison with `MalformedVersion`.
pub fn needs_update_str(current: &str, server: &str) -> Result<bool, UpdateError> {
    let current: VersionId = current.parse()?;
    let server: VersionId = server.parse()?;
    Ok(needs_update(&current, &server))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let v: VersionId = "1.2".parse().unwrap();
        assert_eq!(v, VersionId::new(1, 2));
        assert_eq!(v.to_string(), "1.2");
    }

    #[test]
    fn test_parse_ignores_patch_segment() {
        let v: VersionId = "2.5.9".parse().unwrap();
        assert_eq!(v, VersionId::new(2, 5));
    }

    #[test]
    fn test_parse_malformed() {
        assert!("".parse::<VersionId>().is_err());
        assert!("1".parse::<VersionId>().is_err());
        assert!("1.".parse::<VersionId>().is_err());
        assert!("a.b".parse::<VersionId>().is_err());
        assert!("1.x".parse::<VersionId>().is_err());
        assert!("-1.2".parse::<VersionId>().is_err());
    }

    #[test]
    fn test_needs_update_policy() {
        assert!(needs_update(&VersionId::new(1, 0), &VersionId::new(1, 1)));
        assert!(needs_update(&VersionId::new(1, 9), &VersionId::new(2, 0)));
        assert!(!needs_update(&VersionId::new(1, 2), &VersionId::new(1, 2)));
        assert!(!needs_update(&VersionId::new(1, 3), &VersionId::new(1, 2)));
        // A higher current major wins even against a large minor
        assert!(!needs_update(&VersionId::new(2, 0), &VersionId::new(1, 9)));
    }

    #[test]
    fn test_needs_update_str_surfaces_parse_errors() {
        assert!(needs_update_str("1.0", "1.1").unwrap());
        assert!(!needs_update_str("1.2", "1.2").unwrap());
        assert!(matches!(
            needs_update_str("garbage", "1.1"),
            Err(UpdateError::MalformedVersion(_))
        ));
        assert!(matches!(
            needs_update_str("1.0", "garbage"),
            Err(UpdateError::MalformedVersion(_))
        ));
    }
}
