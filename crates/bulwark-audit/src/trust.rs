//! Caller trust levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// A caller's authorization rank.
///
/// Levels are totally ordered; comparisons such as
/// `trust >= TrustLevel::Trusted` are how veto thresholds and permission
/// tiers are expressed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Unknown or unauthenticated origin.
    #[default]
    Untrusted,
    /// Known caller with a narrow grant (read-only work).
    Restricted,
    /// Ordinary authenticated agent.
    Standard,
    /// Agent cleared for security-sensitive requests.
    Trusted,
    /// Operator-level trust; required for destructive capabilities.
    Elevated,
}

impl TrustLevel {
    /// All levels in ascending order.
    pub const ALL: [TrustLevel; 5] = [
        TrustLevel::Untrusted,
        TrustLevel::Restricted,
        TrustLevel::Standard,
        TrustLevel::Trusted,
        TrustLevel::Elevated,
    ];

    /// Stable lowercase name, as used in audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Restricted => "restricted",
            TrustLevel::Standard => "standard",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Elevated => "elevated",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TrustLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| AuditError::UnknownTrustLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(TrustLevel::Untrusted < TrustLevel::Restricted);
        assert!(TrustLevel::Standard < TrustLevel::Trusted);
        assert!(TrustLevel::Trusted < TrustLevel::Elevated);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Trusted".parse::<TrustLevel>().unwrap(), TrustLevel::Trusted);
        assert_eq!(" elevated ".parse::<TrustLevel>().unwrap(), TrustLevel::Elevated);
        assert!("root".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&TrustLevel::Untrusted).unwrap();
        assert_eq!(json, "\"untrusted\"");
    }
}
