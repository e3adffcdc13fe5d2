//! Claim layers and staleness predicates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Staleness window for live session claims.
pub const SESSION_STALE_SECS: i64 = 3_600;
/// Staleness window for advisory issue-record claims.
pub const ADVISORY_STALE_SECS: i64 = 7_200;

/// The two independent claim layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimLayer {
    /// Layer A: an active `session` agent record in the run store.
    Session,
    /// Layer B: `claimed_by` / `claimed_at` state on the issue record.
    Advisory,
}

impl ClaimLayer {
    pub fn default_stale_secs(self) -> i64 {
        match self {
            ClaimLayer::Session => SESSION_STALE_SECS,
            ClaimLayer::Advisory => ADVISORY_STALE_SECS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimLayer::Session => "session",
            ClaimLayer::Advisory => "advisory",
        }
    }
}

impl fmt::Display for ClaimLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim is stale only once its age strictly exceeds the threshold.
/// Negative ages (clock skew) are never stale.
pub fn is_stale(age_secs: i64, threshold_secs: i64) -> bool {
    age_secs > threshold_secs
}

/// Owner identifier shortened to eight characters for conflict messages.
pub fn short_owner(owner: &str) -> &str {
    match owner.char_indices().nth(8) {
        Some((idx, _)) => &owner[..idx],
        None => owner,
    }
}

/// Whole minutes in `age_secs`, truncated toward zero.
pub fn age_minutes(age_secs: i64) -> i64 {
    age_secs / 60
}

/// Tracker state values that mean "nothing stored".
pub fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "null" || value.starts_with("(no ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_boundary() {
        let t = ClaimLayer::Advisory.default_stale_secs();
        assert!(!is_stale(7_200, t));
        assert!(is_stale(7_201, t));
        assert!(!is_stale(0, t));
    }

    #[test]
    fn test_session_boundary() {
        let t = ClaimLayer::Session.default_stale_secs();
        assert!(!is_stale(3_600, t));
        assert!(is_stale(3_601, t));
        assert!(!is_stale(600, t));
    }

    #[test]
    fn test_negative_age_never_stale() {
        assert!(!is_stale(-1, SESSION_STALE_SECS));
        assert!(!is_stale(i64::MIN, ADVISORY_STALE_SECS));
    }

    #[test]
    fn test_short_owner_truncates_to_eight() {
        assert_eq!(short_owner("session-abcdef-123"), "session-");
        assert_eq!(short_owner("s1"), "s1");
    }

    #[test]
    fn test_age_minutes_truncates() {
        assert_eq!(age_minutes(599), 9);
        assert_eq!(age_minutes(3_660), 61);
    }

    #[test]
    fn test_is_unset() {
        assert!(is_unset(""));
        assert!(is_unset("  "));
        assert!(is_unset("null"));
        assert!(is_unset("(no claimed_by state set)"));
        assert!(!is_unset("session-1"));
    }
}
