//! Timestamp helpers
//!
//! All timestamps are persisted as RFC3339 TEXT columns; these helpers keep
//! the round-trip in one place.

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Current time formatted for persistence
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Format a timestamp for persistence
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a persisted timestamp
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", s, e)))
}

/// Parse an optional persisted timestamp
pub fn parse_opt_rfc3339(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_rfc3339(&s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_round_trip() {
        let now = Utc::now();
        let parsed = parse_rfc3339(&to_rfc3339(now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rfc3339("not-a-timestamp").is_err());
    }

    #[test]
    fn test_parse_opt_none() {
        assert_eq!(parse_opt_rfc3339(None).unwrap(), None);
    }
}
