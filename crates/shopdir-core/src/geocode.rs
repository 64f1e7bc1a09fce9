use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::records::Coordinate;

/// Cached answer for one normalized address. `coordinate: None` is the
/// "not found" marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub address_key: String,
    pub coordinate: Option<Coordinate>,
    pub resolved_at: DateTime<Utc>,
}

impl GeocodeCacheEntry {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.coordinate.is_none()
    }

    /// Whether the entry may still be served at `now`.
    ///
    /// `found_ttl: None` keeps successful lookups forever.
    #[must_use]
    pub fn is_fresh(
        &self,
        now: DateTime<Utc>,
        found_ttl: Option<Duration>,
        not_found_ttl: Duration,
    ) -> bool {
        let ttl = if self.is_not_found() {
            Some(not_found_ttl)
        } else {
            found_ttl
        };
        match ttl {
            Some(ttl) => now - self.resolved_at < ttl,
            None => true,
        }
    }
}

/// Cache key for an address: trimmed, lowercased, full-width spaces folded
/// and whitespace runs collapsed.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    address
        .replace('\u{3000}', " ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_spaces() {
        assert_eq!(
            normalize_address("  Mito-shi\u{3000}\u{3000}Minami  1-2 "),
            "mito-shi minami 1-2"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_address("茨城県　水戸市  南町");
        assert_eq!(normalize_address(&once), once);
        assert_eq!(once, "茨城県 水戸市 南町");
    }

    #[test]
    fn not_found_uses_shorter_window() {
        let now = Utc::now();
        let entry = GeocodeCacheEntry {
            address_key: "x".to_string(),
            coordinate: None,
            resolved_at: now - Duration::hours(10),
        };
        assert!(entry.is_fresh(now, None, Duration::hours(24)));
        assert!(!entry.is_fresh(now, None, Duration::hours(5)));
    }

    #[test]
    fn found_without_ttl_never_expires() {
        let now = Utc::now();
        let resolved_at = now - Duration::days(3650);
        let entry = GeocodeCacheEntry {
            address_key: "x".to_string(),
            coordinate: Some(Coordinate {
                latitude: 36.3,
                longitude: 140.4,
                resolved_at,
            }),
            resolved_at,
        };
        assert!(entry.is_fresh(now, None, Duration::hours(1)));
        assert!(!entry.is_fresh(now, Some(Duration::days(30)), Duration::hours(1)));
    }
}
