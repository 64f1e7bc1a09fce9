use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::Record;

pub const SCRAPE_PURPOSE: &str = "scrape";

/// Identifies one resumable crawl: a region plus what the run is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressKey {
    pub region_code: String,
    pub purpose: String,
}

impl ProgressKey {
    #[must_use]
    pub fn scrape(region_code: &str) -> Self {
        Self {
            region_code: region_code.to_string(),
            purpose: SCRAPE_PURPOSE.to_string(),
        }
    }
}

impl std::fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.region_code, self.purpose)
    }
}

/// Checkpoint for a [`ProgressKey`].
///
/// `last_completed_page` only ever advances after the page's records were
/// committed. `revision` is owned by the store and used for compare-and-swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub last_completed_page: u32,
    /// Consecutive empty pages up to and including `last_completed_page`.
    pub empty_page_streak: u32,
    /// Records that could not be written yet; re-submitted first on resume.
    #[serde(default)]
    pub pending: Vec<Record>,
    pub records_written: u64,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// Page a resumed walk starts at. The boundary page is processed again.
    #[must_use]
    pub fn resume_page(&self) -> u32 {
        self.last_completed_page
    }

    /// Empty streak the walker starts with, excluding the boundary page it is
    /// about to re-walk.
    #[must_use]
    pub fn resume_empty_streak(&self) -> u32 {
        self.empty_page_streak.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(last: u32, streak: u32) -> Progress {
        Progress {
            last_completed_page: last,
            empty_page_streak: streak,
            pending: Vec::new(),
            records_written: 0,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resume_starts_at_boundary_page() {
        assert_eq!(progress(5, 0).resume_page(), 5);
    }

    #[test]
    fn resume_streak_excludes_boundary_page() {
        assert_eq!(progress(5, 2).resume_empty_streak(), 1);
        assert_eq!(progress(5, 0).resume_empty_streak(), 0);
    }

    #[test]
    fn key_display_joins_region_and_purpose() {
        assert_eq!(ProgressKey::scrape("08").to_string(), "08/scrape");
    }
}
