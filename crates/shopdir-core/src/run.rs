use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "partial_failure" => Ok(RunStatus::PartialFailure),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Why the page walk of a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ReachedEndPage,
    EmptyPageStreak,
    RepeatedPages,
    PageBudget,
    TimedOut,
    Fatal,
}

impl StopReason {
    /// True when the crawl reached a natural end of the listing.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StopReason::ReachedEndPage | StopReason::EmptyPageStreak | StopReason::RepeatedPages
        )
    }
}

/// A detail page or record that did not make it into storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub page: u32,
    pub url: String,
    pub record_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pages_processed: u64,
    pub records_extracted: u64,
    pub records_written: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    pub geocode_hits: u64,
    pub geocode_misses: u64,
    pub geocode_errors: u64,
}

/// Terminal summary of one scrape run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub region_code: String,
    pub region_name: String,
    pub trigger: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub start_page: u32,
    pub last_completed_page: Option<u32>,
    pub stop_reason: Option<StopReason>,
    pub fatal_error: Option<String>,
    pub failures: Vec<RecordFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        let millis = (self.finished_at - self.started_at).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        let secs = millis as f64 / 1000.0;
        secs
    }
}
