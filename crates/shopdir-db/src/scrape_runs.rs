//! Database operations for `scrape_runs`, the append-only run history.

use chrono::{DateTime, Utc};
use shopdir_core::{RecordFailure, RunCounts, RunResult, RunStatus, StopReason};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{to_i32, to_i64, to_u32, DbError};

/// A row from the `scrape_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub region_code: String,
    pub region_name: String,
    pub trigger_source: String,
    pub status: String,
    pub stop_reason: Option<String>,
    pub start_page: i32,
    pub last_completed_page: Option<i32>,
    pub counts: serde_json::Value,
    pub failures: serde_json::Value,
    pub fatal_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScrapeRunRow {
    /// # Errors
    ///
    /// Returns [`DbError`] if a stored value no longer matches the domain
    /// types.
    pub fn into_run_result(self) -> Result<RunResult, DbError> {
        let status = self
            .status
            .parse::<RunStatus>()
            .map_err(|_| DbError::UnknownValue {
                column: "status",
                value: self.status.clone(),
            })?;
        let stop_reason = self
            .stop_reason
            .map(|reason| {
                serde_json::from_value::<StopReason>(serde_json::Value::String(reason.clone()))
                    .map_err(|_| DbError::UnknownValue {
                        column: "stop_reason",
                        value: reason,
                    })
            })
            .transpose()?;
        let counts: RunCounts =
            serde_json::from_value(self.counts).map_err(|source| DbError::Decode {
                column: "counts",
                source,
            })?;
        let failures: Vec<RecordFailure> =
            serde_json::from_value(self.failures).map_err(|source| DbError::Decode {
                column: "failures",
                source,
            })?;

        Ok(RunResult {
            run_id: self.public_id,
            region_code: self.region_code,
            region_name: self.region_name,
            trigger: self.trigger_source,
            status,
            counts,
            start_page: to_u32("start_page", self.start_page)?,
            last_completed_page: self
                .last_completed_page
                .map(|page| to_u32("last_completed_page", page))
                .transpose()?,
            stop_reason,
            fatal_error: self.fatal_error,
            failures,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

fn stop_reason_str(reason: StopReason) -> Option<String> {
    match serde_json::to_value(reason) {
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Appends one finished run. Returns the row id.
///
/// # Errors
///
/// Returns [`DbError`] if the counts cannot be encoded or the insert fails.
pub async fn insert_scrape_run(pool: &PgPool, run: &RunResult) -> Result<i64, DbError> {
    let encode = |column: &'static str, result: Result<serde_json::Value, serde_json::Error>| {
        result.map_err(|source| DbError::Decode { column, source })
    };
    let counts = encode("counts", serde_json::to_value(&run.counts))?;
    let failures = encode("failures", serde_json::to_value(&run.failures))?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO scrape_runs \
             (public_id, region_code, region_name, trigger_source, status, stop_reason, \
              start_page, last_completed_page, pages_processed, records_written, \
              records_failed, counts, failures, fatal_error, started_at, finished_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
         RETURNING id",
    )
    .bind(run.run_id)
    .bind(&run.region_code)
    .bind(&run.region_name)
    .bind(&run.trigger)
    .bind(run.status.as_str())
    .bind(run.stop_reason.and_then(stop_reason_str))
    .bind(to_i32(run.start_page))
    .bind(run.last_completed_page.map(to_i32))
    .bind(to_i64(run.counts.pages_processed))
    .bind(to_i64(run.counts.records_written))
    .bind(to_i64(run.counts.records_failed))
    .bind(counts)
    .bind(failures)
    .bind(&run.fatal_error)
    .bind(run.started_at)
    .bind(run.finished_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Most recent runs first, optionally for one region.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_runs(
    pool: &PgPool,
    region_code: Option<&str>,
    limit: i64,
) -> Result<Vec<ScrapeRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeRunRow>(
        "SELECT id, public_id, region_code, region_name, trigger_source, status, stop_reason, \
                start_page, last_completed_page, counts, failures, fatal_error, \
                started_at, finished_at \
         FROM scrape_runs \
         WHERE $1::text IS NULL OR region_code = $1 \
         ORDER BY started_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(region_code)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
