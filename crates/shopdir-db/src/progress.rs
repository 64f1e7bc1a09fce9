//! Database operations for `scrape_progress`.
//!
//! Every write is a compare-and-swap on `revision`: an insert only succeeds
//! when no row exists, an update only when the caller saw the current
//! revision. A lost race returns `Ok(None)` rather than an error.

use chrono::{DateTime, Utc};
use shopdir_core::{Progress, ProgressKey, Record};
use sqlx::PgPool;

use crate::{to_i32, to_i64, to_u32, to_u64, DbError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProgressRow {
    pub region_code: String,
    pub purpose: String,
    pub last_completed_page: i32,
    pub empty_page_streak: i32,
    pub pending: serde_json::Value,
    pub records_written: i64,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRow {
    /// # Errors
    ///
    /// Returns [`DbError`] if a stored value does not fit the domain type.
    pub fn into_progress(self) -> Result<Progress, DbError> {
        let pending: Vec<Record> =
            serde_json::from_value(self.pending).map_err(|source| DbError::Decode {
                column: "pending",
                source,
            })?;
        Ok(Progress {
            last_completed_page: to_u32("last_completed_page", self.last_completed_page)?,
            empty_page_streak: to_u32("empty_page_streak", self.empty_page_streak)?,
            pending,
            records_written: to_u64("records_written", self.records_written)?,
            revision: self.revision,
            updated_at: self.updated_at,
        })
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_progress(pool: &PgPool, key: &ProgressKey) -> Result<Option<ProgressRow>, DbError> {
    let row = sqlx::query_as::<_, ProgressRow>(
        "SELECT region_code, purpose, last_completed_page, empty_page_streak, pending, \
                records_written, revision, updated_at \
         FROM scrape_progress \
         WHERE region_code = $1 AND purpose = $2",
    )
    .bind(&key.region_code)
    .bind(&key.purpose)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Writes `progress` if the stored revision still equals `expected_revision`
/// (`None`: no row may exist yet). Returns the new revision, or `None` when
/// another writer got there first.
///
/// # Errors
///
/// Returns [`DbError`] if the pending records cannot be encoded or the
/// statement fails.
pub async fn save_progress(
    pool: &PgPool,
    key: &ProgressKey,
    progress: &Progress,
    expected_revision: Option<i64>,
) -> Result<Option<i64>, DbError> {
    let pending = serde_json::to_value(&progress.pending).map_err(|source| DbError::Decode {
        column: "pending",
        source,
    })?;

    let revision = match expected_revision {
        None => {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO scrape_progress \
                     (region_code, purpose, last_completed_page, empty_page_streak, pending, \
                      records_written, revision, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, 1, NOW()) \
                 ON CONFLICT (region_code, purpose) DO NOTHING \
                 RETURNING revision",
            )
            .bind(&key.region_code)
            .bind(&key.purpose)
            .bind(to_i32(progress.last_completed_page))
            .bind(to_i32(progress.empty_page_streak))
            .bind(pending)
            .bind(to_i64(progress.records_written))
            .fetch_optional(pool)
            .await?
        }
        Some(expected) => {
            sqlx::query_scalar::<_, i64>(
                "UPDATE scrape_progress SET \
                     last_completed_page = $3, \
                     empty_page_streak   = $4, \
                     pending             = $5, \
                     records_written     = $6, \
                     revision            = revision + 1, \
                     updated_at          = NOW() \
                 WHERE region_code = $1 AND purpose = $2 AND revision = $7 \
                 RETURNING revision",
            )
            .bind(&key.region_code)
            .bind(&key.purpose)
            .bind(to_i32(progress.last_completed_page))
            .bind(to_i32(progress.empty_page_streak))
            .bind(pending)
            .bind(to_i64(progress.records_written))
            .bind(expected)
            .fetch_optional(pool)
            .await?
        }
    };
    Ok(revision)
}

/// Deletes the checkpoint. Returns whether one existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn clear_progress(pool: &PgPool, key: &ProgressKey) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM scrape_progress WHERE region_code = $1 AND purpose = $2")
        .bind(&key.region_code)
        .bind(&key.purpose)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
