//! One end-to-end scrape run for a region: walk, fetch, parse, geocode,
//! write, checkpoint, summarize.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shopdir_core::{
    AppConfig, Notifier, Progress, ProgressKey, ProgressStoreError, Record, RecordFailure,
    RegionConfig, RunCounts, RunEvent, RunResult, RunStatus, StopReason, Stores,
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::batch::{BatchOutcome, BatchWriter};
use crate::error::{RunFatalError, SetupError};
use crate::geocode::{CachePolicy, GeocodeCache, GoogleGeocoder, Resolution};
use crate::region::{RegionScraper, ScraperSettings};
use crate::walker::{WalkEnd, WalkStep};

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Who started the run, e.g. `cli`, `api`, `schedule`.
    pub trigger: String,
    /// Clear the checkpoint before starting.
    pub reset: bool,
    /// Stop after this many pages, keeping the checkpoint.
    pub page_budget: Option<u32>,
    /// Stop at the first page boundary after this much wall-clock time.
    pub run_timeout: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            trigger: "manual".to_string(),
            reset: false,
            page_budget: None,
            run_timeout: None,
        }
    }
}

impl JobOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig, trigger: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }
}

pub struct ScrapeJob {
    scraper: RegionScraper,
    stores: Stores,
    geocoder: Option<GeocodeCache>,
    notifier: Arc<dyn Notifier>,
    batch_size: usize,
}

#[derive(Default)]
struct RunState {
    counts: RunCounts,
    failures: Vec<RecordFailure>,
    pending: Vec<Record>,
    revision: Option<i64>,
    records_written_total: u64,
    start_page: u32,
    last_completed_page: Option<u32>,
}

impl RunState {
    fn record_failure(&mut self, page: u32, url: &str, record_id: Option<String>, reason: String) {
        self.counts.records_failed += 1;
        self.failures.push(RecordFailure {
            page,
            url: url.to_string(),
            record_id,
            reason,
        });
    }

    /// Folds a write outcome in. Transient failures stay pending for the
    /// next run; rejected records are only reported.
    fn apply_write(&mut self, outcome: BatchOutcome, page: u32) {
        self.counts.records_written += outcome.written;
        self.counts.records_created += outcome.created;
        self.counts.records_updated += outcome.updated;
        self.records_written_total += outcome.written;
        for (record, reason) in outcome.rejected {
            self.record_failure(page, &record.detail_url, Some(record.id.clone()), reason);
        }
        for (record, reason) in outcome.failed {
            self.record_failure(page, &record.detail_url, Some(record.id.clone()), reason);
            self.pending.push(record);
        }
    }
}

impl ScrapeJob {
    #[must_use]
    pub fn new(
        scraper: RegionScraper,
        stores: Stores,
        geocoder: Option<GeocodeCache>,
        notifier: Arc<dyn Notifier>,
        batch_size: usize,
    ) -> Self {
        Self {
            scraper,
            stores,
            geocoder,
            notifier,
            batch_size,
        }
    }

    /// Wires a job for `region` from application configuration. Geocoding
    /// uses Google when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the region's patterns are invalid or an HTTP
    /// client cannot be built.
    pub fn from_config(
        region: &RegionConfig,
        config: &AppConfig,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SetupError> {
        let scraper = RegionScraper::from_config(region, &ScraperSettings::from(config))?;
        let geocoder = match (config.geocoding_enabled, &config.google_maps_api_key) {
            (true, Some(api_key)) => {
                let provider = GoogleGeocoder::new(
                    api_key,
                    config.geocoding_rate_limit,
                    config.scraper_request_timeout_secs,
                )?;
                Some(GeocodeCache::new(
                    Arc::clone(&stores.geocode_cache),
                    Arc::new(provider),
                    CachePolicy::from(config),
                ))
            }
            _ => None,
        };
        Ok(Self::new(scraper, stores, geocoder, notifier, config.batch_size))
    }

    #[must_use]
    pub fn region(&self) -> &RegionConfig {
        self.scraper.region()
    }

    /// Runs to completion, time-box or fatal error and returns the summary.
    /// Never panics on collaborator failure; fatal errors end up in
    /// [`RunResult::fatal_error`].
    pub async fn run(&self, options: &JobOptions) -> RunResult {
        let key = ProgressKey::scrape(&self.region().code);
        let started_at = Utc::now();
        let deadline = options.run_timeout.map(|t| Instant::now() + t);
        let mut state = RunState::default();

        let outcome = self.execute(&key, options, deadline, &mut state).await;
        self.finalize(&key, options, state, outcome, started_at).await
    }

    async fn execute(
        &self,
        key: &ProgressKey,
        options: &JobOptions,
        deadline: Option<Instant>,
        state: &mut RunState,
    ) -> Result<StopReason, RunFatalError> {
        let region = self.region();

        if options.reset {
            self.stores
                .progress
                .clear(key)
                .await
                .map_err(|e| progress_error(key, e))?;
            tracing::info!(region = %region.code, "progress reset");
        }

        let checkpoint = self
            .stores
            .progress
            .load(key)
            .await
            .map_err(|e| progress_error(key, e))?;
        let (start_page, initial_streak) = match &checkpoint {
            Some(p) => (p.resume_page(), p.resume_empty_streak()),
            None => (region.pagination.start_page(), 0),
        };
        if let Some(p) = checkpoint {
            state.revision = Some(p.revision);
            state.records_written_total = p.records_written;
            state.last_completed_page = Some(p.last_completed_page);
            state.pending = p.pending;
        }
        state.start_page = start_page;

        tracing::info!(
            region = %region.code,
            start_page,
            resumed = state.revision.is_some(),
            pending = state.pending.len(),
            "scrape run starting"
        );
        self.notify(&RunEvent::Started {
            region_code: region.code.clone(),
            region_name: region.name.clone(),
            resume_page: start_page,
        })
        .await;

        self.scraper
            .fetch_session_if_needed()
            .await
            .map_err(|e| RunFatalError::from_page(start_page, e))?;

        let mut writer = BatchWriter::new(Arc::clone(&self.stores.records), self.batch_size);

        if !state.pending.is_empty() {
            let carried = std::mem::take(&mut state.pending);
            tracing::info!(region = %region.code, count = carried.len(), "re-submitting carried-over records");
            let outcome = writer.write_batch(&carried).await;
            state.apply_write(outcome, start_page);
        }

        let mut walker = self.scraper.walk_pages(start_page, initial_streak);
        let mut seen_links: HashSet<String> = HashSet::new();

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(StopReason::TimedOut);
            }
            if options
                .page_budget
                .is_some_and(|budget| state.counts.pages_processed >= u64::from(budget))
            {
                return Ok(StopReason::PageBudget);
            }

            let (index, links, empty_streak) = match walker.next().await {
                Some(WalkStep::Page {
                    index,
                    links,
                    empty_streak,
                }) => (index, links, empty_streak),
                Some(WalkStep::Done(WalkEnd::ReachedEndPage)) | None => {
                    return Ok(StopReason::ReachedEndPage)
                }
                Some(WalkStep::Done(WalkEnd::EmptyPageStreak)) => {
                    return Ok(StopReason::EmptyPageStreak)
                }
                Some(WalkStep::Done(WalkEnd::RepeatedPages)) => {
                    return Ok(StopReason::RepeatedPages)
                }
                Some(WalkStep::Done(WalkEnd::Error { page, error })) => {
                    return Err(RunFatalError::from_page(page, error));
                }
            };

            let link_count = links.len();
            for link in links {
                if !seen_links.insert(self.scraper.canonical_detail_url(&link)) {
                    tracing::debug!(page = index, url = %link, "detail link already handled this run");
                    continue;
                }
                self.collect_record(index, &link, &mut writer, state).await;
            }

            let outcome = writer.flush().await;
            let written = outcome.written;
            state.apply_write(outcome, index);
            self.checkpoint(key, index, empty_streak, state).await?;
            state.counts.pages_processed += 1;

            tracing::info!(
                region = %region.code,
                page = index,
                links = link_count,
                written,
                "page committed"
            );
        }
    }

    async fn collect_record(
        &self,
        page: u32,
        link: &str,
        writer: &mut BatchWriter,
        state: &mut RunState,
    ) {
        match self.scraper.fetch_record(link).await {
            Ok(mut record) => {
                state.counts.records_extracted += 1;
                self.geocode(&mut record, state).await;
                writer.push(record);
            }
            Err(e) => {
                tracing::warn!(
                    region = %self.region().code,
                    page,
                    url = %link,
                    error = %e,
                    "detail page skipped"
                );
                state.record_failure(page, link, None, e.to_string());
            }
        }
    }

    async fn geocode(&self, record: &mut Record, state: &mut RunState) {
        let Some(geocoder) = &self.geocoder else {
            return;
        };
        let Some(address) = record.address.as_deref().filter(|a| !a.trim().is_empty()) else {
            return;
        };
        match geocoder.resolve(address).await {
            Ok(resolved) => {
                if resolved.cache_hit {
                    state.counts.geocode_hits += 1;
                } else {
                    state.counts.geocode_misses += 1;
                }
                if let Resolution::Found(coordinate) = resolved.resolution {
                    record.coordinate = Some(coordinate);
                }
            }
            Err(e) => {
                state.counts.geocode_errors += 1;
                tracing::warn!(record = %record.id, error = %e, "geocoding failed");
            }
        }
    }

    async fn checkpoint(
        &self,
        key: &ProgressKey,
        page: u32,
        empty_streak: u32,
        state: &mut RunState,
    ) -> Result<(), RunFatalError> {
        let progress = Progress {
            last_completed_page: page,
            empty_page_streak: empty_streak,
            pending: state.pending.clone(),
            records_written: state.records_written_total,
            revision: state.revision.unwrap_or(0),
            updated_at: Utc::now(),
        };
        let revision = self
            .stores
            .progress
            .save(key, &progress, state.revision)
            .await
            .map_err(|e| progress_error(key, e))?;
        state.revision = Some(revision);
        state.last_completed_page = Some(page);
        Ok(())
    }

    async fn finalize(
        &self,
        key: &ProgressKey,
        options: &JobOptions,
        state: RunState,
        outcome: Result<StopReason, RunFatalError>,
        started_at: chrono::DateTime<Utc>,
    ) -> RunResult {
        let region = self.region();
        let (status, stop_reason, fatal_error) = match outcome {
            Ok(reason) => {
                let clean = reason.is_terminal()
                    && state.counts.records_failed == 0
                    && state.pending.is_empty();
                let status = if clean {
                    RunStatus::Success
                } else {
                    RunStatus::PartialFailure
                };
                (status, reason, None)
            }
            Err(fatal) => {
                tracing::error!(
                    region = %region.code,
                    last_checkpoint = ?state.last_completed_page,
                    error = %fatal,
                    "scrape run failed; rerun resumes from the last checkpoint"
                );
                (RunStatus::Failed, StopReason::Fatal, Some(fatal.to_string()))
            }
        };

        if status == RunStatus::Success {
            if let Err(e) = self.stores.progress.clear(key).await {
                tracing::warn!(region = %region.code, error = %e, "failed to clear progress after success");
            }
        }

        let result = RunResult {
            run_id: Uuid::new_v4(),
            region_code: region.code.clone(),
            region_name: region.name.clone(),
            trigger: options.trigger.clone(),
            status,
            counts: state.counts,
            start_page: state.start_page,
            last_completed_page: state.last_completed_page,
            stop_reason: Some(stop_reason),
            fatal_error,
            failures: state.failures,
            started_at,
            finished_at: Utc::now(),
        };

        if let Err(e) = self.stores.history.record_run(&result).await {
            tracing::warn!(region = %region.code, error = %e, "failed to record run history");
        }

        let event = if status == RunStatus::Failed {
            RunEvent::Failed(Box::new(result.clone()))
        } else {
            RunEvent::Completed(Box::new(result.clone()))
        };
        self.notify(&event).await;

        tracing::info!(
            region = %region.code,
            status = %result.status,
            stop_reason = ?result.stop_reason,
            pages = result.counts.pages_processed,
            extracted = result.counts.records_extracted,
            written = result.counts.records_written,
            failed = result.counts.records_failed,
            geocode_hits = result.counts.geocode_hits,
            geocode_misses = result.counts.geocode_misses,
            "scrape run finished"
        );
        result
    }

    async fn notify(&self, event: &RunEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            tracing::warn!(error = %e, "notification failed");
        }
    }
}

fn progress_error(key: &ProgressKey, error: ProgressStoreError) -> RunFatalError {
    match error {
        ProgressStoreError::Conflict { .. } => RunFatalError::ProgressConflict {
            key: key.to_string(),
        },
        ProgressStoreError::Backend(reason) => RunFatalError::ProgressStore {
            key: key.to_string(),
            reason,
        },
    }
}
