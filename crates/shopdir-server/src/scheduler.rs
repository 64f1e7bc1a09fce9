//! Background job scheduler.
//!
//! Each cron expression in `SHOPDIR_SCRAPE_SCHEDULE` re-invokes the target
//! regions one after another. A time-boxed run leaves a checkpoint, so the
//! next trigger continues the same crawl.

use std::sync::Arc;

use shopdir_core::RunStatus;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::runner::{RunRequest, RunnerError, ScrapeRunner};

/// Builds and starts the scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(runner: Arc<ScrapeRunner>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let schedule = runner.config().scrape_schedule.clone();
    if schedule.is_empty() {
        tracing::info!("scheduler: SHOPDIR_SCRAPE_SCHEDULE is empty; no scrape jobs registered");
    }
    for cron in &schedule {
        register_scrape_job(&scheduler, cron, Arc::clone(&runner)).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_scrape_job(
    scheduler: &JobScheduler,
    cron: &str,
    runner: Arc<ScrapeRunner>,
) -> Result<(), JobSchedulerError> {
    let label = cron.to_string();
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let runner = Arc::clone(&runner);
        let label = label.clone();

        Box::pin(async move {
            tracing::info!(cron = %label, "scheduler: starting scrape cycle");
            run_target_regions(&runner).await;
            tracing::info!(cron = %label, "scheduler: scrape cycle complete");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: registered scrape job");
    Ok(())
}

/// Runs every target region in turn. A region that is still running from an
/// earlier trigger is skipped.
async fn run_target_regions(runner: &ScrapeRunner) {
    let targets = runner.config().target_regions.clone();
    for code in &targets {
        match runner.run(code, "schedule", &RunRequest::default()).await {
            Ok(run) => match run.status {
                RunStatus::Success => tracing::info!(
                    region = %code,
                    written = run.counts.records_written,
                    "scheduler: region complete"
                ),
                RunStatus::PartialFailure => tracing::warn!(
                    region = %code,
                    written = run.counts.records_written,
                    failed = run.counts.records_failed,
                    checkpoint = ?run.last_completed_page,
                    "scheduler: region partially complete; next trigger resumes"
                ),
                RunStatus::Failed => tracing::error!(
                    region = %code,
                    error = run.fatal_error.as_deref().unwrap_or("unknown"),
                    checkpoint = ?run.last_completed_page,
                    "scheduler: region failed"
                ),
            },
            Err(RunnerError::AlreadyRunning(_)) => {
                tracing::warn!(region = %code, "scheduler: previous run still active; skipping");
            }
            Err(e) => tracing::error!(region = %code, error = %e, "scheduler: could not start run"),
        }
    }
}
