//! `scrape`: run the pipeline for one or more regions in sequence.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use shopdir_core::{AppConfig, Notifier, RegionConfig, RunResult, RunStatus};
use shopdir_scraper::{notifier_from_config, JobOptions, MemoryStores, NoopNotifier, ScrapeJob};

#[derive(Debug, Args)]
pub(crate) struct ScrapeArgs {
    /// Region code to scrape (repeatable). Defaults to SHOPDIR_TARGET_REGIONS.
    #[arg(long = "region")]
    pub regions: Vec<String>,

    /// Discard the checkpoint and start from the first page
    #[arg(long)]
    pub reset: bool,

    /// Use in-memory stores; nothing is written to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after this many pages, keeping the checkpoint for the next run
    #[arg(long)]
    pub max_pages: Option<u32>,
}

/// Exit status for the worst run: 0 success, 2 partial failure, 1 failed.
pub(crate) fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::PartialFailure => ExitCode::from(2),
        RunStatus::Failed => ExitCode::FAILURE,
    }
}

pub(crate) fn worst_status(a: RunStatus, b: RunStatus) -> RunStatus {
    let rank = |s: RunStatus| match s {
        RunStatus::Success => 0,
        RunStatus::PartialFailure => 1,
        RunStatus::Failed => 2,
    };
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

pub(crate) fn select_regions(
    available: &[RegionConfig],
    requested: &[String],
    defaults: &[String],
) -> anyhow::Result<Vec<RegionConfig>> {
    let codes = if requested.is_empty() { defaults } else { requested };
    if codes.is_empty() {
        anyhow::bail!("no region given; pass --region or set SHOPDIR_TARGET_REGIONS");
    }
    codes
        .iter()
        .map(|code| {
            available
                .iter()
                .find(|r| &r.code == code)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("region '{code}' is not configured"))
        })
        .collect()
}

pub(crate) async fn run_scrape(config: &AppConfig, args: &ScrapeArgs) -> anyhow::Result<ExitCode> {
    let regions_file = shopdir_core::load_regions(&config.regions_path)?;
    let regions = select_regions(&regions_file.regions, &args.regions, &config.target_regions)?;

    let memory = args.dry_run.then(|| MemoryStores::new(config.batch_size));
    let (stores, notifier) = match &memory {
        Some(memory) => {
            let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
            (memory.stores(), notifier)
        }
        None => {
            let pool = crate::connect(config).await?;
            (
                shopdir_db::pg_stores(&pool, config.batch_size),
                notifier_from_config(config)?,
            )
        }
    };

    let mut worst = RunStatus::Success;
    for region in &regions {
        let job = ScrapeJob::from_config(region, config, stores.clone(), Arc::clone(&notifier))?;
        let options = JobOptions {
            reset: args.reset,
            page_budget: args.max_pages,
            ..JobOptions::from_config(config, "cli")
        };
        let result = job.run(&options).await;
        print_summary(&result);
        worst = worst_status(worst, result.status);
    }

    if let Some(memory) = &memory {
        println!("dry-run: {} records held in memory", memory.records.len());
    }
    Ok(exit_code(worst))
}

fn print_summary(result: &RunResult) {
    let c = &result.counts;
    println!(
        "{} {} [{}] pages={} extracted={} written={} (new {}, updated {}) failed={} geocode hit/miss/err={}/{}/{} resume_from={} stop={:?} {:.1}s",
        result.region_code,
        result.region_name,
        result.status,
        c.pages_processed,
        c.records_extracted,
        c.records_written,
        c.records_created,
        c.records_updated,
        c.records_failed,
        c.geocode_hits,
        c.geocode_misses,
        c.geocode_errors,
        result.start_page,
        result.stop_reason,
        result.duration_secs(),
    );
    if let Some(error) = &result.fatal_error {
        println!("  error: {error}");
    }
    for failure in result.failures.iter().take(10) {
        println!("  page {} {}: {}", failure.page, failure.url, failure.reason);
    }
    if result.failures.len() > 10 {
        println!("  ... {} more failures", result.failures.len() - 10);
    }
}
