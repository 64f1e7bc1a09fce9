use shopdir_core::{AppConfig, RunHistory};

pub(crate) async fn list_runs(
    config: &AppConfig,
    region: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;
    let history = shopdir_db::PgRunHistory::new(pool);
    let runs = history.recent_runs(region, limit).await?;
    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {} {:<15} {:<8} pages={:<4} written={:<5} failed={:<3} {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.region_code,
            run.status.as_str(),
            run.trigger,
            run.counts.pages_processed,
            run.counts.records_written,
            run.counts.records_failed,
            run.fatal_error.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}
