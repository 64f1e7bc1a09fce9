use clap::Subcommand;
use shopdir_core::{AppConfig, ProgressKey, ProgressStore};

#[derive(Debug, Subcommand)]
pub(crate) enum ProgressCommands {
    /// Show the checkpoint for a region
    Show {
        #[arg(long)]
        region: String,
    },
    /// Delete the checkpoint so the next run starts from the first page
    Clear {
        #[arg(long)]
        region: String,
    },
}

pub(crate) async fn run_progress(config: &AppConfig, command: ProgressCommands) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;
    let store = shopdir_db::PgProgressStore::new(pool.clone());

    match command {
        ProgressCommands::Show { region } => {
            let key = ProgressKey::scrape(&region);
            let shops = shopdir_db::count_shops(&pool, Some(&region)).await?;
            match store.load(&key).await? {
                Some(progress) => println!(
                    "{key}: last completed page {}, empty streak {}, {} pending, {} written, revision {}, updated {}; {shops} shops stored",
                    progress.last_completed_page,
                    progress.empty_page_streak,
                    progress.pending.len(),
                    progress.records_written,
                    progress.revision,
                    progress.updated_at.to_rfc3339(),
                ),
                None => println!("{key}: no checkpoint; {shops} shops stored"),
            }
        }
        ProgressCommands::Clear { region } => {
            let key = ProgressKey::scrape(&region);
            store.clear(&key).await?;
            tracing::info!(region = %region, "progress cleared");
            println!("{key}: checkpoint cleared");
        }
    }
    Ok(())
}
