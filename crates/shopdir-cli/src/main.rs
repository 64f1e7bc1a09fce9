mod progress;
mod runs;
mod scrape;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shopdir_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::progress::ProgressCommands;
use crate::scrape::ScrapeArgs;

#[derive(Debug, Parser)]
#[command(name = "shopdir-cli")]
#[command(about = "Resumable scraper for regional shop directories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape one or more regions, resuming from the last checkpoint
    Scrape(ScrapeArgs),
    /// Inspect or reset a region's checkpoint
    Progress {
        #[command(subcommand)]
        command: ProgressCommands,
    },
    /// List recent scrape runs
    Runs {
        /// Only runs for this region code
        #[arg(long)]
        region: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List the regions in the regions file
    Regions {
        #[arg(long, env = "SHOPDIR_REGIONS_PATH", default_value = "./config/regions.yaml")]
        path: PathBuf,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Regions { path } = &cli.command {
        init_tracing("info")?;
        print_regions(path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = shopdir_core::load_app_config_from_env()?;
    init_tracing(&config.log_level)?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Scrape(args) => scrape::run_scrape(&config, &args).await,
        Commands::Progress { command } => {
            progress::run_progress(&config, command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Runs { region, limit } => {
            runs::list_runs(&config, region.as_deref(), limit).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Db { command } => {
            run_db(&config, &command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Regions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

/// Connects to Postgres and applies pending migrations.
pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let database_url = config.require_database_url()?;
    let pool =
        shopdir_db::connect_pool(database_url, shopdir_db::PoolConfig::from_app_config(config))
            .await?;
    let applied = shopdir_db::run_migrations(&pool).await?;
    if applied > 0 {
        tracing::info!(applied, "applied database migrations");
    }
    Ok(pool)
}

async fn run_db(config: &AppConfig, command: &DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            let database_url = config.require_database_url()?;
            let pool = shopdir_db::connect_pool(
                database_url,
                shopdir_db::PoolConfig::from_app_config(config),
            )
            .await?;
            shopdir_db::health_check(&pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let pool = connect(config).await?;
            drop(pool);
            println!("migrations up to date");
        }
    }
    Ok(())
}

fn print_regions(path: &std::path::Path) -> anyhow::Result<()> {
    let regions = shopdir_core::load_regions(path)?;
    for region in &regions.regions {
        let pagination = match region.pagination {
            shopdir_core::PaginationConfig::Fixed {
                start_page,
                end_page,
            } => format!("pages {start_page}..={end_page}"),
            shopdir_core::PaginationConfig::Auto {
                start_page,
                max_empty_pages,
                ..
            } => format!("auto from {start_page}, stop after {max_empty_pages} empty"),
        };
        println!(
            "{}  {:<12} {:<11} session={:<3} {}",
            region.code,
            region.name,
            region.parser.kind(),
            if region.session.is_some() { "yes" } else { "no" },
            pagination
        );
    }
    Ok(())
}
