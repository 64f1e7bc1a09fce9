mod api;
mod middleware;
mod runner;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
    runner::ScrapeRunner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(shopdir_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::debug!(config = ?config, "configuration loaded");

    let regions = Arc::new(shopdir_core::load_regions(&config.regions_path)?);
    let auth = AuthState::from_keys(
        &config.api_keys,
        matches!(config.env, shopdir_core::Environment::Development),
    )?;

    let pool_config = shopdir_db::PoolConfig::from_app_config(&config);
    let pool = shopdir_db::connect_pool(config.require_database_url()?, pool_config).await?;
    shopdir_db::run_migrations(&pool).await?;

    let stores = shopdir_db::pg_stores(&pool, config.batch_size);
    let notifier = shopdir_scraper::notifier_from_config(&config)?;
    let runner = Arc::new(ScrapeRunner::new(
        Arc::clone(&config),
        regions,
        stores,
        notifier,
    ));

    let _scheduler = scheduler::build_scheduler(Arc::clone(&runner)).await?;

    let app = build_app(
        AppState {
            pool: Some(pool),
            runner,
        },
        auth,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "shopdir-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
