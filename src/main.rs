use std::sync::Arc;

use anyhow::Context;
use portfolio_ledger::api::routes::{AppState, app_router};
use portfolio_ledger::config::Config;
use portfolio_ledger::persistence::{self, LedgerStore, MemoryLedgerStore, PgLedgerStore};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}=info,tower_http=info", env!("CARGO_CRATE_NAME")).into()
        }))
        .with(fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    info!(?config, "starting portfolio ledger");

    let (store, pool) = match &config.database_url {
        Some(url) => {
            let pool = persistence::create_pool_and_migrate(url, config.db_max_connections)
                .await
                .context("connecting to database")?;
            info!("connected to postgres, migrations applied");
            let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory ledger; nothing will persist");
            let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
            (store, None)
        }
    };

    // No market-data adapter is wired in; summaries report current value as unknown.
    let app_state = AppState::new(store, None, config.jwt_secret.clone());
    let app = app_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
