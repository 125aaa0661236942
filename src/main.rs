//! ecopoints-ledger server entry point.
//!
//! Picks the storage backend, wires the services and starts the Axum HTTP
//! server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ecopoints_ledger::app_state::AppState;
use ecopoints_ledger::build_app;
use ecopoints_ledger::config::{Backend, LedgerConfig, LogFormat};
use ecopoints_ledger::domain::{Clock, SystemClock};
use ecopoints_ledger::notify::{LogMailer, spawn_notifier};
use ecopoints_ledger::persistence::{
    AttemptCache, InMemoryAttemptCache, InMemoryLedgerStore, LedgerStore, PostgresAttemptCache,
    PostgresLedgerStore,
};
use ecopoints_ledger::service::RewardsService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = LedgerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    tracing::info!(
        addr = %config.listen_addr,
        backend = ?config.backend,
        "starting ecopoints-ledger"
    );

    // Build persistence layer
    let (store, attempts): (Arc<dyn LedgerStore>, Arc<dyn AttemptCache>) = match config.backend {
        Backend::Postgres => {
            let store = PostgresLedgerStore::connect(&config).await?;
            if config.run_migrations {
                store.migrate().await?;
                tracing::info!("migrations applied");
            }
            let attempts = PostgresAttemptCache::new(store.pool().clone());
            (Arc::new(store), Arc::new(attempts))
        }
        Backend::Memory => {
            tracing::warn!("in-memory backend: state is lost on restart");
            (
                Arc::new(InMemoryLedgerStore::new()),
                Arc::new(InMemoryAttemptCache::new()),
            )
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Build application state
    let app_state = AppState::new(store, attempts, clock, &config);
    let _notifier = spawn_notifier(&app_state.event_bus, Arc::new(LogMailer));

    if config.history_reconcile_interval_secs > 0 {
        spawn_reconciler(
            Arc::clone(&app_state.rewards),
            Duration::from_secs(config.history_reconcile_interval_secs),
        );
    }

    // Start server
    let app = build_app(app_state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically reconciles every active user's points history.
fn spawn_reconciler(rewards: Arc<RewardsService>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match rewards.reconcile_all().await {
                Ok(users) => tracing::info!(users, "history reconciled"),
                Err(e) => tracing::warn!(error = %e, "history reconciliation failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
