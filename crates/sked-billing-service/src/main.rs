//! Sked-Billing Runner - scheduled settlement of due subscriptions.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sked_billing_core::SystemClock;
use sked_billing_service::{runner, BillingEngine, EngineConfig};
use sked_billing_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sked_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sked-Billing Runner");

    let config = EngineConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir,
        run_interval_seconds = config.run_interval_seconds,
        max_conflict_retries = config.max_conflict_retries,
        currency = %config.currency,
        "Runner configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let interval = Duration::from_secs(config.run_interval_seconds);
    let engine = Arc::new(BillingEngine::new(store, Arc::new(SystemClock), config));

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    let runs = runner::run_periodically(engine, interval, shutdown).await;

    tracing::info!(runs, "Sked-Billing Runner stopped");
    Ok(())
}
