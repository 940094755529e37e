//! Scheduled billing runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sked_billing_store::Store;
use tokio::time::MissedTickBehavior;

use crate::engine::{BillingEngine, BillingRunSummary};
use crate::error::{EngineError, Result};

/// Run one billing pass on the blocking thread pool.
///
/// # Errors
///
/// Returns the engine's error, or `Task` if the blocking task panicked.
pub async fn run_once<S: Store + 'static>(
    engine: Arc<BillingEngine<S>>,
) -> Result<BillingRunSummary> {
    tokio::task::spawn_blocking(move || engine.run_billing())
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?
}

/// Run billing every `interval` until `shutdown` resolves.
///
/// The first run starts immediately. A run in progress completes before
/// shutdown is observed. Returns the number of runs started.
pub async fn run_periodically<S: Store + 'static>(
    engine: Arc<BillingEngine<S>>,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> usize {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(runs, "Billing runner shutting down");
                return runs;
            }
            _ = ticker.tick() => {
                runs += 1;
                match run_once(Arc::clone(&engine)).await {
                    Ok(summary) => tracing::debug!(
                        completed = summary.completed.len(),
                        failed = summary.failed.len(),
                        "Scheduled billing run done"
                    ),
                    Err(err) => tracing::error!(error = %err, "Scheduled billing run failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::{TimeZone, Utc};
    use sked_billing_core::FixedClock;
    use sked_billing_store::RocksStore;
    use tempfile::TempDir;

    fn engine(temp_dir: &TempDir) -> Arc<BillingEngine<RocksStore>> {
        let store = RocksStore::open(temp_dir.path()).unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        Arc::new(BillingEngine::new(
            Arc::new(store),
            Arc::new(clock),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn run_once_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let summary = run_once(engine(&temp_dir)).await.unwrap();
        assert_eq!(summary.due, 0);
        assert!(summary.completed.is_empty());
    }

    #[tokio::test]
    async fn stops_when_shutdown_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let runs = run_periodically(
            engine(&temp_dir),
            Duration::from_secs(3600),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;
        assert_eq!(runs, 1);
    }
}
