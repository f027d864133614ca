use crate::sync::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Runs the locked drift check at startup and then on a fixed interval.
/// Failures are logged, never propagated.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    run_on_startup: bool,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration, run_on_startup: bool) -> Self {
        Self {
            engine,
            interval,
            run_on_startup,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        if self.run_on_startup {
            info!("Running startup drift check");
            self.tick().await;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.engine.perform_drift_check().await {
            Ok(result) if result.skipped => {}
            Ok(result) => {
                if result.drift_detected {
                    info!("\n{}", result.report());
                }
            }
            Err(e) => error!("Scheduled drift check failed: {}", e),
        }
    }
}
