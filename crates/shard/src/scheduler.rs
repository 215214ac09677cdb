//! Periodic replication driver

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ShardError;
use crate::replication::ReplicationEngine;

/// Runs [`ReplicationEngine::run_once`] on a fixed interval, one run at a time
pub struct ReplicationScheduler {
    engine: Arc<ReplicationEngine>,
    interval: Duration,
}

impl ReplicationScheduler {
    pub fn new(engine: Arc<ReplicationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Tick until `shutdown` resolves
    ///
    /// The first run starts immediately. Ticks missed while a run is still
    /// going are skipped, and shutdown waits for the current run to finish.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!("Replication scheduler started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("Replication scheduler stopped");
    }

    /// Spawn the scheduler on the runtime
    pub fn start<S>(self, shutdown: S) -> tokio::task::JoinHandle<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(shutdown))
    }

    async fn tick(&self) {
        match self.engine.run_once().await {
            Ok(report) => {
                let failed = report.rolled_back().count();
                if failed > 0 {
                    warn!(
                        "Replication rolled back on {} partitions; their rows resync when changed again",
                        failed
                    );
                }
            }
            Err(ShardError::ReplicationInProgress) => {
                warn!("Replication run skipped: previous run still in progress");
            }
            Err(e) => error!("Replication run failed: {}", e),
        }
    }
}
