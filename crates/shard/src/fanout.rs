//! Cross-partition query execution
//!
//! A fan-out runs the same query against every partition and merges the
//! rows. Partitions that fail or time out are skipped and logged; the call
//! only fails when no partition answered. Write paths that must see every
//! partition use [`FanOut::require_all`] instead.

use futures::stream::{self, StreamExt};
use sea_orm::DbErr;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FanOutConfig;
use crate::error::{Result, ShardError};
use crate::registry::{PartitionHandle, ShardRegistry};
use crate::PartitionId;

/// A row tagged with the partition it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Sharded<T> {
    pub partition_id: PartitionId,
    pub row: T,
}

impl<T> Sharded<T> {
    pub fn into_row(self) -> T {
        self.row
    }
}

/// Fan-out query engine over the registry's partitions
pub struct FanOut {
    registry: Arc<ShardRegistry>,
    max_concurrency: usize,
    leg_timeout: Duration,
    legs_issued: AtomicU64,
}

impl FanOut {
    pub fn new(registry: Arc<ShardRegistry>, config: &FanOutConfig) -> Self {
        Self {
            registry,
            max_concurrency: config.max_concurrency.max(1),
            leg_timeout: config.leg_timeout(),
            legs_issued: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Number of partition queries issued since creation
    pub fn legs_issued(&self) -> u64 {
        self.legs_issued.load(Ordering::Relaxed)
    }

    /// Run `query` on every partition and concatenate the rows
    ///
    /// Rows keep the order their partition returned them in; partitions are
    /// concatenated in ascending id order. Callers must not rely on either.
    pub async fn merge_all<T, F, Fut>(&self, label: &str, query: F) -> Result<Vec<Sharded<T>>>
    where
        F: Fn(PartitionHandle) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, DbErr>>,
    {
        let results = self.run_all(label, &query).await;
        let attempted = results.len();

        let mut merged = Vec::new();
        let mut failed = 0;
        for (partition_id, outcome) in results {
            match outcome {
                Ok(rows) => merged.extend(rows.into_iter().map(|row| Sharded { partition_id, row })),
                Err(reason) => {
                    failed += 1;
                    warn!(
                        "Fan-out {}: skipping branch {}: {}",
                        label, partition_id, reason
                    );
                }
            }
        }

        if failed == attempted {
            return Err(ShardError::AllPartitionsUnreachable { attempted });
        }

        debug!(
            "Fan-out {}: {} rows from {}/{} partitions",
            label,
            merged.len(),
            attempted - failed,
            attempted
        );
        Ok(merged)
    }

    /// Like [`merge_all`](Self::merge_all), keeping the first row per key
    pub async fn merge_unique<T, K, F, Fut, KF>(
        &self,
        label: &str,
        query: F,
        key: KF,
    ) -> Result<Vec<Sharded<T>>>
    where
        F: Fn(PartitionHandle) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, DbErr>>,
        K: Eq + Hash,
        KF: Fn(&T) -> K,
    {
        let rows = self.merge_all(label, query).await?;
        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|sharded| seen.insert(key(&sharded.row)))
            .collect())
    }

    /// Query partitions one at a time in ascending id order until one
    /// returns a row
    ///
    /// Partitions after the first match are never queried. Returns
    /// `Ok(None)` when every reachable partition answered with no row.
    pub async fn locate_first<T, F, Fut>(&self, label: &str, query: F) -> Result<Option<Sharded<T>>>
    where
        F: Fn(PartitionHandle) -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, DbErr>>,
    {
        let partitions = self.registry.all_connections().await;
        let attempted = partitions.len();
        let mut failed = 0;

        for handle in partitions {
            let partition_id = handle.id;
            match self.run_leg(query(handle)).await {
                Ok(Some(row)) => {
                    debug!("Fan-out {}: found in branch {}", label, partition_id);
                    return Ok(Some(Sharded { partition_id, row }));
                }
                Ok(None) => {}
                Err(reason) => {
                    failed += 1;
                    warn!(
                        "Fan-out {}: skipping branch {}: {}",
                        label, partition_id, reason
                    );
                }
            }
        }

        if failed == attempted {
            return Err(ShardError::AllPartitionsUnreachable { attempted });
        }
        Ok(None)
    }

    /// Run `query` on every partition, failing if any partition fails
    pub async fn require_all<T, F, Fut>(&self, label: &str, query: F) -> Result<Vec<Sharded<T>>>
    where
        F: Fn(PartitionHandle) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, DbErr>>,
    {
        let results = self.run_all(label, &query).await;
        if results.is_empty() {
            return Err(ShardError::AllPartitionsUnreachable { attempted: 0 });
        }

        let mut merged = Vec::new();
        for (partition_id, outcome) in results {
            match outcome {
                Ok(rows) => merged.extend(rows.into_iter().map(|row| Sharded { partition_id, row })),
                Err(reason) => {
                    warn!("Fan-out {}: branch {} failed: {}", label, partition_id, reason);
                    return Err(ShardError::PartitionUnavailable {
                        partition_id,
                        reason,
                    });
                }
            }
        }
        Ok(merged)
    }

    /// Concurrent legs, results sorted by partition id
    async fn run_all<T, F, Fut>(
        &self,
        label: &str,
        query: &F,
    ) -> Vec<(PartitionId, std::result::Result<Vec<T>, String>)>
    where
        F: Fn(PartitionHandle) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, DbErr>>,
    {
        let partitions = self.registry.all_connections().await;
        debug!("Fan-out {} across {} partitions", label, partitions.len());

        let mut results: Vec<_> = stream::iter(partitions)
            .map(|handle| async move {
                let partition_id = handle.id;
                (partition_id, self.run_leg(query(handle)).await)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        results.sort_by_key(|(partition_id, _)| *partition_id);
        results
    }

    async fn run_leg<R, Fut>(&self, leg: Fut) -> std::result::Result<R, String>
    where
        Fut: Future<Output = std::result::Result<R, DbErr>>,
    {
        self.legs_issued.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.leg_timeout, leg).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.leg_timeout)),
        }
    }
}
