//! User -> partition location cache
//!
//! Entries expire after the configured TTL, counted from the last successful
//! resolution. A miss or an expired entry is resolved by probing partitions
//! in ascending id order. Stale entries are tolerated until expiry; writers
//! that move a user call [`LocationCache::invalidate`].

use sea_orm::{EntityTrait, QuerySelect};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::entity::users;
use crate::error::{Result, ShardError};
use crate::fanout::FanOut;
use crate::registry::PartitionHandle;
use crate::{PartitionId, UserId};

#[derive(Debug)]
struct CacheEntry {
    partition_id: PartitionId,
    // millis since the cache epoch, bumped under the read lock on every hit
    refreshed_ms: AtomicU64,
}

pub struct LocationCache {
    entries: RwLock<HashMap<UserId, CacheEntry>>,
    epoch: Instant,
    ttl: Duration,
    fan_out: Arc<FanOut>,
}

impl LocationCache {
    pub fn new(fan_out: Arc<FanOut>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
            ttl,
            fan_out,
        }
    }

    /// Partition holding `user_id`
    ///
    /// A fresh cache entry is returned without touching any partition and
    /// its freshness window restarts. The partition lookup on a miss runs
    /// without holding the cache lock.
    pub async fn resolve_partition_for(&self, user_id: UserId) -> Result<PartitionId> {
        if let Some(partition_id) = self.cached(user_id).await {
            return Ok(partition_id);
        }

        let found = self
            .fan_out
            .locate_first("locate_user", |p| async move {
                users::Entity::find_by_id(user_id)
                    .select_only()
                    .column(users::Column::UserId)
                    .into_tuple::<i64>()
                    .one(p.connection())
                    .await
            })
            .await?;

        let Some(found) = found else {
            return Err(ShardError::UserNotFound(format!("user_id={}", user_id)));
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            user_id,
            CacheEntry {
                partition_id: found.partition_id,
                refreshed_ms: AtomicU64::new(self.now_ms()),
            },
        );
        debug!("Located user {} in branch {}", user_id, found.partition_id);
        Ok(found.partition_id)
    }

    /// Connection of the partition holding `user_id`
    pub async fn resolve_connection_for(&self, user_id: UserId) -> Result<PartitionHandle> {
        let partition_id = self.resolve_partition_for(user_id).await?;
        self.fan_out.registry().resolve(partition_id).await
    }

    pub async fn invalidate(&self, user_id: UserId) {
        if self.entries.write().await.remove(&user_id).is_some() {
            debug!("Invalidated location of user {}", user_id);
        }
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn cached(&self, user_id: UserId) -> Option<PartitionId> {
        let now = self.now_ms();
        let entries = self.entries.read().await;
        let entry = entries.get(&user_id)?;
        if !self.is_fresh(entry, now) {
            return None;
        }
        entry.refreshed_ms.fetch_max(now, Ordering::Relaxed);
        Some(entry.partition_id)
    }

    fn is_fresh(&self, entry: &CacheEntry, now_ms: u64) -> bool {
        let refreshed = entry.refreshed_ms.load(Ordering::Relaxed);
        u128::from(now_ms.saturating_sub(refreshed)) < self.ttl.as_millis()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
