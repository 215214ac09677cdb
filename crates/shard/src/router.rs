//! Shard router facade used by the service layer

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::bridge::IdentityBridge;
use crate::config::ShardConfig;
use crate::entity::instructors;
use crate::error::Result;
use crate::fanout::FanOut;
use crate::location::LocationCache;
use crate::registry::{PartitionHandle, ShardRegistry};
use crate::{PartitionId, UserId};

/// Registry, fan-out engine, location cache and identity bridge in one place
pub struct ShardRouter {
    registry: Arc<ShardRegistry>,
    fan_out: Arc<FanOut>,
    locations: LocationCache,
    bridge: IdentityBridge,
}

impl ShardRouter {
    /// Connect every configured database and build the router
    pub async fn connect(config: &ShardConfig) -> Result<Self> {
        let registry = Arc::new(ShardRegistry::connect(config).await?);
        Ok(Self::new(registry, config))
    }

    pub fn new(registry: Arc<ShardRegistry>, config: &ShardConfig) -> Self {
        let fan_out = Arc::new(FanOut::new(registry.clone(), &config.fan_out));
        Self {
            locations: LocationCache::new(fan_out.clone(), config.location_cache.ttl()),
            bridge: IdentityBridge::new(registry.clone()),
            registry,
            fan_out,
        }
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    pub fn fan_out(&self) -> &FanOut {
        &self.fan_out
    }

    pub fn locations(&self) -> &LocationCache {
        &self.locations
    }

    pub fn bridge(&self) -> &IdentityBridge {
        &self.bridge
    }

    pub async fn resolve_partition_for(&self, user_id: UserId) -> Result<PartitionId> {
        self.locations.resolve_partition_for(user_id).await
    }

    /// Partition handle by explicit id
    pub async fn resolve_connection(&self, partition_id: PartitionId) -> Result<PartitionHandle> {
        self.registry.resolve(partition_id).await
    }

    /// Partition handle of the partition holding `user_id`
    pub async fn connection_for_user(&self, user_id: UserId) -> Result<PartitionHandle> {
        self.locations.resolve_connection_for(user_id).await
    }

    pub async fn all_connections(&self) -> Vec<PartitionHandle> {
        self.registry.all_connections().await
    }

    pub async fn central(&self) -> Result<DatabaseConnection> {
        self.registry.central().await
    }

    pub async fn ensure_instructor(
        &self,
        partition_id: PartitionId,
        local_user_id: UserId,
    ) -> Result<instructors::Model> {
        self.bridge.ensure_instructor(partition_id, local_user_id).await
    }

    pub async fn invalidate(&self, user_id: UserId) {
        self.locations.invalidate(user_id).await
    }
}
