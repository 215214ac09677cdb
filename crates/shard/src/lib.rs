//! # Shard
//!
//! Data-location and consistency core of the course platform: one central
//! store owns the catalog, every branch partition owns its users and their
//! activity.
//!
//! - [`ShardRegistry`] holds the connection pools
//! - [`LocationCache`] maps a user id to its partition
//! - [`FanOut`] runs one query against every partition and merges the rows
//! - [`IdentityBridge`] maps branch teachers to central instructors
//! - [`ReplicationEngine`] copies changed catalog rows into every partition
//!
//! [`ShardRouter`] bundles these for the service layer in [`service`].

pub mod bridge;
pub mod config;
pub mod entity;
pub mod error;
pub mod fanout;
pub mod location;
pub mod registry;
pub mod replication;
pub mod router;
pub mod scheduler;
pub mod schema;
pub mod service;

/// Branch identifier, doubles as the partition identifier
pub type PartitionId = i64;

/// Globally unique user identifier
pub type UserId = i64;

pub use bridge::IdentityBridge;
pub use config::{BranchConfig, ConnectionSettings, ShardConfig};
pub use error::{Result, ShardError};
pub use fanout::{FanOut, Sharded};
pub use location::LocationCache;
pub use registry::{PartitionHandle, ShardRegistry};
pub use replication::{CatalogTable, ReplicationEngine, ReplicationReport};
pub use router::ShardRouter;
pub use scheduler::ReplicationScheduler;
