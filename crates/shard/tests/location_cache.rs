mod support;

use shard::config::FanOutConfig;
use shard::{FanOut, LocationCache, ShardError};
use std::sync::Arc;
use std::time::Duration;
use support::Harness;

#[tokio::test]
async fn test_resolve_is_served_from_cache() {
    let harness = Harness::new(&[1, 2, 3]).await;
    harness.seed_user(2, 2001, "bob", "student").await;

    assert_eq!(harness.router.resolve_partition_for(2001).await.unwrap(), 2);
    let after_first = harness.legs_issued();
    assert_eq!(after_first, 2);

    for _ in 0..5 {
        assert_eq!(harness.router.resolve_partition_for(2001).await.unwrap(), 2);
    }
    assert_eq!(harness.legs_issued(), after_first);
}

#[tokio::test]
async fn test_invalidate_forces_lookup() {
    let harness = Harness::new(&[1, 2]).await;
    harness.seed_user(1, 1001, "alice", "teacher").await;

    harness.router.resolve_partition_for(1001).await.unwrap();
    let before = harness.legs_issued();

    harness.router.invalidate(1001).await;
    // idempotent
    harness.router.invalidate(1001).await;

    assert_eq!(harness.router.resolve_partition_for(1001).await.unwrap(), 1);
    assert_eq!(harness.legs_issued(), before + 1);
}

#[tokio::test]
async fn test_unknown_user() {
    let harness = Harness::new(&[1, 2]).await;

    let err = harness.router.resolve_partition_for(42).await.unwrap_err();
    assert!(matches!(err, ShardError::UserNotFound(_)));
    assert!(err.is_not_found());
    assert!(harness.router.locations().is_empty().await);
}

#[tokio::test]
async fn test_unreachable_partitions_are_not_user_not_found() {
    // no tables anywhere, so every leg fails
    let harness = Harness::connect(&[1, 2]).await;

    let err = harness.router.resolve_partition_for(42).await.unwrap_err();
    assert!(matches!(
        err,
        ShardError::AllPartitionsUnreachable { attempted: 2 }
    ));
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let harness = Harness::new(&[1, 2]).await;
    harness.seed_user(2, 2001, "bob", "student").await;

    let fan_out = Arc::new(FanOut::new(harness.registry.clone(), &FanOutConfig::default()));
    let cache = LocationCache::new(fan_out.clone(), Duration::from_millis(100));

    cache.resolve_partition_for(2001).await.unwrap();
    cache.resolve_partition_for(2001).await.unwrap();
    assert_eq!(fan_out.legs_issued(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.resolve_partition_for(2001).await.unwrap(), 2);
    assert_eq!(fan_out.legs_issued(), 4);
}

#[tokio::test]
async fn test_hit_extends_freshness() {
    let harness = Harness::new(&[1]).await;
    harness.seed_user(1, 1001, "alice", "student").await;

    let fan_out = Arc::new(FanOut::new(harness.registry.clone(), &FanOutConfig::default()));
    let cache = LocationCache::new(fan_out.clone(), Duration::from_millis(400));

    cache.resolve_partition_for(1001).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    cache.resolve_partition_for(1001).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    // 500ms after insertion but only 250ms after the last hit
    cache.resolve_partition_for(1001).await.unwrap();
    assert_eq!(fan_out.legs_issued(), 1);
}

#[tokio::test]
async fn test_purge_and_invalidate_all() {
    let harness = Harness::new(&[1]).await;
    harness.seed_user(1, 1001, "alice", "student").await;
    harness.seed_user(1, 1002, "carol", "student").await;

    let fan_out = Arc::new(FanOut::new(harness.registry.clone(), &FanOutConfig::default()));
    let cache = LocationCache::new(fan_out, Duration::from_millis(50));

    cache.resolve_partition_for(1001).await.unwrap();
    cache.resolve_partition_for(1002).await.unwrap();
    assert_eq!(cache.len().await, 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.purge_expired().await, 2);

    cache.resolve_partition_for(1001).await.unwrap();
    cache.invalidate_all().await;
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_resolve_connection_for_user() {
    let harness = Harness::new(&[1, 2]).await;
    harness.seed_user(2, 2001, "bob", "student").await;

    let handle = harness.router.connection_for_user(2001).await.unwrap();
    assert_eq!(handle.id, 2);
    assert_eq!(handle.name, "Branch 2");
}
