mod support;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use shard::entity::users;
use shard::service::DirectoryService;
use shard::{schema, ShardError};
use support::Harness;

#[tokio::test]
async fn test_email_lookup_stops_at_first_match() {
    let harness = Harness::new(&[1, 2, 3]).await;
    harness.seed_user(2, 2001, "a", "student").await;

    let directory = DirectoryService::new(harness.router.clone());
    let found = directory.find_account_by_email("a@example.com").await.unwrap();

    assert_eq!(found.partition_id, 2);
    assert_eq!(found.row.user_id, 2001);
    // partition 3 was never queried
    assert_eq!(harness.legs_issued(), 2);
}

#[tokio::test]
async fn test_email_lookup_not_found() {
    let harness = Harness::new(&[1, 2, 3]).await;

    let directory = DirectoryService::new(harness.router.clone());
    let err = directory
        .find_account_by_email("nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ShardError::UserNotFound(_)));
    assert_eq!(harness.legs_issued(), 3);
}

#[tokio::test]
async fn test_failed_partition_is_skipped() {
    let harness = Harness::connect(&[1, 2]).await;
    schema::create_partition_schema(&harness.partition(1).await)
        .await
        .unwrap();
    harness.seed_user(1, 1001, "alice", "student").await;

    // branch 2 has no users table
    let rows = harness
        .router
        .fan_out()
        .merge_all("all_users", |p| async move {
            users::Entity::find().all(p.connection()).await
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].partition_id, 1);
    assert_eq!(rows[0].row.username, "alice");
}

#[tokio::test]
async fn test_lookup_skips_failed_partition_before_match() {
    let harness = Harness::connect(&[1, 2]).await;
    schema::create_partition_schema(&harness.partition(2).await)
        .await
        .unwrap();
    harness.seed_user(2, 2001, "bob", "student").await;

    // branch 1 has no users table and is queried first
    let directory = DirectoryService::new(harness.router.clone());
    let found = directory.find_account_by_email("bob@example.com").await.unwrap();
    assert_eq!(found.partition_id, 2);
    assert_eq!(found.row.user_id, 2001);
    assert_eq!(harness.legs_issued(), 2);

    assert_eq!(harness.router.resolve_partition_for(2001).await.unwrap(), 2);
    assert_eq!(harness.legs_issued(), 4);

    let err = directory
        .find_account_by_email("nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ShardError::UserNotFound(_)));
}

#[tokio::test]
async fn test_every_partition_failing() {
    let harness = Harness::connect(&[1, 2, 3]).await;

    let err = harness
        .router
        .fan_out()
        .merge_all("all_users", |p| async move {
            users::Entity::find().all(p.connection()).await
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShardError::AllPartitionsUnreachable { attempted: 3 }
    ));
}

#[tokio::test]
async fn test_empty_result_is_success() {
    let harness = Harness::new(&[1, 2]).await;

    let rows = harness
        .router
        .fan_out()
        .merge_all("teachers", |p| async move {
            users::Entity::find()
                .filter(users::Column::Role.eq("teacher"))
                .all(p.connection())
                .await
        })
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_list_branches_deduplicates() {
    let harness = Harness::new(&[1, 2, 3]).await;
    harness.seed_branches().await;

    let directory = DirectoryService::new(harness.router.clone());
    let branches = directory.list_branches().await.unwrap();

    let ids: Vec<_> = branches.iter().map(|b| b.branch_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(branches[1].branch_name, "Branch 2");
}
