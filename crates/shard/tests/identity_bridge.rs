mod support;

use sea_orm::{EntityTrait, PaginatorTrait};
use shard::entity::instructors;
use shard::ShardError;
use support::{seed_catalog_tree, Harness};

#[tokio::test]
async fn test_ensure_instructor_creates_one_record() {
    let harness = Harness::new(&[1, 2]).await;
    harness.seed_user(1, 1001, "alice", "teacher").await;

    let first = harness.router.ensure_instructor(1, 1001).await.unwrap();
    let second = harness.router.ensure_instructor(1, 1001).await.unwrap();
    assert_eq!(first.instructor_id, second.instructor_id);
    assert_eq!(first.username, "alice");

    let central = harness.central().await;
    assert_eq!(instructors::Entity::find().count(&central).await.unwrap(), 1);

    let record = instructors::Entity::find_by_id(first.instructor_id)
        .one(&central)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.username, first.username);
    assert_eq!(record.branch_id, 1);
    assert_eq!(record.branch_user_id, 1001);
    assert_eq!(record.username, "alice");
    assert_eq!(record.email, "alice@example.com");
}

#[tokio::test]
async fn test_concurrent_ensure_instructor() {
    let harness = Harness::new(&[1]).await;
    harness.seed_user(1, 1001, "alice", "teacher").await;

    let (a, b) = tokio::join!(
        harness.router.ensure_instructor(1, 1001),
        harness.router.ensure_instructor(1, 1001)
    );
    assert_eq!(a.unwrap().instructor_id, b.unwrap().instructor_id);

    let central = harness.central().await;
    assert_eq!(instructors::Entity::find().count(&central).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_local_id_in_two_branches() {
    let harness = Harness::new(&[1, 2]).await;
    harness.seed_user(1, 1001, "alice", "teacher").await;
    harness.seed_user(2, 1001, "dave", "teacher").await;

    let north = harness.router.ensure_instructor(1, 1001).await.unwrap();
    let south = harness.router.ensure_instructor(2, 1001).await.unwrap();
    assert_ne!(north.instructor_id, south.instructor_id);
    assert_eq!((north.branch_id, north.username.as_str()), (1, "alice"));
    assert_eq!((south.branch_id, south.username.as_str()), (2, "dave"));
}

#[tokio::test]
async fn test_student_is_not_an_instructor() {
    let harness = Harness::new(&[1]).await;
    harness.seed_user(1, 1002, "bob", "student").await;

    let err = harness.router.ensure_instructor(1, 1002).await.unwrap_err();
    assert!(matches!(
        err,
        ShardError::NotAnInstructor {
            partition_id: 1,
            user_id: 1002
        }
    ));
    assert!(err.is_forbidden());

    let central = harness.central().await;
    assert_eq!(instructors::Entity::find().count(&central).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_user_and_partition() {
    let harness = Harness::new(&[1, 2]).await;
    // exists, but in branch 2
    harness.seed_user(2, 1001, "alice", "teacher").await;

    let err = harness.router.ensure_instructor(1, 1001).await.unwrap_err();
    assert!(matches!(err, ShardError::UserNotFound(_)));

    let err = harness.router.ensure_instructor(7, 1001).await.unwrap_err();
    assert!(matches!(err, ShardError::PartitionNotFound(7)));
}

#[tokio::test]
async fn test_authorize_catalog_ownership() {
    let harness = Harness::new(&[1]).await;
    harness.seed_user(1, 1001, "alice", "teacher").await;
    harness.seed_user(1, 1003, "erin", "teacher").await;

    let alice = harness
        .router
        .ensure_instructor(1, 1001)
        .await
        .unwrap()
        .instructor_id;
    let erin = harness
        .router
        .ensure_instructor(1, 1003)
        .await
        .unwrap()
        .instructor_id;

    // the seeded tree belongs to instructor 1, which is alice's record
    assert_eq!(alice, 1);
    seed_catalog_tree(&harness.central().await, chrono::Utc::now()).await;

    let bridge = harness.router.bridge();
    assert_eq!(bridge.authorize_course(alice, 50).await.unwrap().course_id, 50);
    assert_eq!(bridge.authorize_chapter(alice, 500).await.unwrap().chapter_id, 500);
    assert_eq!(bridge.authorize_lesson(alice, 5000).await.unwrap().lesson_id, 5000);
    assert_eq!(bridge.authorize_task(alice, 50_000).await.unwrap().task_id, 50_000);

    let err = bridge.authorize_task(erin, 50_000).await.unwrap_err();
    assert!(matches!(err, ShardError::NotCourseInstructor { course_id: 50 }));

    let err = bridge.authorize_course(alice, 51).await.unwrap_err();
    assert!(matches!(err, ShardError::CourseNotFound(51)));
    let err = bridge.authorize_task(alice, 1).await.unwrap_err();
    assert!(matches!(err, ShardError::TaskNotFound(1)));
}
