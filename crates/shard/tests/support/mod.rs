//! Shared fixtures: in-memory SQLite central store and partitions
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;

use shard::entity::{branches, chapters, courses, lessons, tasks, users};
use shard::{schema, PartitionId, ShardConfig, ShardRegistry, ShardRouter};

pub struct Harness {
    pub config: ShardConfig,
    pub registry: Arc<ShardRegistry>,
    pub router: Arc<ShardRouter>,
}

/// One in-memory database per branch, each behind a single-connection pool
pub fn sqlite_config(branch_ids: &[PartitionId]) -> ShardConfig {
    let mut toml = String::from(
        "connect_attempts = 1\n\n[central]\nurl = \"sqlite::memory:\"\nmax_open_conns = 1\n",
    );
    for id in branch_ids {
        toml.push_str(&format!(
            "\n[[branches]]\nbranch_id = {id}\nname = \"Branch {id}\"\nurl = \"sqlite::memory:\"\nmax_open_conns = 1\n"
        ));
    }
    ShardConfig::from_toml_str(&toml).unwrap()
}

impl Harness {
    /// Connected registry with every schema created
    pub async fn new(branch_ids: &[PartitionId]) -> Self {
        let harness = Self::connect(branch_ids).await;
        schema::create_central_schema(&harness.central().await)
            .await
            .unwrap();
        for id in branch_ids {
            schema::create_partition_schema(&harness.partition(*id).await)
                .await
                .unwrap();
        }
        harness
    }

    /// Connected registry without any tables
    pub async fn connect(branch_ids: &[PartitionId]) -> Self {
        let config = sqlite_config(branch_ids);
        let registry = Arc::new(ShardRegistry::connect(&config).await.unwrap());
        let router = Arc::new(ShardRouter::new(registry.clone(), &config));
        Self {
            config,
            registry,
            router,
        }
    }

    pub async fn central(&self) -> DatabaseConnection {
        self.registry.central().await.unwrap()
    }

    pub async fn partition(&self, id: PartitionId) -> DatabaseConnection {
        self.registry.resolve(id).await.unwrap().connection().clone()
    }

    pub fn legs_issued(&self) -> u64 {
        self.router.fan_out().legs_issued()
    }

    /// Insert the full branch list into every partition
    pub async fn seed_branches(&self) {
        let now = Utc::now();
        for partition in self.registry.all_connections().await {
            for branch in &self.config.branches {
                branches::ActiveModel {
                    branch_id: Set(branch.branch_id),
                    branch_name: Set(branch.name.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(partition.connection())
                .await
                .unwrap();
            }
        }
    }

    pub async fn seed_user(
        &self,
        partition_id: PartitionId,
        user_id: i64,
        username: &str,
        role: &str,
    ) -> users::Model {
        let now = Utc::now();
        users::ActiveModel {
            user_id: Set(user_id),
            branch_id: Set(partition_id),
            username: Set(username.to_string()),
            email: Set(format!("{}@example.com", username)),
            password_hash: Set("$argon2id$stub".to_string()),
            first_name: Set(username.to_uppercase()),
            last_name: Set("Tester".to_string()),
            role: Set(role.to_string()),
            status: Set("active".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.partition(partition_id).await)
        .await
        .unwrap()
    }
}

pub fn course_row(course_id: i64, title: &str, updated_at: DateTime<Utc>) -> courses::ActiveModel {
    courses::ActiveModel {
        course_id: Set(course_id),
        course_title: Set(title.to_string()),
        description: Set(format!("About {}", title)),
        instructor_id: Set(1),
        start_date: Set(None),
        end_date: Set(None),
        status: Set("active".to_string()),
        created_at: Set(updated_at - Duration::days(1)),
        updated_at: Set(updated_at),
        deleted_at: Set(None),
    }
}

/// Course 50 with one chapter, lesson and task, all touched at `updated_at`
pub async fn seed_catalog_tree(db: &DatabaseConnection, updated_at: DateTime<Utc>) {
    course_row(50, "Distributed Systems", updated_at)
        .insert(db)
        .await
        .unwrap();
    chapters::ActiveModel {
        chapter_id: Set(500),
        course_id: Set(50),
        chapter_title: Set("Replication".to_string()),
        chapter_order: Set(1),
        description: Set(String::new()),
        created_at: Set(updated_at),
        updated_at: Set(updated_at),
        deleted_at: Set(None),
    }
    .insert(db)
    .await
    .unwrap();
    lessons::ActiveModel {
        lesson_id: Set(5000),
        course_id: Set(50),
        chapter_id: Set(500),
        lesson_title: Set("Primary-backup".to_string()),
        content_url: Set("https://cdn.example.com/l/5000.mp4".to_string()),
        lesson_type: Set("video".to_string()),
        lesson_order: Set(1),
        created_at: Set(updated_at),
        updated_at: Set(updated_at),
        deleted_at: Set(None),
    }
    .insert(db)
    .await
    .unwrap();
    tasks::ActiveModel {
        task_id: Set(50_000),
        lesson_id: Set(5000),
        task_title: Set("Explain quorum reads".to_string()),
        description: Set(String::new()),
        task_type: Set("essay".to_string()),
        max_score: Set(100),
        created_at: Set(updated_at),
        updated_at: Set(updated_at),
        deleted_at: Set(None),
    }
    .insert(db)
    .await
    .unwrap();
}
