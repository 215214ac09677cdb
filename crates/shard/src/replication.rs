//! Central -> partition catalog replication
//!
//! Each run copies the catalog rows changed since the last checkpoint into
//! every partition. A partition applies the whole change set in one
//! transaction, parents before children, with insert-or-overwrite
//! semantics. A failed partition rolls back and does not affect the others.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, IdenStatic, IntoActiveModel, Iterable, PrimaryKeyToColumn, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ReplicationConfig;
use crate::entity::{chapters, courses, lessons, replication_checkpoints, tasks};
use crate::error::{Result, ShardError};
use crate::registry::{PartitionHandle, ShardRegistry};
use crate::PartitionId;

/// Rows per INSERT .. ON CONFLICT statement
const UPSERT_BATCH_SIZE: usize = 500;

/// Checkpoint row name in `replication_checkpoints`
const CHECKPOINT_STREAM: &str = "catalog";

/// Replicated catalog tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogTable {
    Courses,
    Chapters,
    Lessons,
    Tasks,
}

impl CatalogTable {
    /// Parents before children
    pub const DEPENDENCY_ORDER: [CatalogTable; 4] = [
        CatalogTable::Courses,
        CatalogTable::Chapters,
        CatalogTable::Lessons,
        CatalogTable::Tasks,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            CatalogTable::Courses => "courses",
            CatalogTable::Chapters => "chapters",
            CatalogTable::Lessons => "lessons",
            CatalogTable::Tasks => "tasks",
        }
    }
}

impl fmt::Display for CatalogTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    Idle,
    Running,
}

/// Rows fetched from the central store per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub courses: usize,
    pub chapters: usize,
    pub lessons: usize,
    pub tasks: usize,
}

impl FetchCounts {
    pub fn total(&self) -> usize {
        self.courses + self.chapters + self.lessons + self.tasks
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    Committed { rows: u64 },
    RolledBack { reason: String },
}

#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub partition_id: PartitionId,
    pub outcome: PartitionOutcome,
}

/// Result of one replication run
#[derive(Debug, Clone)]
pub struct ReplicationReport {
    pub started_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub fetched: FetchCounts,
    pub partitions: Vec<PartitionReport>,
}

impl ReplicationReport {
    pub fn committed(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Committed { .. }))
            .map(|p| p.partition_id)
    }

    pub fn rolled_back(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::RolledBack { .. }))
            .map(|p| p.partition_id)
    }

    pub fn outcome(&self, partition_id: PartitionId) -> Option<&PartitionOutcome> {
        self.partitions
            .iter()
            .find(|p| p.partition_id == partition_id)
            .map(|p| &p.outcome)
    }
}

#[derive(Debug, Default)]
struct ChangeSet {
    courses: Vec<courses::Model>,
    chapters: Vec<chapters::Model>,
    lessons: Vec<lessons::Model>,
    tasks: Vec<tasks::Model>,
}

impl ChangeSet {
    fn counts(&self) -> FetchCounts {
        FetchCounts {
            courses: self.courses.len(),
            chapters: self.chapters.len(),
            lessons: self.lessons.len(),
            tasks: self.tasks.len(),
        }
    }
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReplicationEngine {
    registry: Arc<ShardRegistry>,
    config: ReplicationConfig,
    checkpoint: Mutex<Option<DateTime<Utc>>>,
    running: AtomicBool,
}

impl ReplicationEngine {
    pub fn new(registry: Arc<ShardRegistry>, config: ReplicationConfig) -> Self {
        Self {
            registry,
            config,
            checkpoint: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn state(&self) -> ReplicationState {
        if self.running.load(Ordering::Acquire) {
            ReplicationState::Running
        } else {
            ReplicationState::Idle
        }
    }

    /// Start of the last completed run, if any
    pub async fn checkpoint(&self) -> Option<DateTime<Utc>> {
        *self.checkpoint.lock().await
    }

    pub async fn set_checkpoint(&self, at: DateTime<Utc>) {
        *self.checkpoint.lock().await = Some(at);
    }

    /// Copy catalog rows with `updated_at >= checkpoint` into every partition
    ///
    /// The checkpoint advances to the start of this run once every partition
    /// has been attempted. A failing central fetch aborts the run and leaves
    /// the checkpoint unchanged.
    pub async fn run_once(&self) -> Result<ReplicationReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ShardError::ReplicationInProgress);
        }
        let _guard = RunGuard(&self.running);

        let started_at = Utc::now();
        let central = self.registry.central().await?;
        let since = self.resolve_checkpoint(&central, started_at).await?;

        let changes = self.fetch_changes(&central, since).await?;
        let fetched = changes.counts();
        info!(
            "Replication: {} changed rows since {} (courses={}, chapters={}, lessons={}, tasks={})",
            fetched.total(),
            since,
            fetched.courses,
            fetched.chapters,
            fetched.lessons,
            fetched.tasks
        );

        let partitions = self.registry.all_connections().await;
        let concurrency = partitions.len().max(1);
        let changes = &changes;
        let mut reports: Vec<PartitionReport> = stream::iter(partitions)
            .map(|handle| async move {
                let partition_id = handle.id;
                let outcome = match apply_changes(&handle, changes).await {
                    Ok(rows) => {
                        debug!("Replication: branch {} committed {} rows", partition_id, rows);
                        PartitionOutcome::Committed { rows }
                    }
                    Err(e) => {
                        error!(
                            "Replication: branch {} rolled back: {}",
                            partition_id, e
                        );
                        PartitionOutcome::RolledBack {
                            reason: e.to_string(),
                        }
                    }
                };
                PartitionReport {
                    partition_id,
                    outcome,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        reports.sort_by_key(|r| r.partition_id);

        self.set_checkpoint(started_at).await;
        if self.config.persist_checkpoint {
            if let Err(e) = store_checkpoint(&central, started_at).await {
                warn!("Failed to persist replication checkpoint: {}", e);
            }
        }

        let report = ReplicationReport {
            started_at,
            since,
            fetched,
            partitions: reports,
        };
        info!(
            "Replication finished: {} committed, {} rolled back",
            report.committed().count(),
            report.rolled_back().count()
        );
        Ok(report)
    }

    async fn resolve_checkpoint(
        &self,
        central: &DatabaseConnection,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if let Some(at) = self.checkpoint().await {
            return Ok(at);
        }
        if self.config.persist_checkpoint {
            if let Some(row) = replication_checkpoints::Entity::find_by_id(CHECKPOINT_STREAM)
                .one(central)
                .await?
            {
                info!("Resuming replication from stored checkpoint {}", row.synced_at);
                return Ok(row.synced_at);
            }
        }
        Ok(now - self.config.initial_lookback())
    }

    async fn fetch_changes(
        &self,
        central: &DatabaseConnection,
        since: DateTime<Utc>,
    ) -> Result<ChangeSet> {
        let mut changes = ChangeSet::default();
        for table in CatalogTable::DEPENDENCY_ORDER {
            if !self.config.tables.contains(&table) {
                continue;
            }
            match table {
                CatalogTable::Courses => {
                    changes.courses = courses::Entity::find()
                        .filter(courses::Column::UpdatedAt.gte(since))
                        .order_by_asc(courses::Column::CourseId)
                        .all(central)
                        .await?;
                }
                CatalogTable::Chapters => {
                    changes.chapters = chapters::Entity::find()
                        .filter(chapters::Column::UpdatedAt.gte(since))
                        .order_by_asc(chapters::Column::ChapterId)
                        .all(central)
                        .await?;
                }
                CatalogTable::Lessons => {
                    changes.lessons = lessons::Entity::find()
                        .filter(lessons::Column::UpdatedAt.gte(since))
                        .order_by_asc(lessons::Column::LessonId)
                        .all(central)
                        .await?;
                }
                CatalogTable::Tasks => {
                    changes.tasks = tasks::Entity::find()
                        .filter(tasks::Column::UpdatedAt.gte(since))
                        .order_by_asc(tasks::Column::TaskId)
                        .all(central)
                        .await?;
                }
            }
        }
        Ok(changes)
    }
}

/// Apply the change set to one partition inside a single transaction
async fn apply_changes(handle: &PartitionHandle, changes: &ChangeSet) -> Result<u64> {
    let txn = handle.connection().begin().await?;

    match upsert_change_set(&txn, changes).await {
        Ok(rows) => {
            txn.commit().await?;
            Ok(rows)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                warn!(
                    "Rollback failed for branch {}: {}",
                    handle.id, rollback
                );
            }
            Err(e.into())
        }
    }
}

async fn upsert_change_set(
    txn: &DatabaseTransaction,
    changes: &ChangeSet,
) -> std::result::Result<u64, DbErr> {
    let mut rows = 0;
    rows += upsert_rows::<courses::Entity, _>(txn, &changes.courses).await?;
    rows += upsert_rows::<chapters::Entity, _>(txn, &changes.chapters).await?;
    rows += upsert_rows::<lessons::Entity, _>(txn, &changes.lessons).await?;
    rows += upsert_rows::<tasks::Entity, _>(txn, &changes.tasks).await?;
    Ok(rows)
}

/// INSERT .. ON CONFLICT (pk) DO UPDATE SET <every other column>, in batches
async fn upsert_rows<E, C>(db: &C, rows: &[E::Model]) -> std::result::Result<u64, DbErr>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
    C: ConnectionTrait,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let key_columns: Vec<E::Column> = E::PrimaryKey::iter().map(|pk| pk.into_column()).collect();
    let update_columns: Vec<E::Column> = E::Column::iter()
        .filter(|c| !key_columns.iter().any(|k| k.as_str() == c.as_str()))
        .collect();

    let mut written = 0;
    for chunk in rows.chunks(UPSERT_BATCH_SIZE) {
        let models = chunk
            .iter()
            .cloned()
            .map(|m| m.into_active_model().reset_all());
        let on_conflict = OnConflict::columns(key_columns.clone())
            .update_columns(update_columns.clone())
            .to_owned();
        E::insert_many(models)
            .on_conflict(on_conflict)
            .exec_without_returning(db)
            .await?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

async fn store_checkpoint(
    central: &DatabaseConnection,
    at: DateTime<Utc>,
) -> std::result::Result<(), DbErr> {
    let row = replication_checkpoints::ActiveModel {
        stream: Set(CHECKPOINT_STREAM.to_string()),
        synced_at: Set(at),
        updated_at: Set(Utc::now()),
    };
    replication_checkpoints::Entity::insert(row)
        .on_conflict(
            OnConflict::column(replication_checkpoints::Column::Stream)
                .update_columns([
                    replication_checkpoints::Column::SyncedAt,
                    replication_checkpoints::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(central)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_order() {
        let names: Vec<_> = CatalogTable::DEPENDENCY_ORDER
            .iter()
            .map(|t| t.table_name())
            .collect();
        assert_eq!(names, vec!["courses", "chapters", "lessons", "tasks"]);
    }

    #[test]
    fn test_report_partitions() {
        let now = Utc::now();
        let report = ReplicationReport {
            started_at: now,
            since: now,
            fetched: FetchCounts::default(),
            partitions: vec![
                PartitionReport {
                    partition_id: 1,
                    outcome: PartitionOutcome::Committed { rows: 3 },
                },
                PartitionReport {
                    partition_id: 2,
                    outcome: PartitionOutcome::RolledBack {
                        reason: "no such table: tasks".into(),
                    },
                },
            ],
        };
        assert_eq!(report.committed().collect::<Vec<_>>(), vec![1]);
        assert_eq!(report.rolled_back().collect::<Vec<_>>(), vec![2]);
        assert_eq!(
            report.outcome(1),
            Some(&PartitionOutcome::Committed { rows: 3 })
        );
    }
}
