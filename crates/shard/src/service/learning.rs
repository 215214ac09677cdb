//! Enrollment and progress tracking

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, IntoActiveModel, JoinType,
    NotSet, QueryFilter, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;

use crate::entity::{learning, users};
use crate::error::{Result, ShardError};
use crate::fanout::Sharded;
use crate::router::ShardRouter;
use crate::service::{live_course, BranchUser};

#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub status: Option<String>,
    pub progress_percentage: Option<i32>,
}

/// Enrollment joined with the student's account, as seen by the teacher
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct ProgressView {
    pub user_id: i64,
    pub course_id: i64,
    pub status: String,
    pub progress_percentage: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
}

const STATUSES: [&str; 3] = [
    learning::STATUS_ENROLLED,
    learning::STATUS_IN_PROGRESS,
    learning::STATUS_COMPLETED,
];

pub struct LearningService {
    router: Arc<ShardRouter>,
}

impl LearningService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }

    pub async fn enroll(&self, student: BranchUser, course_id: i64) -> Result<learning::Model> {
        let central = self.router.central().await?;
        live_course(&central, course_id).await?;

        let partition = self.router.resolve_connection(student.partition_id).await?;
        let conn = partition.connection();
        if find_enrollment(conn, student, course_id).await?.is_some() {
            return Err(ShardError::AlreadyEnrolled {
                user_id: student.user_id,
                course_id,
            });
        }

        let now = Utc::now();
        Ok(learning::ActiveModel {
            learning_id: NotSet,
            user_id: Set(student.user_id),
            course_id: Set(course_id),
            status: Set(learning::STATUS_ENROLLED.to_string()),
            progress_percentage: Set(0),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?)
    }

    /// Update status and/or percentage; `completed_at` is set the first time
    /// the status becomes completed
    pub async fn update_progress(
        &self,
        student: BranchUser,
        course_id: i64,
        update: ProgressUpdate,
    ) -> Result<learning::Model> {
        if let Some(pct) = update.progress_percentage {
            if !(0..=100).contains(&pct) {
                return Err(ShardError::InvalidInput(format!(
                    "progress_percentage must be within 0..=100, got {}",
                    pct
                )));
            }
        }
        if let Some(status) = &update.status {
            if !STATUSES.contains(&status.as_str()) {
                return Err(ShardError::InvalidInput(format!("unknown status: {}", status)));
            }
        }

        let partition = self.router.resolve_connection(student.partition_id).await?;
        let conn = partition.connection();
        let current = find_enrollment(conn, student, course_id)
            .await?
            .ok_or(ShardError::NotEnrolled {
                user_id: student.user_id,
                course_id,
            })?;

        let now = Utc::now();
        let already_completed = current.completed_at.is_some();
        let mut active = current.into_active_model();
        if let Some(pct) = update.progress_percentage {
            active.progress_percentage = Set(pct);
        }
        if let Some(status) = update.status {
            if status == learning::STATUS_COMPLETED && !already_completed {
                active.completed_at = Set(Some(now));
            }
            active.status = Set(status);
        }
        active.updated_at = Set(now);
        Ok(active.update(conn).await?)
    }

    pub async fn progress(&self, student: BranchUser, course_id: i64) -> Result<learning::Model> {
        let partition = self.router.resolve_connection(student.partition_id).await?;
        find_enrollment(partition.connection(), student, course_id)
            .await?
            .ok_or(ShardError::NotEnrolled {
                user_id: student.user_id,
                course_id,
            })
    }

    /// Progress of every enrolled student of a course the teacher owns,
    /// across all branches
    pub async fn list_course_progress(
        &self,
        teacher: BranchUser,
        course_id: i64,
    ) -> Result<Vec<Sharded<ProgressView>>> {
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        self.router
            .bridge()
            .authorize_course(instructor_id, course_id)
            .await?;

        self.router
            .fan_out()
            .merge_all("course_progress", |p| async move {
                learning::Entity::find()
                    .select_only()
                    .columns([
                        learning::Column::UserId,
                        learning::Column::CourseId,
                        learning::Column::Status,
                        learning::Column::ProgressPercentage,
                        learning::Column::CompletedAt,
                        learning::Column::UpdatedAt,
                    ])
                    .column(users::Column::Username)
                    .column(users::Column::Email)
                    .join(JoinType::InnerJoin, learning::Relation::User.def())
                    .filter(learning::Column::CourseId.eq(course_id))
                    .into_model::<ProgressView>()
                    .all(p.connection())
                    .await
            })
            .await
    }
}

async fn find_enrollment(
    conn: &sea_orm::DatabaseConnection,
    student: BranchUser,
    course_id: i64,
) -> Result<Option<learning::Model>> {
    Ok(learning::Entity::find()
        .filter(learning::Column::UserId.eq(student.user_id))
        .filter(learning::Column::CourseId.eq(course_id))
        .one(conn)
        .await?)
}
