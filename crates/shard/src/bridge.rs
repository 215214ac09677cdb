//! Identity bridge between branch teachers and central instructors
//!
//! Central catalog rows reference `instructors.instructor_id`, never a
//! branch-local user id. The first authoring action of a teacher creates the
//! bridge record; later calls return the same id.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::entity::{chapters, courses, instructors, lessons, tasks, users};
use crate::error::{Result, ShardError};
use crate::registry::ShardRegistry;
use crate::{PartitionId, UserId};

pub struct IdentityBridge {
    registry: Arc<ShardRegistry>,
}

impl IdentityBridge {
    pub fn new(registry: Arc<ShardRegistry>) -> Self {
        Self { registry }
    }

    /// Central instructor record for the teacher `local_user_id` of `partition_id`
    ///
    /// Creates the bridge record on first use with a snapshot of the
    /// teacher's username and email. Fails with `UserNotFound` when the user
    /// does not exist in that branch and `NotAnInstructor` when the user is
    /// not a teacher.
    pub async fn ensure_instructor(
        &self,
        partition_id: PartitionId,
        local_user_id: UserId,
    ) -> Result<instructors::Model> {
        let central = self.registry.central().await?;
        if let Some(existing) = find_instructor(&central, partition_id, local_user_id).await? {
            return Ok(existing);
        }

        let partition = self.registry.resolve(partition_id).await?;
        let user = users::Entity::find_by_id(local_user_id)
            .one(partition.connection())
            .await?
            .ok_or_else(|| {
                ShardError::UserNotFound(format!(
                    "user_id={} in branch {}",
                    local_user_id, partition_id
                ))
            })?;
        if !user.is_teacher() {
            return Err(ShardError::NotAnInstructor {
                partition_id,
                user_id: local_user_id,
            });
        }

        let now = Utc::now();
        let record = instructors::ActiveModel {
            instructor_id: NotSet,
            branch_id: Set(partition_id),
            branch_user_id: Set(local_user_id),
            username: Set(user.username),
            email: Set(user.email),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match record.insert(&central).await {
            Ok(created) => {
                info!(
                    "Created instructor {} for user {} of branch {}",
                    created.instructor_id, local_user_id, partition_id
                );
                Ok(created)
            }
            Err(e) => {
                // a concurrent call may have won the unique index
                match find_instructor(&central, partition_id, local_user_id).await? {
                    Some(winner) => {
                        warn!(
                            "Instructor for user {} of branch {} created concurrently",
                            local_user_id, partition_id
                        );
                        Ok(winner)
                    }
                    None => Err(e.into()),
                }
            }
        }
    }

    /// Bridge record by central id
    pub async fn instructor(&self, instructor_id: i64) -> Result<Option<instructors::Model>> {
        let central = self.registry.central().await?;
        Ok(instructors::Entity::find_by_id(instructor_id)
            .one(&central)
            .await?)
    }

    /// Course owned by `instructor_id`
    pub async fn authorize_course(
        &self,
        instructor_id: i64,
        course_id: i64,
    ) -> Result<courses::Model> {
        let central = self.registry.central().await?;
        owned_course(&central, instructor_id, course_id).await
    }

    pub async fn authorize_chapter(
        &self,
        instructor_id: i64,
        chapter_id: i64,
    ) -> Result<chapters::Model> {
        let central = self.registry.central().await?;
        let chapter = chapters::Entity::find_by_id(chapter_id)
            .one(&central)
            .await?
            .ok_or(ShardError::ChapterNotFound(chapter_id))?;
        owned_course(&central, instructor_id, chapter.course_id).await?;
        Ok(chapter)
    }

    pub async fn authorize_lesson(
        &self,
        instructor_id: i64,
        lesson_id: i64,
    ) -> Result<lessons::Model> {
        let central = self.registry.central().await?;
        let lesson = lessons::Entity::find_by_id(lesson_id)
            .one(&central)
            .await?
            .ok_or(ShardError::LessonNotFound(lesson_id))?;
        owned_course(&central, instructor_id, lesson.course_id).await?;
        Ok(lesson)
    }

    /// Task whose course (task -> lesson -> course) is owned by `instructor_id`
    pub async fn authorize_task(&self, instructor_id: i64, task_id: i64) -> Result<tasks::Model> {
        let central = self.registry.central().await?;
        let task = tasks::Entity::find_by_id(task_id)
            .one(&central)
            .await?
            .ok_or(ShardError::TaskNotFound(task_id))?;
        let lesson = lessons::Entity::find_by_id(task.lesson_id)
            .one(&central)
            .await?
            .ok_or(ShardError::LessonNotFound(task.lesson_id))?;
        owned_course(&central, instructor_id, lesson.course_id).await?;
        Ok(task)
    }
}

async fn find_instructor(
    central: &DatabaseConnection,
    partition_id: PartitionId,
    local_user_id: UserId,
) -> Result<Option<instructors::Model>> {
    Ok(instructors::Entity::find()
        .filter(instructors::Column::BranchId.eq(partition_id))
        .filter(instructors::Column::BranchUserId.eq(local_user_id))
        .one(central)
        .await?)
}

async fn owned_course(
    central: &DatabaseConnection,
    instructor_id: i64,
    course_id: i64,
) -> Result<courses::Model> {
    let course = courses::Entity::find_by_id(course_id)
        .filter(courses::Column::DeletedAt.is_null())
        .one(central)
        .await?
        .ok_or(ShardError::CourseNotFound(course_id))?;
    if course.instructor_id != instructor_id {
        return Err(ShardError::NotCourseInstructor { course_id });
    }
    Ok(course)
}
