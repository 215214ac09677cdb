//! Catalog authoring against the central store
//!
//! Every mutation resolves the acting teacher to a central instructor and
//! checks ownership of the target course. Partitions receive the changes
//! through replication.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, NotSet, QueryFilter, QueryOrder,
    Set,
};
use std::sync::Arc;
use tracing::info;

use crate::entity::{chapters, courses, lessons, tasks};
use crate::error::{Result, ShardError};
use crate::router::ShardRouter;
use crate::service::{live_course, require_text, BranchUser};

#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChapter {
    pub title: String,
    pub order: i32,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewLesson {
    pub title: String,
    /// Object-storage URL resolved by the caller
    pub content_url: String,
    pub lesson_type: String,
    pub order: i32,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub max_score: i32,
}

const COURSE_STATUSES: [&str; 2] = ["active", "archived"];

pub struct CatalogService {
    router: Arc<ShardRouter>,
}

impl CatalogService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }

    /// Create a course owned by the acting teacher
    pub async fn create_course(&self, teacher: BranchUser, req: NewCourse) -> Result<courses::Model> {
        require_text("title", &req.title)?;
        if let (Some(start), Some(end)) = (req.start_date, req.end_date) {
            if end < start {
                return Err(ShardError::InvalidInput(
                    "end_date must not precede start_date".into(),
                ));
            }
        }

        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        let central = self.router.central().await?;

        let now = Utc::now();
        let course = courses::ActiveModel {
            course_id: NotSet,
            course_title: Set(req.title),
            description: Set(req.description),
            instructor_id: Set(instructor_id),
            start_date: Set(req.start_date),
            end_date: Set(req.end_date),
            status: Set("active".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&central)
        .await?;

        info!(
            "Instructor {} created course {}",
            instructor_id, course.course_id
        );
        Ok(course)
    }

    /// Change title, description or status; bumps `updated_at` so the next
    /// replication run picks the row up
    pub async fn update_course(
        &self,
        teacher: BranchUser,
        course_id: i64,
        update: CourseUpdate,
    ) -> Result<courses::Model> {
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        let course = self
            .router
            .bridge()
            .authorize_course(instructor_id, course_id)
            .await?;

        let mut active = course.into_active_model();
        if let Some(title) = update.title {
            require_text("title", &title)?;
            active.course_title = Set(title);
        }
        if let Some(description) = update.description {
            active.description = Set(description);
        }
        if let Some(status) = update.status {
            if !COURSE_STATUSES.contains(&status.as_str()) {
                return Err(ShardError::InvalidInput(format!("unknown course status: {}", status)));
            }
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());

        let central = self.router.central().await?;
        Ok(active.update(&central).await?)
    }

    pub async fn create_chapter(
        &self,
        teacher: BranchUser,
        course_id: i64,
        req: NewChapter,
    ) -> Result<chapters::Model> {
        require_text("title", &req.title)?;
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        self.router
            .bridge()
            .authorize_course(instructor_id, course_id)
            .await?;

        let central = self.router.central().await?;
        let now = Utc::now();
        Ok(chapters::ActiveModel {
            chapter_id: NotSet,
            course_id: Set(course_id),
            chapter_title: Set(req.title),
            chapter_order: Set(req.order),
            description: Set(req.description),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&central)
        .await?)
    }

    pub async fn create_lesson(
        &self,
        teacher: BranchUser,
        chapter_id: i64,
        req: NewLesson,
    ) -> Result<lessons::Model> {
        require_text("title", &req.title)?;
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        let chapter = self
            .router
            .bridge()
            .authorize_chapter(instructor_id, chapter_id)
            .await?;

        let central = self.router.central().await?;
        let now = Utc::now();
        let lesson_type = if req.lesson_type.is_empty() {
            "video".to_string()
        } else {
            req.lesson_type
        };
        Ok(lessons::ActiveModel {
            lesson_id: NotSet,
            course_id: Set(chapter.course_id),
            chapter_id: Set(chapter.chapter_id),
            lesson_title: Set(req.title),
            content_url: Set(req.content_url),
            lesson_type: Set(lesson_type),
            lesson_order: Set(req.order),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&central)
        .await?)
    }

    pub async fn create_task(
        &self,
        teacher: BranchUser,
        lesson_id: i64,
        req: NewTask,
    ) -> Result<tasks::Model> {
        require_text("title", &req.title)?;
        if req.max_score <= 0 {
            return Err(ShardError::InvalidInput("max_score must be positive".into()));
        }
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        let lesson = self
            .router
            .bridge()
            .authorize_lesson(instructor_id, lesson_id)
            .await?;

        let central = self.router.central().await?;
        let now = Utc::now();
        let task_type = if req.task_type.is_empty() {
            "essay".to_string()
        } else {
            req.task_type
        };
        Ok(tasks::ActiveModel {
            task_id: NotSet,
            lesson_id: Set(lesson.lesson_id),
            task_title: Set(req.title),
            description: Set(req.description),
            task_type: Set(task_type),
            max_score: Set(req.max_score),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&central)
        .await?)
    }

    pub async fn course(&self, course_id: i64) -> Result<courses::Model> {
        let central = self.router.central().await?;
        live_course(&central, course_id).await
    }

    /// Live courses, oldest first
    pub async fn list_courses(&self) -> Result<Vec<courses::Model>> {
        let central = self.router.central().await?;
        Ok(courses::Entity::find()
            .filter(courses::Column::DeletedAt.is_null())
            .order_by_asc(courses::Column::CourseId)
            .all(&central)
            .await?)
    }

    /// Chapters of a course ordered by `chapter_order`
    pub async fn list_chapters(&self, course_id: i64) -> Result<Vec<chapters::Model>> {
        let central = self.router.central().await?;
        live_course(&central, course_id).await?;
        Ok(chapters::Entity::find()
            .filter(chapters::Column::CourseId.eq(course_id))
            .filter(chapters::Column::DeletedAt.is_null())
            .order_by_asc(chapters::Column::ChapterOrder)
            .all(&central)
            .await?)
    }
}
