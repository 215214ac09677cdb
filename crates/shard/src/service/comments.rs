//! Course discussion
//!
//! Comments live in the author's branch. A reply may point at a comment in
//! any branch; comment ids repeat across branches, so the parent is stored as
//! a (branch, comment id) pair and checked once at write time.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, JoinType, NotSet, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use tracing::debug;

use crate::entity::{comments, learning, users};
use crate::error::{Result, ShardError};
use crate::fanout::Sharded;
use crate::router::ShardRouter;
use crate::service::{live_course, require_text, BranchUser};
use crate::PartitionId;

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub content: String,
    /// Zero is treated as no parent
    pub parent_comment_id: Option<i64>,
    /// Branch holding the parent; required with `parent_comment_id`
    pub parent_branch_id: Option<PartitionId>,
}

/// Comment joined with its author's username
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct CommentView {
    pub comment_id: i64,
    pub course_id: i64,
    pub user_id: i64,
    pub comment_content: String,
    pub parent_comment_id: Option<i64>,
    pub parent_branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub username: String,
}

pub struct CommentService {
    router: Arc<ShardRouter>,
}

impl CommentService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }

    /// Comment as a student; the student must be enrolled in the course
    pub async fn add_comment(
        &self,
        student: BranchUser,
        course_id: i64,
        req: NewComment,
    ) -> Result<comments::Model> {
        let central = self.router.central().await?;
        live_course(&central, course_id).await?;

        let partition = self.router.resolve_connection(student.partition_id).await?;
        let enrolled = learning::Entity::find()
            .filter(learning::Column::UserId.eq(student.user_id))
            .filter(learning::Column::CourseId.eq(course_id))
            .one(partition.connection())
            .await?;
        if enrolled.is_none() {
            return Err(ShardError::NotEnrolled {
                user_id: student.user_id,
                course_id,
            });
        }

        self.create_comment(student, course_id, req).await
    }

    /// Comment as the course's instructor
    pub async fn add_teacher_comment(
        &self,
        teacher: BranchUser,
        course_id: i64,
        req: NewComment,
    ) -> Result<comments::Model> {
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        self.router
            .bridge()
            .authorize_course(instructor_id, course_id)
            .await?;

        self.create_comment(teacher, course_id, req).await
    }

    /// Comments of a course from every branch, newest first
    pub async fn list_comments(&self, course_id: i64) -> Result<Vec<Sharded<CommentView>>> {
        let central = self.router.central().await?;
        live_course(&central, course_id).await?;

        let mut rows = self
            .router
            .fan_out()
            .merge_all("course_comments", |p| async move {
                comments::Entity::find()
                    .select_only()
                    .columns([
                        comments::Column::CommentId,
                        comments::Column::CourseId,
                        comments::Column::UserId,
                        comments::Column::CommentContent,
                        comments::Column::ParentCommentId,
                        comments::Column::ParentBranchId,
                        comments::Column::CreatedAt,
                    ])
                    .column(users::Column::Username)
                    .join(JoinType::InnerJoin, comments::Relation::User.def())
                    .filter(comments::Column::CourseId.eq(course_id))
                    .order_by_desc(comments::Column::CreatedAt)
                    .into_model::<CommentView>()
                    .all(p.connection())
                    .await
            })
            .await?;
        rows.sort_by(|a, b| b.row.created_at.cmp(&a.row.created_at));
        Ok(rows)
    }

    async fn create_comment(
        &self,
        author: BranchUser,
        course_id: i64,
        req: NewComment,
    ) -> Result<comments::Model> {
        require_text("content", &req.content)?;

        let parent = match req.parent_comment_id {
            None | Some(0) => None,
            Some(parent_id) => {
                let parent_branch = req.parent_branch_id.ok_or_else(|| {
                    ShardError::InvalidInput(
                        "parent_branch_id is required when replying to a comment".into(),
                    )
                })?;
                let branch = self.router.resolve_connection(parent_branch).await?;
                comments::Entity::find_by_id(parent_id)
                    .filter(comments::Column::CourseId.eq(course_id))
                    .one(branch.connection())
                    .await?
                    .ok_or(ShardError::CommentNotFound(parent_id))?;
                debug!("Reply to comment {} in branch {}", parent_id, parent_branch);
                Some((parent_id, parent_branch))
            }
        };

        let partition = self.router.resolve_connection(author.partition_id).await?;
        let now = Utc::now();
        Ok(comments::ActiveModel {
            comment_id: NotSet,
            course_id: Set(course_id),
            user_id: Set(author.user_id),
            branch_id: Set(author.partition_id),
            comment_content: Set(req.content),
            parent_comment_id: Set(parent.map(|(id, _)| id)),
            parent_branch_id: Set(parent.map(|(_, branch)| branch)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(partition.connection())
        .await?)
    }
}
