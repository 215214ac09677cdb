//! Domain services built on the shard router
//!
//! Every write targets exactly one partition: the acting user's branch for
//! accounts and activity, the central store for the catalog. Reads that
//! span branches go through the router's fan-out engine.

pub mod answers;
pub mod catalog;
pub mod comments;
pub mod directory;
pub mod learning;

pub use answers::{AnswerService, AnswerView, NewAnswer};
pub use catalog::{CatalogService, CourseUpdate, NewChapter, NewCourse, NewLesson, NewTask};
pub use comments::{CommentService, CommentView, NewComment};
pub use directory::{DirectoryService, NewStudent, ProfileUpdate, UserInfo, USER_ID_STRIDE};
pub use learning::{LearningService, ProgressUpdate, ProgressView};

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entity::courses;
use crate::error::{Result, ShardError};
use crate::{PartitionId, UserId};

/// A user acting through their home branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchUser {
    pub partition_id: PartitionId,
    pub user_id: UserId,
}

impl BranchUser {
    pub fn new(partition_id: PartitionId, user_id: UserId) -> Self {
        Self {
            partition_id,
            user_id,
        }
    }
}

/// Live (not soft-deleted) course from the central store
pub(crate) async fn live_course(
    central: &DatabaseConnection,
    course_id: i64,
) -> Result<courses::Model> {
    courses::Entity::find_by_id(course_id)
        .filter(courses::Column::DeletedAt.is_null())
        .one(central)
        .await?
        .ok_or(ShardError::CourseNotFound(course_id))
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ShardError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}
