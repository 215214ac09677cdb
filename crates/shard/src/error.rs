//! Error types for partition routing and replication

use thiserror::Error;

use crate::PartitionId;

/// Error type for every operation of the shard layer
#[derive(Error, Debug)]
pub enum ShardError {
    /// The partition id is not one of the configured branches
    #[error("Partition not found: branch_id={0}")]
    PartitionNotFound(PartitionId),

    /// No partition holds the requested user
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The branch user exists but is not a teacher
    #[error("User {user_id} in branch {partition_id} is not an instructor")]
    NotAnInstructor {
        partition_id: PartitionId,
        user_id: i64,
    },

    /// The acting instructor does not own the catalog row
    #[error("Not the instructor of course {course_id}")]
    NotCourseInstructor { course_id: i64 },

    /// Every leg of a fan-out failed
    #[error("All partitions unreachable ({attempted} attempted)")]
    AllPartitionsUnreachable { attempted: usize },

    /// A strict fan-out could not reach one partition
    #[error("Partition {partition_id} unavailable: {reason}")]
    PartitionUnavailable {
        partition_id: PartitionId,
        reason: String,
    },

    #[error("Course not found: {0}")]
    CourseNotFound(i64),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(i64),

    #[error("Lesson not found: {0}")]
    LessonNotFound(i64),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Comment not found: {0}")]
    CommentNotFound(i64),

    #[error("Answer not found: {0}")]
    AnswerNotFound(String),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Username already taken in branch {partition_id}: {username}")]
    UsernameTaken {
        partition_id: PartitionId,
        username: String,
    },

    #[error("User {user_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { user_id: i64, course_id: i64 },

    #[error("User {user_id} is not enrolled in course {course_id}")]
    NotEnrolled { user_id: i64, course_id: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A replication run is already in progress
    #[error("Replication run already in progress")]
    ReplicationInProgress,

    /// The registry was closed and holds no connections
    #[error("Shard registry is closed")]
    RegistryClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    /// Connecting to a configured database failed at startup
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl ShardError {
    /// Whether the error means "the requested thing does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ShardError::PartitionNotFound(_)
                | ShardError::UserNotFound(_)
                | ShardError::CourseNotFound(_)
                | ShardError::ChapterNotFound(_)
                | ShardError::LessonNotFound(_)
                | ShardError::TaskNotFound(_)
                | ShardError::CommentNotFound(_)
                | ShardError::AnswerNotFound(_)
        )
    }

    /// Whether the error is an authorization failure
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            ShardError::NotAnInstructor { .. } | ShardError::NotCourseInstructor { .. }
        )
    }
}

/// Result type alias for shard operations
pub type Result<T> = std::result::Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ShardError::UserNotFound("user_id=7".into()).is_not_found());
        assert!(ShardError::PartitionNotFound(9).is_not_found());
        assert!(!ShardError::PartitionNotFound(9).is_forbidden());
        assert!(ShardError::NotCourseInstructor { course_id: 1 }.is_forbidden());
        assert!(ShardError::NotAnInstructor {
            partition_id: 1,
            user_id: 2
        }
        .is_forbidden());
        assert!(!ShardError::AllPartitionsUnreachable { attempted: 3 }.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = ShardError::AllPartitionsUnreachable { attempted: 3 };
        assert_eq!(err.to_string(), "All partitions unreachable (3 attempted)");

        let err = ShardError::NotAnInstructor {
            partition_id: 1,
            user_id: 1001,
        };
        assert_eq!(err.to_string(), "User 1001 in branch 1 is not an instructor");
    }
}
