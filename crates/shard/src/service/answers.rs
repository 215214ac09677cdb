//! Task submissions and grading

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, IntoActiveModel, JoinType,
    NotSet, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use tracing::info;

use crate::entity::{answers, tasks, users};
use crate::error::{Result, ShardError};
use crate::fanout::Sharded;
use crate::router::ShardRouter;
use crate::service::{require_text, BranchUser};
use crate::PartitionId;

const ANSWER_TYPES: [&str; 2] = ["text", "image_url"];

#[derive(Debug, Clone, Default)]
pub struct NewAnswer {
    /// Text, or an object-storage URL for `image_url` answers
    pub answer_content: String,
    /// Defaults to "text"
    pub answer_type: Option<String>,
}

/// Submission joined with the student's name
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct AnswerView {
    pub answer_id: i64,
    pub task_id: i64,
    pub branch_id: i64,
    pub user_id: i64,
    pub graded_by: Option<i64>,
    pub answer_content: String,
    pub answer_type: String,
    pub score: i32,
    pub is_graded: bool,
    pub submitted_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
}

pub struct AnswerService {
    router: Arc<ShardRouter>,
}

impl AnswerService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }

    /// Submit or resubmit; a resubmission clears any previous grade
    pub async fn submit_answer(
        &self,
        student: BranchUser,
        task_id: i64,
        req: NewAnswer,
    ) -> Result<answers::Model> {
        require_text("answer_content", &req.answer_content)?;
        let answer_type = req.answer_type.unwrap_or_else(|| "text".to_string());
        if !ANSWER_TYPES.contains(&answer_type.as_str()) {
            return Err(ShardError::InvalidInput(format!(
                "unknown answer type: {}",
                answer_type
            )));
        }

        let central = self.router.central().await?;
        tasks::Entity::find_by_id(task_id)
            .filter(tasks::Column::DeletedAt.is_null())
            .one(&central)
            .await?
            .ok_or(ShardError::TaskNotFound(task_id))?;

        let partition = self.router.resolve_connection(student.partition_id).await?;
        let conn = partition.connection();
        let now = Utc::now();

        let existing = find_answer(conn, student, task_id).await?;
        let answer = match existing {
            Some(previous) => {
                let mut active = previous.into_active_model();
                active.answer_content = Set(req.answer_content);
                active.answer_type = Set(answer_type);
                active.submitted_at = Set(now);
                active.score = Set(0);
                active.is_graded = Set(false);
                active.graded_by = Set(None);
                active.updated_at = Set(now);
                active.update(conn).await?
            }
            None => {
                answers::ActiveModel {
                    answer_id: NotSet,
                    task_id: Set(task_id),
                    branch_id: Set(student.partition_id),
                    user_id: Set(student.user_id),
                    graded_by: Set(None),
                    answer_content: Set(req.answer_content),
                    answer_type: Set(answer_type),
                    score: Set(0),
                    is_graded: Set(false),
                    submitted_at: Set(now),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?
            }
        };
        Ok(answer)
    }

    pub async fn student_answer(&self, student: BranchUser, task_id: i64) -> Result<answers::Model> {
        let partition = self.router.resolve_connection(student.partition_id).await?;
        find_answer(partition.connection(), student, task_id)
            .await?
            .ok_or_else(|| {
                ShardError::AnswerNotFound(format!(
                    "task_id={} user_id={}",
                    task_id, student.user_id
                ))
            })
    }

    /// Every submission for a task the teacher owns, newest first
    pub async fn list_answers_for_task(
        &self,
        teacher: BranchUser,
        task_id: i64,
    ) -> Result<Vec<Sharded<AnswerView>>> {
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;
        self.router
            .bridge()
            .authorize_task(instructor_id, task_id)
            .await?;

        let mut rows = self
            .router
            .fan_out()
            .merge_all("task_answers", |p| async move {
                answers::Entity::find()
                    .select_only()
                    .columns([
                        answers::Column::AnswerId,
                        answers::Column::TaskId,
                        answers::Column::BranchId,
                        answers::Column::UserId,
                        answers::Column::GradedBy,
                        answers::Column::AnswerContent,
                        answers::Column::AnswerType,
                        answers::Column::Score,
                        answers::Column::IsGraded,
                        answers::Column::SubmittedAt,
                    ])
                    .column(users::Column::FirstName)
                    .column(users::Column::LastName)
                    .join(JoinType::InnerJoin, answers::Relation::User.def())
                    .filter(answers::Column::TaskId.eq(task_id))
                    .order_by_desc(answers::Column::SubmittedAt)
                    .into_model::<AnswerView>()
                    .all(p.connection())
                    .await
            })
            .await?;
        rows.sort_by(|a, b| b.row.submitted_at.cmp(&a.row.submitted_at));
        Ok(rows)
    }

    /// Grade the answer `answer_id` stored in branch `answer_partition`
    ///
    /// Answer ids are only unique within a branch, so the caller names the
    /// branch. `graded_by` is recorded only when the grader's account lives
    /// in that same branch.
    pub async fn grade_answer(
        &self,
        teacher: BranchUser,
        answer_partition: PartitionId,
        answer_id: i64,
        score: i32,
    ) -> Result<answers::Model> {
        let instructor_id = self
            .router
            .ensure_instructor(teacher.partition_id, teacher.user_id)
            .await?
            .instructor_id;

        let partition = self.router.resolve_connection(answer_partition).await?;
        let conn = partition.connection();
        let answer = answers::Entity::find_by_id(answer_id)
            .filter(answers::Column::BranchId.eq(answer_partition))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ShardError::AnswerNotFound(format!(
                    "answer_id={} in branch {}",
                    answer_id, answer_partition
                ))
            })?;

        let task = self
            .router
            .bridge()
            .authorize_task(instructor_id, answer.task_id)
            .await?;
        if !(0..=task.max_score).contains(&score) {
            return Err(ShardError::InvalidInput(format!(
                "score must be within 0..={}, got {}",
                task.max_score, score
            )));
        }

        let grader_in_branch = users::Entity::find_by_id(teacher.user_id)
            .filter(users::Column::BranchId.eq(answer_partition))
            .one(conn)
            .await?
            .is_some();

        let mut active = answer.into_active_model();
        active.score = Set(score);
        active.is_graded = Set(true);
        active.graded_by = Set(grader_in_branch.then_some(teacher.user_id));
        active.updated_at = Set(Utc::now());
        let graded = active.update(conn).await?;

        info!(
            "Instructor {} graded answer {} in branch {}: {}",
            instructor_id, answer_id, answer_partition, score
        );
        Ok(graded)
    }
}

async fn find_answer(
    conn: &sea_orm::DatabaseConnection,
    student: BranchUser,
    task_id: i64,
) -> Result<Option<answers::Model>> {
    Ok(answers::Entity::find()
        .filter(answers::Column::TaskId.eq(task_id))
        .filter(answers::Column::UserId.eq(student.user_id))
        .one(conn)
        .await?)
}
