//! answers entity
//! One submission per (task_id, user_id) in the student's branch

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "answers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub answer_id: i64,
    pub task_id: i64,
    pub branch_id: i64,
    pub user_id: i64,
    pub graded_by: Option<i64>, // grader's user_id when the grader lives in this branch
    #[sea_orm(column_type = "Text")]
    pub answer_content: String, // text or an object-storage URL
    pub answer_type: String,    // text, image_url
    pub score: i32,
    pub is_graded: bool,
    pub submitted_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::UserId"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
