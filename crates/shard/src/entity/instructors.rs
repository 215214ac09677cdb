//! instructors entity
//! Central-side bridge record for a branch teacher account.
//! Exactly one row per (branch_id, branch_user_id); username and email are
//! snapshots taken when the row was created.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "instructors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub instructor_id: i64,
    pub branch_id: i64,
    pub branch_user_id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
