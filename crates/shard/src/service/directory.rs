//! Accounts and branches

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::entity::{branches, users};
use crate::error::{Result, ShardError};
use crate::fanout::Sharded;
use crate::router::ShardRouter;
use crate::service::require_text;
use crate::{PartitionId, UserId};

/// Width of each branch's user id range: ids of branch `b` start at
/// `b * USER_ID_STRIDE + 1`
pub const USER_ID_STRIDE: i64 = 1_000_000_000;

/// Inserts tried before a conflicting id allocation is reported
const ID_ALLOCATION_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub branch_id: PartitionId,
    pub username: String,
    pub email: String,
    /// Already hashed by the caller
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: UserId,
    pub branch_id: PartitionId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub status: String,
}

impl From<users::Model> for UserInfo {
    fn from(user: users::Model) -> Self {
        Self {
            user_id: user.user_id,
            branch_id: user.branch_id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            status: user.status,
        }
    }
}

pub struct DirectoryService {
    router: Arc<ShardRouter>,
}

impl DirectoryService {
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self { router }
    }

    /// Create a student account in `req.branch_id`
    ///
    /// The username must be unique within the branch and the email across
    /// every branch. The email check needs every partition to answer.
    pub async fn register_student(&self, req: NewStudent) -> Result<users::Model> {
        require_text("username", &req.username)?;
        require_text("email", &req.email)?;
        require_text("password_hash", &req.password_hash)?;

        let partition = self.router.resolve_connection(req.branch_id).await?;
        let conn = partition.connection();

        ensure_username_free(conn, req.branch_id, &req.username).await?;
        self.ensure_email_free(&req.email).await?;

        let now = Utc::now();
        let mut attempt = 1;
        let user = loop {
            let user_id = next_user_id(conn, req.branch_id).await?;
            let row = users::ActiveModel {
                user_id: Set(user_id),
                branch_id: Set(req.branch_id),
                username: Set(req.username.clone()),
                email: Set(req.email.clone()),
                password_hash: Set(req.password_hash.clone()),
                first_name: Set(req.first_name.clone()),
                last_name: Set(req.last_name.clone()),
                role: Set(users::ROLE_STUDENT.to_string()),
                status: Set("active".to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            match row.insert(conn).await {
                Ok(user) => break user,
                Err(e) if is_unique_violation(&e) => {
                    // a concurrent registration won the username, the email or the id
                    ensure_username_free(conn, req.branch_id, &req.username).await?;
                    if users::Entity::find()
                        .filter(users::Column::Email.eq(req.email.as_str()))
                        .one(conn)
                        .await?
                        .is_some()
                    {
                        return Err(ShardError::EmailTaken(req.email));
                    }
                    if attempt >= ID_ALLOCATION_ATTEMPTS {
                        return Err(e.into());
                    }
                    warn!(
                        "User id {} of branch {} taken concurrently, retrying",
                        user_id, req.branch_id
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!("Registered student {} in branch {}", user.user_id, user.branch_id);
        Ok(user)
    }

    /// Login lookup: the account holding `email`, searched branch by branch
    pub async fn find_account_by_email(&self, email: &str) -> Result<Sharded<users::Model>> {
        let found = self
            .router
            .fan_out()
            .locate_first("account_by_email", |p| async move {
                users::Entity::find()
                    .filter(users::Column::Email.eq(email))
                    .one(p.connection())
                    .await
            })
            .await?;
        found.ok_or_else(|| ShardError::UserNotFound(format!("email={}", email)))
    }

    pub async fn user_info(&self, user_id: UserId) -> Result<UserInfo> {
        let partition = self.router.connection_for_user(user_id).await?;
        match users::Entity::find_by_id(user_id)
            .one(partition.connection())
            .await?
        {
            Some(user) => Ok(user.into()),
            None => {
                // cached location went stale
                self.router.invalidate(user_id).await;
                Err(ShardError::UserNotFound(format!("user_id={}", user_id)))
            }
        }
    }

    /// Update name or email of an account and drop its cached location
    pub async fn update_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<UserInfo> {
        let partition = self.router.connection_for_user(user_id).await?;
        let conn = partition.connection();
        let user = users::Entity::find_by_id(user_id)
            .one(conn)
            .await?
            .ok_or_else(|| ShardError::UserNotFound(format!("user_id={}", user_id)))?;

        if let Some(email) = &update.email {
            require_text("email", email)?;
            if *email != user.email {
                self.ensure_email_free(email).await?;
            }
        }

        let mut active = user.into_active_model();
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        active.updated_at = Set(Utc::now());
        let user = active.update(conn).await?;

        self.router.invalidate(user_id).await;
        Ok(user.into())
    }

    /// Every branch known to any partition, deduplicated and sorted by id
    pub async fn list_branches(&self) -> Result<Vec<branches::Model>> {
        let rows = self
            .router
            .fan_out()
            .merge_unique(
                "branches",
                |p| async move { branches::Entity::find().all(p.connection()).await },
                |branch: &branches::Model| branch.branch_id,
            )
            .await?;

        let mut branches: Vec<_> = rows.into_iter().map(Sharded::into_row).collect();
        branches.sort_by_key(|b| b.branch_id);
        Ok(branches)
    }

    async fn ensure_email_free(&self, email: &str) -> Result<()> {
        let holders = self
            .router
            .fan_out()
            .require_all("email_unique", |p| async move {
                users::Entity::find()
                    .filter(users::Column::Email.eq(email))
                    .select_only()
                    .column(users::Column::UserId)
                    .into_tuple::<i64>()
                    .all(p.connection())
                    .await
            })
            .await?;
        if !holders.is_empty() {
            return Err(ShardError::EmailTaken(email.to_string()));
        }
        Ok(())
    }
}

async fn ensure_username_free(
    conn: &sea_orm::DatabaseConnection,
    branch_id: PartitionId,
    username: &str,
) -> Result<()> {
    let taken = users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(conn)
        .await?;
    if taken.is_some() {
        return Err(ShardError::UsernameTaken {
            partition_id: branch_id,
            username: username.to_string(),
        });
    }
    Ok(())
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn next_user_id(
    conn: &sea_orm::DatabaseConnection,
    branch_id: PartitionId,
) -> Result<UserId> {
    let low = branch_id
        .checked_mul(USER_ID_STRIDE)
        .ok_or_else(|| ShardError::InvalidInput(format!("branch_id {} out of range", branch_id)))?;
    let high = low + USER_ID_STRIDE;

    let last = users::Entity::find()
        .filter(users::Column::UserId.gt(low))
        .filter(users::Column::UserId.lt(high))
        .order_by_desc(users::Column::UserId)
        .select_only()
        .column(users::Column::UserId)
        .into_tuple::<i64>()
        .one(conn)
        .await?;

    match last {
        Some(id) if id + 1 >= high => Err(ShardError::InvalidInput(format!(
            "user id range of branch {} exhausted",
            branch_id
        ))),
        Some(id) => Ok(id + 1),
        None => Ok(low + 1),
    }
}
