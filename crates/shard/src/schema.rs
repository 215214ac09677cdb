//! Table creation for the central store and the branch partitions
//!
//! Production deployments manage schemas with migrations; these helpers are
//! used by `shard-sync --init-schema` and by the tests.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

use crate::entity::{
    answers, branches, chapters, comments, courses, instructors, learning, lessons,
    replication_checkpoints, tasks, users,
};
use crate::error::Result;

/// Create the central tables: catalog, instructor bridge, checkpoints
pub async fn create_central_schema(db: &DatabaseConnection) -> Result<()> {
    create_catalog_tables(db).await?;
    create_table(db, instructors::Entity).await?;
    create_table(db, replication_checkpoints::Entity).await?;

    create_index(
        db,
        Index::create()
            .name("uk_instructors_branch_user")
            .table(instructors::Entity)
            .col(instructors::Column::BranchId)
            .col(instructors::Column::BranchUserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    info!("Central schema ready");
    Ok(())
}

/// Create the partition tables: accounts, activity and catalog replicas
pub async fn create_partition_schema(db: &DatabaseConnection) -> Result<()> {
    create_table(db, users::Entity).await?;
    create_table(db, branches::Entity).await?;
    create_catalog_tables(db).await?;
    create_table(db, learning::Entity).await?;
    create_table(db, comments::Entity).await?;
    create_table(db, answers::Entity).await?;

    create_index(
        db,
        Index::create()
            .name("uk_learning_user_course")
            .table(learning::Entity)
            .col(learning::Column::UserId)
            .col(learning::Column::CourseId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("uk_answers_task_user")
            .table(answers::Entity)
            .col(answers::Column::TaskId)
            .col(answers::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("idx_comments_course")
            .table(comments::Entity)
            .col(comments::Column::CourseId)
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    info!("Partition schema ready");
    Ok(())
}

async fn create_catalog_tables(db: &DatabaseConnection) -> Result<()> {
    // parents first
    create_table(db, courses::Entity).await?;
    create_table(db, chapters::Entity).await?;
    create_table(db, lessons::Entity).await?;
    create_table(db, tasks::Entity).await?;
    Ok(())
}

/// Create one table from its entity definition if it does not exist yet
pub async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();

    debug!("Creating table {}", entity.table_name());
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

async fn create_index(db: &DatabaseConnection, stmt: IndexCreateStatement) -> Result<()> {
    let backend = db.get_database_backend();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
