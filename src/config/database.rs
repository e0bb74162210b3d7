//! Database configuration module for the budget ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. Foreign keys declared on the entities act as
//! a safety net; the business rules in `core` never rely on a cascade alone.

use crate::entities::{Allocation, Category, Project, Transaction, allocation};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/budget_ledger.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a default local `SQLite` file if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all ledger tables (if missing) from the entity definitions.
///
/// Tables are created parents first so foreign keys resolve: categories and projects, then
/// allocations and transactions. A unique index enforces one allocation per
/// (project, category) pair.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Enforced by sqlx by default; repeated here for connections opened elsewhere
    if builder == sea_orm::DatabaseBackend::Sqlite {
        db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;
    }

    let category_table = schema
        .create_table_from_entity(Category)
        .if_not_exists()
        .to_owned();
    let project_table = schema
        .create_table_from_entity(Project)
        .if_not_exists()
        .to_owned();
    let allocation_table = schema
        .create_table_from_entity(Allocation)
        .if_not_exists()
        .to_owned();
    let transaction_table = schema
        .create_table_from_entity(Transaction)
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&category_table)).await?;
    db.execute(builder.build(&project_table)).await?;
    db.execute(builder.build(&allocation_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;

    let allocation_pair_index = Index::create()
        .name("idx_allocations_project_category")
        .table(Allocation)
        .col(allocation::Column::ProjectId)
        .col(allocation::Column::CategoryId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&allocation_pair_index)).await?;

    info!("Ledger tables ensured.");
    Ok(())
}
