//! Shared test utilities for the ledger core.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        category, ledger,
        project::{self, AllocationInput, ProjectFields},
        transfer::{self, SubLedger, TransferRequest, TransferReceipt},
    },
    entities::{self, ProjectStatus},
    errors::Result,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::path::{Path, PathBuf};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database under the system temp directory.
///
/// Unlike `sqlite::memory:`, the pool can hold several connections, so concurrent
/// transactions really interleave. Any file left by an earlier run is removed first; call
/// [`remove_file_test_db`] when done.
pub async fn setup_file_test_db(name: &str) -> Result<(DatabaseConnection, PathBuf)> {
    let path = std::env::temp_dir().join(format!(
        "budget-ledger-{name}-{}.sqlite",
        std::process::id()
    ));
    remove_file_test_db(&path);

    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = sea_orm::Database::connect(&url).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((db, path))
}

/// Deletes a database created by [`setup_file_test_db`] along with its journal files.
pub fn remove_file_test_db(path: &Path) {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

/// Shorthand for a calendar date in tests.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Creates an active category whose display name is derived from the key.
pub async fn create_test_category(
    db: &DatabaseConnection,
    key: &str,
) -> Result<entities::category::Model> {
    let name = key.replace('_', " ").to_lowercase();
    category::create_category(db, key, &name, None).await
}

/// Creates a test project with whole-unit allocations.
///
/// Categories named in `allocations` are created on the fly if they do not exist yet.
///
/// # Defaults
/// * window: 2025-01-01 to 2025-12-31
/// * status: active
/// * responsible person: "Test Owner"
pub async fn create_test_project(
    db: &DatabaseConnection,
    name: &str,
    allocations: &[(&str, i64)],
) -> Result<entities::project::Model> {
    let mut inputs = Vec::with_capacity(allocations.len());
    for &(key, amount) in allocations {
        if category::get_category_by_key(db, key).await?.is_none() {
            create_test_category(db, key).await?;
        }
        inputs.push(AllocationInput::new(key, Decimal::from(amount)));
    }

    project::create_project(
        db,
        ProjectFields {
            name: name.to_string(),
            responsible_person: "Test Owner".to_string(),
            description: None,
            start_date: date(2025, 1, 1),
            end_date: date(2025, 12, 31),
            status: ProjectStatus::Active,
        },
        &inputs,
    )
    .await
}

fn test_entry(project_id: i64, category_id: i64, amount: i64, kind: &str) -> ledger::NewEntry {
    ledger::NewEntry {
        project_id,
        category_id,
        amount: Decimal::from(amount),
        kind: kind.to_string(),
        occurred_on: date(2025, 3, 1),
        description: format!("Test {kind}"),
        reference: None,
    }
}

/// Records an expense of whole units dated 2025-03-01.
pub async fn record_test_expense(
    db: &DatabaseConnection,
    project_id: i64,
    category_id: i64,
    amount: i64,
) -> Result<entities::transaction::Model> {
    ledger::record_entry(db, test_entry(project_id, category_id, amount, "expense")).await
}

/// Records an income of whole units dated 2025-03-01.
pub async fn record_test_income(
    db: &DatabaseConnection,
    project_id: i64,
    category_id: i64,
    amount: i64,
) -> Result<entities::transaction::Model> {
    ledger::record_entry(db, test_entry(project_id, category_id, amount, "income")).await
}

/// Transfers whole units between two sub-ledgers, dated 2025-04-01, without a note.
pub async fn transfer_test_amount(
    db: &DatabaseConnection,
    from: (i64, &str),
    to: (i64, &str),
    amount: i64,
) -> Result<TransferReceipt> {
    transfer::transfer(
        db,
        TransferRequest {
            from: SubLedger::new(from.0, from.1),
            to: SubLedger::new(to.0, to.1),
            amount: Decimal::from(amount),
            occurred_on: date(2025, 4, 1),
            note: None,
        },
    )
    .await
}
