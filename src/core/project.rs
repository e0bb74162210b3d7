//! Project store - Handles projects and their opening allocations.
//!
//! A project is created together with one allocation row per budgeted category, as a single
//! atomic unit. Allocations are the opening balance of each sub-ledger and are never touched by
//! transfers. Editing allocations keeps any row whose category already has ledger history, so no
//! entry is ever orphaned.

use crate::{
    core::{category, money},
    entities::{
        Allocation, Category, Project, ProjectStatus, Transaction, allocation, category as category_entity,
        project, transaction,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Requested opening budget for one category of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationInput {
    /// Category key, e.g. `BOOKS`
    pub category_key: String,
    /// Budgeted amount, must not be negative
    pub amount: Decimal,
}

impl AllocationInput {
    /// Convenience constructor.
    pub fn new(category_key: impl Into<String>, amount: Decimal) -> Self {
        Self {
            category_key: category_key.into(),
            amount,
        }
    }
}

/// Fields of a project as submitted for create or full update.
#[derive(Debug, Clone)]
pub struct ProjectFields {
    /// Project name, unique ignoring case
    pub name: String,
    /// Person accountable for the budget
    pub responsible_person: String,
    /// Optional description
    pub description: Option<String>,
    /// First day of the window
    pub start_date: NaiveDate,
    /// Last day of the window
    pub end_date: NaiveDate,
    /// Lifecycle status
    pub status: ProjectStatus,
}

/// A project's allocation row joined with its category.
#[derive(Debug, Clone)]
pub struct ProjectAllocation {
    /// The allocation row
    pub allocation: allocation::Model,
    /// The category it budgets
    pub category: category_entity::Model,
}

impl ProjectAllocation {
    /// Allocated amount as a decimal.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        money::from_minor(self.allocation.amount_minor)
    }
}

/// Finds a project by its unique ID.
pub async fn get_project_by_id<C>(db: &C, project_id: i64) -> Result<Option<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find_by_id(project_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a project or fails with `Error::UnknownProject`.
pub async fn require_project<C>(db: &C, project_id: i64) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    get_project_by_id(db, project_id)
        .await?
        .ok_or_else(|| Error::UnknownProject {
            reference: project_id.to_string(),
        })
}

/// Finds a project whose name matches ignoring case, optionally ignoring one project ID.
///
/// Case folding is done on the Rust side with full Unicode rules, since `SQLite`'s `lower()`
/// only folds ASCII letters.
pub async fn find_project_by_name<C>(
    db: &C,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<Option<project::Model>>
where
    C: ConnectionTrait,
{
    let wanted = name.trim().to_lowercase();
    let mut query = Project::find();
    if let Some(id) = exclude_id {
        query = query.filter(project::Column::Id.ne(id));
    }
    Ok(query
        .all(db)
        .await?
        .into_iter()
        .find(|project| project.name.trim().to_lowercase() == wanted))
}

/// Lists projects newest first, optionally filtered by status.
pub async fn list_projects(
    db: &DatabaseConnection,
    status: Option<ProjectStatus>,
) -> Result<Vec<project::Model>> {
    let mut query = Project::find();
    if let Some(status) = status {
        query = query.filter(project::Column::Status.eq(status));
    }
    query
        .order_by_desc(project::Column::CreatedAt)
        .order_by_desc(project::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the allocation rows of a project with their categories, ordered by category key.
pub async fn get_project_allocations<C>(db: &C, project_id: i64) -> Result<Vec<ProjectAllocation>>
where
    C: ConnectionTrait,
{
    let rows = Allocation::find()
        .filter(allocation::Column::ProjectId.eq(project_id))
        .find_also_related(Category)
        .order_by_asc(category_entity::Column::Key)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(allocation, category)| {
            category.map(|category| ProjectAllocation {
                allocation,
                category,
            })
        })
        .collect())
}

/// Finds the allocation row of one (project, category) sub-ledger.
pub async fn find_allocation<C>(
    db: &C,
    project_id: i64,
    category_id: i64,
) -> Result<Option<allocation::Model>>
where
    C: ConnectionTrait,
{
    Allocation::find()
        .filter(allocation::Column::ProjectId.eq(project_id))
        .filter(allocation::Column::CategoryId.eq(category_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Makes sure a (project, category) pair has an allocation row, creating one of zero if missing.
///
/// A zero row makes the category visible for the project without changing any balance.
pub async fn ensure_allocation<C>(
    db: &C,
    project_id: i64,
    category_id: i64,
) -> Result<allocation::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_allocation(db, project_id, category_id).await? {
        return Ok(existing);
    }

    debug!(
        "Opening zero allocation for project {} category {}",
        project_id, category_id
    );
    let model = allocation::ActiveModel {
        project_id: Set(project_id),
        category_id: Set(category_id),
        amount_minor: Set(0),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

fn validate_fields(details: &ProjectFields) -> Result<()> {
    if details.name.trim().is_empty() {
        return Err(Error::Config {
            message: "Project name cannot be empty".to_string(),
        });
    }
    if details.end_date < details.start_date {
        return Err(Error::InvalidWindow {
            start: details.start_date,
            end: details.end_date,
        });
    }
    Ok(())
}

/// Checks amounts and duplicates without touching storage.
fn validate_allocations(allocations: &[AllocationInput]) -> Result<()> {
    let mut seen = HashSet::new();
    for input in allocations {
        if input.amount < Decimal::ZERO {
            return Err(Error::InvalidAllocation {
                category: input.category_key.clone(),
                reason: format!("amount must not be negative (got {})", input.amount),
            });
        }
        money::to_minor("allocation", input.amount)?;
        if !seen.insert(input.category_key.as_str()) {
            return Err(Error::InvalidAllocation {
                category: input.category_key.clone(),
                reason: "category listed more than once".to_string(),
            });
        }
    }
    Ok(())
}

/// Resolves category keys to IDs and amounts to minor units.
async fn resolve_allocations<C>(db: &C, allocations: &[AllocationInput]) -> Result<Vec<(i64, i64)>>
where
    C: ConnectionTrait,
{
    let mut resolved = Vec::with_capacity(allocations.len());
    for input in allocations {
        let category_id = category::resolve_category_key(db, &input.category_key).await?;
        resolved.push((category_id, money::to_minor("allocation", input.amount)?));
    }
    Ok(resolved)
}

/// Creates a project with its allocations as one atomic unit.
///
/// # Errors
/// Returns an error if:
/// - The name is empty, or matches an existing project ignoring case (`Error::DuplicateName`)
/// - The end date is before the start date (`Error::InvalidWindow`)
/// - An allocation is negative or repeats a category (`Error::InvalidAllocation`)
/// - An allocation names an unknown or inactive category (`Error::UnknownCategory`)
#[instrument(skip(db, details, allocations), fields(name = %details.name))]
pub async fn create_project(
    db: &DatabaseConnection,
    details: ProjectFields,
    allocations: &[AllocationInput],
) -> Result<project::Model> {
    validate_fields(&details)?;
    validate_allocations(allocations)?;

    let txn = db.begin().await?;

    if find_project_by_name(&txn, &details.name, None).await?.is_some() {
        return Err(Error::DuplicateName {
            name: details.name.trim().to_string(),
        });
    }
    let resolved = resolve_allocations(&txn, allocations).await?;

    let project = project::ActiveModel {
        name: Set(details.name.trim().to_string()),
        responsible_person: Set(details.responsible_person),
        description: Set(details.description),
        start_date: Set(details.start_date),
        end_date: Set(details.end_date),
        status: Set(details.status),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for (category_id, amount_minor) in resolved {
        allocation::ActiveModel {
            project_id: Set(project.id),
            category_id: Set(category_id),
            amount_minor: Set(amount_minor),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    info!(
        "Created project {} '{}' with {} allocation(s)",
        project.id,
        project.name,
        allocations.len()
    );
    Ok(project)
}

/// Replaces the fields of a project and, when supplied, its allocations.
///
/// Allocation rows of categories without ledger history are replaced by the supplied list.
/// Rows of categories that already have entries are never deleted; when the list includes
/// them their amount is updated in place.
#[instrument(skip(db, details, allocations))]
pub async fn update_project(
    db: &DatabaseConnection,
    project_id: i64,
    details: ProjectFields,
    allocations: Option<&[AllocationInput]>,
) -> Result<project::Model> {
    validate_fields(&details)?;
    if let Some(allocations) = allocations {
        validate_allocations(allocations)?;
    }

    let txn = db.begin().await?;

    let existing = require_project(&txn, project_id).await?;
    if find_project_by_name(&txn, &details.name, Some(project_id))
        .await?
        .is_some()
    {
        return Err(Error::DuplicateName {
            name: details.name.trim().to_string(),
        });
    }
    let resolved = match allocations {
        Some(allocations) => Some(resolve_allocations(&txn, allocations).await?),
        None => None,
    };

    let mut active_model: project::ActiveModel = existing.into();
    active_model.name = Set(details.name.trim().to_string());
    active_model.responsible_person = Set(details.responsible_person);
    active_model.description = Set(details.description);
    active_model.start_date = Set(details.start_date);
    active_model.end_date = Set(details.end_date);
    active_model.status = Set(details.status);
    let updated = active_model.update(&txn).await?;

    if let Some(resolved) = resolved {
        replace_allocations(&txn, project_id, &resolved).await?;
    }

    txn.commit().await?;
    info!("Updated project {} '{}'", updated.id, updated.name);
    Ok(updated)
}

async fn replace_allocations<C>(db: &C, project_id: i64, resolved: &[(i64, i64)]) -> Result<()>
where
    C: ConnectionTrait,
{
    let with_history: HashSet<i64> = Transaction::find()
        .select_only()
        .column(transaction::Column::CategoryId)
        .distinct()
        .filter(transaction::Column::ProjectId.eq(project_id))
        .into_tuple::<i64>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let existing: HashMap<i64, allocation::Model> = Allocation::find()
        .filter(allocation::Column::ProjectId.eq(project_id))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.category_id, row))
        .collect();

    // Rows without history are replaced wholesale
    let replaceable: Vec<i64> = existing
        .values()
        .filter(|row| !with_history.contains(&row.category_id))
        .map(|row| row.id)
        .collect();
    if !replaceable.is_empty() {
        Allocation::delete_many()
            .filter(allocation::Column::Id.is_in(replaceable))
            .exec(db)
            .await?;
    }

    for &(category_id, amount_minor) in resolved {
        match existing.get(&category_id) {
            Some(row) if with_history.contains(&category_id) => {
                if row.amount_minor != amount_minor {
                    let mut active_model: allocation::ActiveModel = row.clone().into();
                    active_model.amount_minor = Set(amount_minor);
                    active_model.update(db).await?;
                }
            }
            _ => {
                allocation::ActiveModel {
                    project_id: Set(project_id),
                    category_id: Set(category_id),
                    amount_minor: Set(amount_minor),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(())
}

/// Changes only the status of a project. No other field is validated.
///
/// # Errors
/// Returns `Error::InvalidStatus` if `status` is not `active`, `completed` or `suspended`.
pub async fn update_project_status(
    db: &DatabaseConnection,
    project_id: i64,
    status: &str,
) -> Result<project::Model> {
    let status: ProjectStatus = status.parse()?;
    let existing = require_project(db, project_id).await?;

    let mut active_model: project::ActiveModel = existing.into();
    active_model.status = Set(status);
    let updated = active_model.update(db).await?;
    info!("Project {} is now {}", updated.id, updated.status);
    Ok(updated)
}

/// Deletes a project and its allocations, refusing if any ledger entry references it.
///
/// The transaction check is explicit; the cascading foreign key on allocations is only a
/// safety net.
#[instrument(skip(db))]
pub async fn delete_project(db: &DatabaseConnection, project_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    let existing = require_project(&txn, project_id).await?;
    let count = Transaction::find()
        .filter(transaction::Column::ProjectId.eq(project_id))
        .count(&txn)
        .await?;
    if count > 0 {
        warn!(
            "Refusing to delete project {} '{}': {} ledger entries",
            existing.id, existing.name, count
        );
        return Err(Error::HasTransactions { project_id, count });
    }

    Allocation::delete_many()
        .filter(allocation::Column::ProjectId.eq(project_id))
        .exec(&txn)
        .await?;
    existing.delete(&txn).await?;

    txn.commit().await?;
    info!("Deleted project {}", project_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn fields(name: &str) -> ProjectFields {
        ProjectFields {
            name: name.to_string(),
            responsible_person: "Head of Library".to_string(),
            description: None,
            start_date: date(2025, 1, 1),
            end_date: date(2025, 12, 31),
            status: ProjectStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_create_project_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let mut backwards = fields("Backwards");
        backwards.end_date = date(2024, 12, 31);
        let result = create_project(&db, backwards, &[]).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidWindow { .. }));

        let result = create_project(
            &db,
            fields("Negative"),
            &[AllocationInput::new("BOOKS", Decimal::from(-1))],
        )
        .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidAllocation { category, .. } if category == "BOOKS"
        ));

        let result = create_project(
            &db,
            fields("Twice"),
            &[
                AllocationInput::new("BOOKS", Decimal::from(1)),
                AllocationInput::new("BOOKS", Decimal::from(2)),
            ],
        )
        .await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAllocation { .. }));

        let result = create_project(&db, fields("   "), &[]).await;
        assert!(matches!(result.unwrap_err(), Error::Config { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_update_project_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let mut backwards = fields("Library Fund");
        backwards.end_date = date(2024, 12, 31);
        let result = update_project(&db, 1, backwards, None).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidWindow { .. }));

        let negative = [AllocationInput::new("BOOKS", Decimal::from(-1))];
        let result = update_project(&db, 1, fields("Library Fund"), Some(&negative)).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidAllocation { category, .. } if category == "BOOKS"
        ));

        let repeated = [
            AllocationInput::new("EQUIPMENT", Decimal::from(1)),
            AllocationInput::new("EQUIPMENT", Decimal::from(2)),
        ];
        let result = update_project(&db, 1, fields("Library Fund"), Some(&repeated)).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAllocation { .. }));

        let result = update_project(&db, 1, fields(""), None).await;
        assert!(matches!(result.unwrap_err(), Error::Config { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_project_with_allocations() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_category(&db, "BOOKS").await?;
        create_test_category(&db, "EQUIPMENT").await?;

        let project = create_project(
            &db,
            fields("Library Fund"),
            &[
                AllocationInput::new("BOOKS", Decimal::from(10_000)),
                AllocationInput::new("EQUIPMENT", Decimal::new(250_050, 2)),
            ],
        )
        .await?;

        let allocations = get_project_allocations(&db, project.id).await?;
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].category.key, "BOOKS");
        assert_eq!(allocations[0].amount(), Decimal::from(10_000));
        assert_eq!(allocations[1].amount(), Decimal::new(250_050, 2));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_project_duplicate_name_ignores_case() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;

        let result = create_project(&db, fields("LIBRARY fund"), &[]).await;
        assert!(matches!(result.unwrap_err(), Error::DuplicateName { .. }));

        // Non-ASCII letters fold too
        create_project(&db, fields("École Trip"), &[]).await?;
        let result = create_project(&db, fields("école trip"), &[]).await;
        assert!(matches!(result.unwrap_err(), Error::DuplicateName { .. }));
        assert!(find_project_by_name(&db, "ÉCOLE TRIP", None).await?.is_some());

        assert_eq!(list_projects(&db, None).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_project_unknown_category_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_category(&db, "BOOKS").await?;

        let result = create_project(
            &db,
            fields("Library Fund"),
            &[
                AllocationInput::new("BOOKS", Decimal::from(100)),
                AllocationInput::new("MISSING", Decimal::from(100)),
            ],
        )
        .await;
        assert!(matches!(result.unwrap_err(), Error::UnknownCategory { .. }));
        assert!(list_projects(&db, None).await?.is_empty());
        assert_eq!(Allocation::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_project_keeps_allocations_with_history() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(
            &db,
            "Library Fund",
            &[("BOOKS", 10_000), ("EQUIPMENT", 2_000)],
        )
        .await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        let books_row = find_allocation(&db, project.id, books).await?.unwrap();
        record_test_expense(&db, project.id, books, 300).await?;
        create_test_category(&db, "TRAVEL").await?;

        // BOOKS has history, EQUIPMENT does not and is dropped from the list
        update_project(
            &db,
            project.id,
            fields("Library Fund"),
            Some(&[
                AllocationInput::new("BOOKS", Decimal::from(12_000)),
                AllocationInput::new("TRAVEL", Decimal::from(500)),
            ]),
        )
        .await?;

        let allocations = get_project_allocations(&db, project.id).await?;
        let keys: Vec<&str> = allocations.iter().map(|a| a.category.key.as_str()).collect();
        assert_eq!(keys, vec!["BOOKS", "TRAVEL"]);

        // BOOKS row updated in place, not recreated
        let books_after = find_allocation(&db, project.id, books).await?.unwrap();
        assert_eq!(books_after.id, books_row.id);
        assert_eq!(books_after.amount_minor, 1_200_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_project_keeps_history_rows_left_out_of_list() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_expense(&db, project.id, books, 300).await?;
        create_test_category(&db, "TRAVEL").await?;

        update_project(
            &db,
            project.id,
            fields("Library Fund"),
            Some(&[AllocationInput::new("TRAVEL", Decimal::from(500))]),
        )
        .await?;

        let books_row = find_allocation(&db, project.id, books).await?.unwrap();
        assert_eq!(books_row.amount_minor, 1_000_000);
        assert_eq!(get_project_allocations(&db, project.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_project_name_collision() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_project(&db, "Library Fund", &[]).await?;
        create_test_project(&db, "Sports Day", &[]).await?;

        // Renaming onto itself with different case is fine
        let renamed = update_project(&db, first.id, fields("LIBRARY FUND"), None).await?;
        assert_eq!(renamed.name, "LIBRARY FUND");

        let result = update_project(&db, first.id, fields("sports day"), None).await;
        assert!(matches!(result.unwrap_err(), Error::DuplicateName { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_project_status_only() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[]).await?;

        let updated = update_project_status(&db, project.id, "suspended").await?;
        assert_eq!(updated.status, ProjectStatus::Suspended);
        assert_eq!(
            list_projects(&db, Some(ProjectStatus::Suspended)).await?.len(),
            1
        );
        assert!(list_projects(&db, Some(ProjectStatus::Active)).await?.is_empty());

        let result = update_project_status(&db, project.id, "archived").await;
        assert!(matches!(result.unwrap_err(), Error::InvalidStatus { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_project_without_transactions() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;

        delete_project(&db, project.id).await?;
        assert!(get_project_by_id(&db, project.id).await?.is_none());
        assert_eq!(Allocation::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_project_with_transactions() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_expense(&db, project.id, books, 300).await?;
        record_test_expense(&db, project.id, books, 200).await?;

        let result = delete_project(&db, project.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::HasTransactions { count: 2, .. }
        ));
        assert!(get_project_by_id(&db, project.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_allocation_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[]).await?;
        let books = create_test_category(&db, "BOOKS").await?;

        let first = ensure_allocation(&db, project.id, books.id).await?;
        let second = ensure_allocation(&db, project.id, books.id).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.amount_minor, 0);
        Ok(())
    }
}
