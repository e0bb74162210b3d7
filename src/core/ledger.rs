//! Ledger business logic - Handles individual ledger entries.
//!
//! Regular entries (`income`, `expense`) are recorded, replaced and deleted one row at a time.
//! Transfer entries are only ever written in pairs by [`crate::core::transfer`]; deleting either
//! half removes the other half in the same database transaction.

use crate::{
    core::{category, money, project},
    entities::{Category, LedgerKind, Transaction, category as category_entity, transaction},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    JoinType, PaginatorTrait, QueryOrder, QuerySelect, RelationTrait, Select, Set, TransactionTrait,
    prelude::*,
};
use tracing::{debug, info, instrument, warn};

/// Fields of a regular ledger entry as submitted for record or update.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub project_id: i64,
    pub category_id: i64,
    /// Unsigned amount, must be greater than zero
    pub amount: Decimal,
    /// `income` or `expense`
    pub kind: String,
    pub occurred_on: NaiveDate,
    pub description: String,
    /// Receipt or voucher number
    pub reference: Option<String>,
}

/// Outcome of [`delete_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    /// Number of rows removed: 1 for a regular entry, 2 for a clean transfer pair
    pub removed: u64,
    /// Set when a transfer row was removed without finding its counterpart
    pub note: Option<String>,
}

/// Parses a kind for the regular write paths, rejecting transfer kinds.
fn regular_kind(kind: &str) -> Result<LedgerKind> {
    let parsed: LedgerKind = kind.parse()?;
    if parsed.is_transfer() {
        return Err(Error::InvalidKind {
            kind: kind.to_string(),
            reason: "transfer entries can only be written by a transfer".to_string(),
        });
    }
    Ok(parsed)
}

/// Validates an entry and resolves its references, returning the parsed kind and minor amount.
async fn validate_entry<C>(db: &C, entry: &NewEntry) -> Result<(LedgerKind, i64)>
where
    C: ConnectionTrait,
{
    let kind = regular_kind(&entry.kind)?;
    let amount_minor = money::positive_minor("amount", entry.amount)?;
    project::require_project(db, entry.project_id).await?;
    category::require_active_category(db, entry.category_id).await?;
    Ok((kind, amount_minor))
}

/// Records a regular income or expense entry.
///
/// The amount is stored unsigned; `expense` is subtracted when balances are folded.
///
/// `transfer_in` and `transfer_out` are valid kinds but are refused here: transfer rows are
/// only written in linked pairs by [`crate::core::transfer::transfer`], so a lone transfer row
/// can never unbalance the system. The rejection uses `Error::InvalidKind` with a reason that
/// says so; unparseable kinds get the same variant with a different reason.
///
/// # Errors
/// Returns an error if:
/// - The kind is not `income` or `expense` (`Error::InvalidKind`)
/// - The amount is not greater than zero (`Error::InvalidAmount`)
/// - The project or category does not resolve (`Error::UnknownProject`, `Error::UnknownCategory`)
#[instrument(skip(db, entry), fields(project_id = entry.project_id, kind = %entry.kind))]
pub async fn record_entry(db: &DatabaseConnection, entry: NewEntry) -> Result<transaction::Model> {
    let (kind, amount_minor) = validate_entry(db, &entry).await?;

    let model = transaction::ActiveModel {
        project_id: Set(entry.project_id),
        category_id: Set(entry.category_id),
        amount_minor: Set(amount_minor),
        kind: Set(kind),
        occurred_on: Set(entry.occurred_on),
        description: Set(entry.description),
        reference: Set(entry.reference),
        counterpart_project_id: Set(None),
        counterpart_category_id: Set(None),
        counterpart_entry_id: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let created = model.insert(db).await?;
    info!(
        "Recorded {} entry {} of {} on project {}",
        created.kind,
        created.id,
        money::from_minor(created.amount_minor),
        created.project_id
    );
    Ok(created)
}

/// Retrieves a specific entry by its unique ID.
pub async fn get_entry<C>(db: &C, entry_id: i64) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(entry_id)
        .one(db)
        .await
        .map_err(Into::into)
}

async fn require_entry<C>(db: &C, entry_id: i64) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    get_entry(db, entry_id)
        .await?
        .ok_or(Error::UnknownEntry { id: entry_id })
}

/// Replaces every field of a regular entry. Only the row itself changes.
///
/// # Errors
/// Returns `Error::InvalidKind` when the stored entry or the new kind is a transfer kind, since a
/// transfer half cannot be edited without breaking its pair. Otherwise the same rules as
/// [`record_entry`] apply.
#[instrument(skip(db, entry))]
pub async fn update_entry(
    db: &DatabaseConnection,
    entry_id: i64,
    entry: NewEntry,
) -> Result<transaction::Model> {
    let existing = require_entry(db, entry_id).await?;
    if existing.kind.is_transfer() {
        return Err(Error::InvalidKind {
            kind: existing.kind.to_string(),
            reason: "transfer entries cannot be edited, delete the transfer instead".to_string(),
        });
    }
    let (kind, amount_minor) = validate_entry(db, &entry).await?;

    let mut active_model: transaction::ActiveModel = existing.into();
    active_model.project_id = Set(entry.project_id);
    active_model.category_id = Set(entry.category_id);
    active_model.amount_minor = Set(amount_minor);
    active_model.kind = Set(kind);
    active_model.occurred_on = Set(entry.occurred_on);
    active_model.description = Set(entry.description);
    active_model.reference = Set(entry.reference);

    let updated = active_model.update(db).await?;
    info!("Updated ledger entry {}", updated.id);
    Ok(updated)
}

/// Finds the other half of a transfer row.
///
/// The explicit link is used when present. Rows without a link fall back to matching on the
/// opposite kind, swapped project/category, equal absolute amount and equal date.
async fn find_counterpart<C>(db: &C, entry: &transaction::Model) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    if let Some(linked_id) = entry.counterpart_entry_id {
        if let Some(linked) = get_entry(db, linked_id).await? {
            return Ok(Some(linked));
        }
        debug!(
            "Linked counterpart {} of entry {} is gone, matching by attributes",
            linked_id, entry.id
        );
    }

    let (Some(kind), Some(project_id), Some(category_id)) = (
        entry.kind.counterpart(),
        entry.counterpart_project_id,
        entry.counterpart_category_id,
    ) else {
        return Ok(None);
    };

    Transaction::find()
        .filter(transaction::Column::Kind.eq(kind))
        .filter(transaction::Column::ProjectId.eq(project_id))
        .filter(transaction::Column::CategoryId.eq(category_id))
        .filter(transaction::Column::CounterpartProjectId.eq(entry.project_id))
        .filter(transaction::Column::CounterpartCategoryId.eq(entry.category_id))
        .filter(transaction::Column::AmountMinor.eq(-entry.amount_minor))
        .filter(transaction::Column::OccurredOn.eq(entry.occurred_on))
        .filter(transaction::Column::Id.ne(entry.id))
        .order_by_asc(transaction::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Deletes an entry. A transfer row takes its counterpart with it in the same transaction.
///
/// A transfer row whose counterpart cannot be found is still deleted; the report then says
/// one row was removed and carries a note.
#[instrument(skip(db))]
pub async fn delete_entry(db: &DatabaseConnection, entry_id: i64) -> Result<DeletionReport> {
    let txn = db.begin().await?;

    let entry = require_entry(&txn, entry_id).await?;
    if !entry.kind.is_transfer() {
        entry.delete(&txn).await?;
        txn.commit().await?;
        info!("Deleted ledger entry {}", entry_id);
        return Ok(DeletionReport {
            removed: 1,
            note: None,
        });
    }

    let counterpart = find_counterpart(&txn, &entry).await?;
    let mut ids = vec![entry.id];
    if let Some(counterpart) = &counterpart {
        ids.push(counterpart.id);
    }
    let result = Transaction::delete_many()
        .filter(transaction::Column::Id.is_in(ids))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    let note = if counterpart.is_none() {
        warn!(
            "Transfer entry {} had no matching counterpart; removed it alone",
            entry_id
        );
        Some(format!(
            "Counterpart of {} entry {} was not found; only this row was removed",
            entry.kind, entry_id
        ))
    } else {
        info!("Deleted transfer pair containing entry {}", entry_id);
        None
    };

    Ok(DeletionReport {
        removed: result.rows_affected,
        note,
    })
}

/// Filters for [`list_entries`]. Every field is optional; an empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub project_id: Option<i64>,
    pub category_key: Option<String>,
    pub kind: Option<LedgerKind>,
    /// Inclusive lower bound on the occurrence date
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the occurrence date
    pub date_to: Option<NaiveDate>,
}

/// A prepared, re-runnable ledger listing. Nothing is read until [`LedgerQuery::fetch`] or
/// [`LedgerQuery::count`] is awaited, and each call reads the current state afresh.
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    filter: LedgerFilter,
}

impl LedgerQuery {
    fn select(&self) -> Select<Transaction> {
        let filter = &self.filter;
        let mut query = Transaction::find();

        if let Some(project_id) = filter.project_id {
            query = query.filter(transaction::Column::ProjectId.eq(project_id));
        }
        if let Some(key) = &filter.category_key {
            query = query
                .join(JoinType::InnerJoin, transaction::Relation::Category.def())
                .filter(category_entity::Column::Key.eq(key.as_str()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(transaction::Column::Kind.eq(kind));
        }
        if let Some(from) = filter.date_from {
            query = query.filter(transaction::Column::OccurredOn.gte(from));
        }
        if let Some(to) = filter.date_to {
            query = query.filter(transaction::Column::OccurredOn.lte(to));
        }
        query
    }

    /// Runs the query, newest occurrence first and most recently written first within a day.
    pub async fn fetch<C>(&self, db: &C) -> Result<Vec<transaction::Model>>
    where
        C: ConnectionTrait,
    {
        self.select()
            .order_by_desc(transaction::Column::OccurredOn)
            .order_by_desc(transaction::Column::Id)
            .all(db)
            .await
            .map_err(Into::into)
    }

    /// Counts the matching entries.
    pub async fn count<C>(&self, db: &C) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        self.select().count(db).await.map_err(Into::into)
    }
}

/// Prepares a ledger listing for the given filter.
#[must_use]
pub const fn list_entries(filter: LedgerFilter) -> LedgerQuery {
    LedgerQuery { filter }
}

/// Loads the category rows referenced by a set of entries, for rendering names.
pub async fn categories_for<C>(
    db: &C,
    entries: &[transaction::Model],
) -> Result<Vec<category_entity::Model>>
where
    C: ConnectionTrait,
{
    let mut ids: Vec<i64> = entries
        .iter()
        .flat_map(|e| std::iter::once(e.category_id).chain(e.counterpart_category_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    Category::find()
        .filter(category_entity::Column::Id.is_in(ids))
        .all(db)
        .await
        .map_err(Into::into)
}
