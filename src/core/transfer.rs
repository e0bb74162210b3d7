//! Transfer coordinator - Moves unused budget between sub-ledgers as a matched entry pair.
//!
//! A transfer runs through validate, check balance, ensure the destination allocation and write
//! the double entry, all inside one database transaction. The transaction first issues a write
//! against the source allocation row, so two transfers draining the same source serialize on
//! that lock and the second one sees the first one's entries when it checks the balance. Any
//! failure before commit drops the transaction and leaves no entries behind.

use crate::{
    core::{balance, category, money, project},
    entities::{Allocation, LedgerKind, allocation, category as category_entity, transaction},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument, warn};

/// One side of a transfer: a project and a category key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubLedger {
    pub project_id: i64,
    pub category_key: String,
}

impl SubLedger {
    /// Convenience constructor.
    pub fn new(project_id: i64, category_key: impl Into<String>) -> Self {
        Self {
            project_id,
            category_key: category_key.into(),
        }
    }
}

/// A request to move `amount` from one sub-ledger to another.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: SubLedger,
    pub to: SubLedger,
    /// Must be greater than zero
    pub amount: Decimal,
    pub occurred_on: NaiveDate,
    /// Free text appended to both entry descriptions
    pub note: Option<String>,
}

/// The committed entry pair and the balances right after the transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// `transfer_out` row on the source, stored negative
    pub outgoing: transaction::Model,
    /// `transfer_in` row on the destination
    pub incoming: transaction::Model,
    pub source_balance: Decimal,
    pub destination_balance: Decimal,
}

/// Resolved rows for both sides of a transfer, ready to be written.
#[derive(Debug, Clone)]
pub(crate) struct DoubleEntry {
    pub source_project_id: i64,
    pub source_category_id: i64,
    pub destination_project_id: i64,
    pub destination_category_id: i64,
    pub amount_minor: i64,
    pub occurred_on: NaiveDate,
    pub outgoing_description: String,
    pub incoming_description: String,
}

fn describe(
    direction: &str,
    source: &category_entity::Model,
    destination: &category_entity::Model,
    note: Option<&str>,
) -> String {
    let base = format!("{direction} ({} → {})", source.name, destination.name);
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{base}: {note}"),
        None => base,
    }
}

/// Takes a write lock on the source allocation row for the rest of the transaction.
///
/// The update leaves the amount unchanged. When the source has no allocation row yet, one of zero
/// is inserted instead, which takes the same lock.
async fn lock_source<C>(db: &C, project_id: i64, category_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Allocation::update_many()
        .col_expr(
            allocation::Column::AmountMinor,
            Expr::col(allocation::Column::AmountMinor).add(0),
        )
        .filter(allocation::Column::ProjectId.eq(project_id))
        .filter(allocation::Column::CategoryId.eq(category_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        project::ensure_allocation(db, project_id, category_id).await?;
    }
    debug!("Locked source project {} category {}", project_id, category_id);
    Ok(())
}

/// Writes the `transfer_out` and `transfer_in` rows and links them to each other.
///
/// Must run inside the caller's transaction; an error part way leaves the rollback to the caller.
pub(crate) async fn write_double_entry<C>(
    db: &C,
    entry: &DoubleEntry,
) -> Result<(transaction::Model, transaction::Model)>
where
    C: ConnectionTrait,
{
    let now = Utc::now();

    let outgoing = transaction::ActiveModel {
        project_id: Set(entry.source_project_id),
        category_id: Set(entry.source_category_id),
        amount_minor: Set(-entry.amount_minor),
        kind: Set(LedgerKind::TransferOut),
        occurred_on: Set(entry.occurred_on),
        description: Set(entry.outgoing_description.clone()),
        reference: Set(None),
        counterpart_project_id: Set(Some(entry.destination_project_id)),
        counterpart_category_id: Set(Some(entry.destination_category_id)),
        counterpart_entry_id: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let incoming = transaction::ActiveModel {
        project_id: Set(entry.destination_project_id),
        category_id: Set(entry.destination_category_id),
        amount_minor: Set(entry.amount_minor),
        kind: Set(LedgerKind::TransferIn),
        occurred_on: Set(entry.occurred_on),
        description: Set(entry.incoming_description.clone()),
        reference: Set(None),
        counterpart_project_id: Set(Some(entry.source_project_id)),
        counterpart_category_id: Set(Some(entry.source_category_id)),
        counterpart_entry_id: Set(Some(outgoing.id)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let mut link: transaction::ActiveModel = outgoing.into();
    link.counterpart_entry_id = Set(Some(incoming.id));
    let outgoing = link.update(db).await?;

    Ok((outgoing, incoming))
}

/// Moves budget from one (project, category) to another.
///
/// Same-project transfers between categories and transfers between projects are both allowed.
/// The destination gets a zero allocation row if it has none, so the category shows up for that
/// project.
///
/// Moving money from a sub-ledger to that same sub-ledger would write a pair of rows with no net
/// effect, so it is refused with `Error::SelfTransfer` instead. Only the exact same project and
/// category pair is refused.
///
/// # Errors
/// Returns an error if:
/// - The amount is not greater than zero (`Error::InvalidAmount`)
/// - A project or category does not resolve (`Error::UnknownProject`, `Error::UnknownCategory`)
/// - Source and destination are the same sub-ledger (`Error::SelfTransfer`)
/// - The source balance is below the amount (`Error::InsufficientBalance`)
/// - Storage fails (`Error::Storage`); nothing is written in that case
#[instrument(skip(db, request), fields(
    from_project = request.from.project_id,
    from_category = %request.from.category_key,
    to_project = request.to.project_id,
    to_category = %request.to.category_key,
    amount = %request.amount
))]
pub async fn transfer(db: &DatabaseConnection, request: TransferRequest) -> Result<TransferReceipt> {
    // Validate
    let amount_minor = money::positive_minor("transfer amount", request.amount)?;

    let txn = db.begin().await?;

    project::require_project(&txn, request.from.project_id).await?;
    project::require_project(&txn, request.to.project_id).await?;
    let source = category::resolve_active_category(&txn, &request.from.category_key).await?;
    let destination = category::resolve_active_category(&txn, &request.to.category_key).await?;
    if request.from.project_id == request.to.project_id && source.id == destination.id {
        return Err(Error::SelfTransfer {
            project_id: request.from.project_id,
            category: source.key,
        });
    }

    // Check balance under the source lock
    lock_source(&txn, request.from.project_id, source.id).await?;
    let available = balance::sub_ledger_balance(&txn, request.from.project_id, source.id).await?;
    if available < i128::from(amount_minor) {
        let available = money::from_total("available balance", available)?;
        warn!(
            "Rejected transfer: {} available, {} requested",
            available,
            money::from_minor(amount_minor)
        );
        return Err(Error::InsufficientBalance {
            available,
            requested: money::from_minor(amount_minor),
        });
    }

    // Ensure the destination is visible for its project
    project::ensure_allocation(&txn, request.to.project_id, destination.id).await?;

    let note = request.note.as_deref();
    let entry = DoubleEntry {
        source_project_id: request.from.project_id,
        source_category_id: source.id,
        destination_project_id: request.to.project_id,
        destination_category_id: destination.id,
        amount_minor,
        occurred_on: request.occurred_on,
        outgoing_description: describe("Transfer out", &source, &destination, note),
        incoming_description: describe("Transfer in", &source, &destination, note),
    };
    let (outgoing, incoming) = write_double_entry(&txn, &entry).await?;

    let destination_balance =
        balance::sub_ledger_balance(&txn, request.to.project_id, destination.id).await?;

    txn.commit().await?;
    info!(
        "Transferred {} from {}/{} to {}/{} (entries {} and {})",
        money::from_minor(amount_minor),
        request.from.project_id,
        source.key,
        request.to.project_id,
        destination.key,
        outgoing.id,
        incoming.id
    );

    Ok(TransferReceipt {
        outgoing,
        incoming,
        source_balance: money::from_total("source balance", available - i128::from(amount_minor))?,
        destination_balance: money::from_total("destination balance", destination_balance)?,
    })
}
