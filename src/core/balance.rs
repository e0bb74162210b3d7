//! Balance queries - Derives sub-ledger and project balances from allocations and entries.
//!
//! Nothing here is persisted. A sub-ledger balance is its allocation plus the weighted sum of
//! its entries (see [`LedgerKind::balance_weight`]). Every function is a pure read and the
//! generic variants run on any connection, including an open transaction.

use crate::{
    core::{category, money, project},
    entities::{
        Allocation, Category, LedgerKind, Transaction, allocation, category as category_entity,
        transaction,
    },
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{TransactionTrait, prelude::*};
use std::collections::BTreeMap;

/// Whole-project balance figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBalance {
    pub allocation_total: Decimal,
    pub income: Decimal,
    pub expense: Decimal,
    /// Transfers in minus transfers out, across all categories
    pub net_transfer: Decimal,
    /// `allocation_total + income + net_transfer - expense`
    pub remaining: Decimal,
}

/// One category line of a project breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLine {
    pub category: category_entity::Model,
    pub allocation: Decimal,
    pub income: Decimal,
    pub expense: Decimal,
    pub transfers_in: Decimal,
    /// Total moved out, as a positive amount
    pub transfers_out: Decimal,
    pub balance: Decimal,
}

/// Per-kind totals in minor units, all unsigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KindTotals {
    income: i128,
    expense: i128,
    transfers_in: i128,
    transfers_out: i128,
}

impl KindTotals {
    fn add(&mut self, entry: &transaction::Model) {
        let magnitude = i128::from(entry.amount_minor).abs();
        match entry.kind {
            LedgerKind::Income => self.income += magnitude,
            LedgerKind::Expense => self.expense += magnitude,
            LedgerKind::TransferIn => self.transfers_in += magnitude,
            LedgerKind::TransferOut => self.transfers_out += magnitude,
        }
    }

    const fn net(&self) -> i128 {
        self.income - self.expense + self.transfers_in - self.transfers_out
    }
}

/// Sum of the allocation rows in minor units.
fn allocation_sum(rows: &[allocation::Model]) -> i128 {
    rows.iter().map(|row| i128::from(row.amount_minor)).sum()
}

/// Balance of one (project, category) sub-ledger in minor units.
///
/// A missing allocation row counts as zero.
pub async fn sub_ledger_balance<C>(db: &C, project_id: i64, category_id: i64) -> Result<i128>
where
    C: ConnectionTrait,
{
    let allocated = project::find_allocation(db, project_id, category_id)
        .await?
        .map_or(0, |row| i128::from(row.amount_minor));

    let entries = Transaction::find()
        .filter(transaction::Column::ProjectId.eq(project_id))
        .filter(transaction::Column::CategoryId.eq(category_id))
        .all(db)
        .await?;

    Ok(allocated + entries.iter().map(transaction::Model::balance_effect).sum::<i128>())
}

/// Balance of a project's category, addressed by category key.
///
/// Allocation and entries are read inside one database transaction so the result is a single
/// consistent snapshot. Deactivated categories still resolve here so history stays readable.
///
/// # Errors
/// Returns `Error::UnknownProject` or `Error::UnknownCategory` if either reference is missing.
pub async fn category_balance(
    db: &DatabaseConnection,
    project_id: i64,
    category_key: &str,
) -> Result<Decimal> {
    let txn = db.begin().await?;

    project::require_project(&txn, project_id).await?;
    let category = category::get_category_by_key(&txn, category_key)
        .await?
        .ok_or_else(|| Error::UnknownCategory {
            reference: category_key.to_string(),
        })?;
    let balance = sub_ledger_balance(&txn, project_id, category.id).await?;

    txn.commit().await?;
    money::from_total("balance", balance)
}

/// Aggregate balance of a whole project.
pub async fn project_balance<C>(db: &C, project_id: i64) -> Result<ProjectBalance>
where
    C: ConnectionTrait,
{
    project::require_project(db, project_id).await?;

    let allocation_total = allocation_sum(
        &Allocation::find()
            .filter(allocation::Column::ProjectId.eq(project_id))
            .all(db)
            .await?,
    );

    let mut totals = KindTotals::default();
    for entry in Transaction::find()
        .filter(transaction::Column::ProjectId.eq(project_id))
        .all(db)
        .await?
    {
        totals.add(&entry);
    }

    let net_transfer = totals.transfers_in - totals.transfers_out;
    Ok(ProjectBalance {
        allocation_total: money::from_total("allocation total", allocation_total)?,
        income: money::from_total("income", totals.income)?,
        expense: money::from_total("expense", totals.expense)?,
        net_transfer: money::from_total("net transfer", net_transfer)?,
        remaining: money::from_total("remaining", allocation_total + totals.net())?,
    })
}

/// Per-category lines of a project, ordered by category key.
///
/// Every category with an allocation row or at least one entry in the project is listed.
pub async fn category_breakdown<C>(db: &C, project_id: i64) -> Result<Vec<CategoryLine>>
where
    C: ConnectionTrait,
{
    project::require_project(db, project_id).await?;

    let mut allocated: BTreeMap<i64, i64> = BTreeMap::new();
    for row in Allocation::find()
        .filter(allocation::Column::ProjectId.eq(project_id))
        .all(db)
        .await?
    {
        allocated.insert(row.category_id, row.amount_minor);
    }

    let mut totals: BTreeMap<i64, KindTotals> = BTreeMap::new();
    for entry in Transaction::find()
        .filter(transaction::Column::ProjectId.eq(project_id))
        .all(db)
        .await?
    {
        totals.entry(entry.category_id).or_default().add(&entry);
    }

    let category_ids: Vec<i64> = allocated.keys().chain(totals.keys()).copied().collect();
    let categories = Category::find()
        .filter(category_entity::Column::Id.is_in(category_ids))
        .all(db)
        .await?;

    let mut lines: Vec<CategoryLine> = categories
        .into_iter()
        .map(|category| {
            let allocation = allocated.get(&category.id).copied().unwrap_or(0);
            let kinds = totals.get(&category.id).copied().unwrap_or_default();
            Ok(CategoryLine {
                allocation: money::from_minor(allocation),
                income: money::from_total("income", kinds.income)?,
                expense: money::from_total("expense", kinds.expense)?,
                transfers_in: money::from_total("transfers in", kinds.transfers_in)?,
                transfers_out: money::from_total("transfers out", kinds.transfers_out)?,
                balance: money::from_total("balance", i128::from(allocation) + kinds.net())?,
                category,
            })
        })
        .collect::<Result<_>>()?;
    lines.sort_by(|a, b| a.category.key.cmp(&b.category.key));
    Ok(lines)
}

/// Sum of every sub-ledger balance in the system.
///
/// Transfers never change this figure; only allocations, income and expense do.
pub async fn system_total<C>(db: &C) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    let allocations = allocation_sum(&Allocation::find().all(db).await?);
    let entries: i128 = Transaction::find()
        .all(db)
        .await?
        .iter()
        .map(transaction::Model::balance_effect)
        .sum();
    money::from_total("system total", allocations + entries)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_scenario_a_expense_reduces_balance() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;

        record_test_expense(&db, project.id, books, 3000).await?;

        assert_eq!(
            category_balance(&db, project.id, "BOOKS").await?,
            Decimal::from(7000)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_balance_reads_are_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_income(&db, project.id, books, 250).await?;

        let first = category_balance(&db, project.id, "BOOKS").await?;
        let second = category_balance(&db, project.id, "BOOKS").await?;
        assert_eq!(first, second);
        assert_eq!(first, Decimal::from(10_250));
        Ok(())
    }

    #[tokio::test]
    async fn test_category_balance_unknown_references() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;

        let result = category_balance(&db, 999, "BOOKS").await;
        assert!(matches!(result.unwrap_err(), Error::UnknownProject { .. }));

        let result = category_balance(&db, project.id, "MISSING").await;
        assert!(matches!(result.unwrap_err(), Error::UnknownCategory { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_category_without_allocation_starts_at_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[]).await?;
        create_test_category(&db, "TRAVEL").await?;

        assert_eq!(
            category_balance(&db, project.id, "TRAVEL").await?,
            Decimal::ZERO
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_expenses_may_drive_balance_negative() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 100)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_expense(&db, project.id, books, 150).await?;

        assert_eq!(
            category_balance(&db, project.id, "BOOKS").await?,
            Decimal::from(-50)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_project_balance_and_breakdown() -> Result<()> {
        let db = setup_test_db().await?;
        let library = create_test_project(
            &db,
            "Library Fund",
            &[("BOOKS", 10_000), ("EQUIPMENT", 2_000)],
        )
        .await?;
        let sports = create_test_project(&db, "Sports Day", &[("EQUIPMENT", 1_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;

        record_test_expense(&db, library.id, books, 3000).await?;
        record_test_income(&db, library.id, books, 500).await?;
        // Internal transfer leaves the project total unchanged
        transfer_test_amount(&db, (library.id, "BOOKS"), (library.id, "EQUIPMENT"), 1000).await?;
        // Outgoing transfer to another project lowers it
        transfer_test_amount(&db, (library.id, "EQUIPMENT"), (sports.id, "EQUIPMENT"), 400).await?;

        let balance = project_balance(&db, library.id).await?;
        assert_eq!(
            balance,
            ProjectBalance {
                allocation_total: Decimal::from(12_000),
                income: Decimal::from(500),
                expense: Decimal::from(3000),
                net_transfer: Decimal::from(-400),
                remaining: Decimal::from(9100),
            }
        );

        let lines = category_breakdown(&db, library.id).await?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].category.key, "BOOKS");
        assert_eq!(lines[0].balance, Decimal::from(6500));
        assert_eq!(lines[0].transfers_out, Decimal::from(1000));
        assert_eq!(lines[1].category.key, "EQUIPMENT");
        assert_eq!(lines[1].transfers_in, Decimal::from(1000));
        assert_eq!(lines[1].transfers_out, Decimal::from(400));
        assert_eq!(lines[1].balance, Decimal::from(2600));

        let line_sum: Decimal = lines.iter().map(|l| l.balance).sum();
        assert_eq!(line_sum, balance.remaining);
        Ok(())
    }

    #[tokio::test]
    async fn test_breakdown_lists_categories_with_activity_only_once() -> Result<()> {
        let db = setup_test_db().await?;
        let project = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_expense(&db, project.id, books, 10).await?;
        create_test_category(&db, "TRAVEL").await?;

        let lines = category_breakdown(&db, project.id).await?;
        assert_eq!(lines.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_totals_above_i64_range_do_not_overflow() -> Result<()> {
        let db = setup_test_db().await?;
        // Each allocation alone fits in i64 hundredths; their sum does not
        let huge = 50_000_000_000_000_000;
        let project =
            create_test_project(&db, "Capital Works", &[("BOOKS", huge), ("EQUIPMENT", huge)])
                .await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_income(&db, project.id, books, huge).await?;

        let balance = project_balance(&db, project.id).await?;
        assert_eq!(balance.allocation_total, Decimal::from(2 * huge));
        assert_eq!(balance.remaining, Decimal::from(3 * huge));

        let lines = category_breakdown(&db, project.id).await?;
        assert_eq!(lines[0].balance, Decimal::from(2 * huge));
        assert_eq!(
            category_balance(&db, project.id, "BOOKS").await?,
            Decimal::from(2 * huge)
        );
        assert_eq!(system_total(&db).await?, Decimal::from(3 * huge));
        Ok(())
    }

    #[tokio::test]
    async fn test_system_total_counts_every_project() -> Result<()> {
        let db = setup_test_db().await?;
        let library = create_test_project(&db, "Library Fund", &[("BOOKS", 10_000)]).await?;
        create_test_project(&db, "Sports Day", &[("EQUIPMENT", 1_000)]).await?;
        let books = category::resolve_category_key(&db, "BOOKS").await?;
        record_test_expense(&db, library.id, books, 500).await?;

        assert_eq!(system_total(&db).await?, Decimal::from(10_500));
        Ok(())
    }
}
