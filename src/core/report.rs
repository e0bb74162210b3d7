//! Report generation business logic.
//!
//! This module provides portfolio, ledger and transfer summaries built from the ledger tables.
//! All functions are framework-agnostic and return structured data that a presentation layer
//! can format; [`format_portfolio_summary`] is the one plain-text rendering, used for startup
//! logging.

use crate::{
    core::{
        ledger::{LedgerFilter, list_entries},
        money,
    },
    entities::{Allocation, LedgerKind, Project, ProjectStatus, Transaction, project, transaction},
    errors::Result,
};
use rust_decimal::Decimal;
use sea_orm::{Condition, QueryOrder, prelude::*};
use std::collections::HashMap;

/// Counts of projects by status plus the total budget allocated to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfolioSummary {
    pub total_projects: u64,
    pub active: u64,
    pub completed: u64,
    pub suspended: u64,
    /// Sum of every allocation row across all projects
    pub total_allocation: Decimal,
}

/// Totals over the entries matching a ledger filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub entries: u64,
    pub income: Decimal,
    pub expense: Decimal,
    pub transfers_in: Decimal,
    /// Total moved out, as a positive amount
    pub transfers_out: Decimal,
}

/// One transfer as seen from its outgoing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub outgoing: transaction::Model,
    /// `None` when the pair has been broken
    pub incoming: Option<transaction::Model>,
    pub from_project: String,
    pub to_project: String,
    pub amount: Decimal,
}

/// Summarizes the project portfolio.
pub async fn portfolio_summary<C>(db: &C) -> Result<PortfolioSummary>
where
    C: ConnectionTrait,
{
    let mut summary = PortfolioSummary::default();
    for project in Project::find().all(db).await? {
        summary.total_projects += 1;
        match project.status {
            ProjectStatus::Active => summary.active += 1,
            ProjectStatus::Completed => summary.completed += 1,
            ProjectStatus::Suspended => summary.suspended += 1,
        }
    }

    let allocated: i128 = Allocation::find()
        .all(db)
        .await?
        .iter()
        .map(|row| i128::from(row.amount_minor))
        .sum();
    summary.total_allocation = money::from_total("total allocation", allocated)?;
    Ok(summary)
}

/// Summarizes the entries matching a filter.
pub async fn ledger_summary<C>(db: &C, filter: LedgerFilter) -> Result<LedgerSummary>
where
    C: ConnectionTrait,
{
    let entries = list_entries(filter).fetch(db).await?;

    let mut totals: HashMap<LedgerKind, i128> = HashMap::new();
    for entry in &entries {
        *totals.entry(entry.kind).or_default() += i128::from(entry.amount_minor).abs();
    }
    let total = |kind: LedgerKind| {
        money::from_total("ledger total", totals.get(&kind).copied().unwrap_or(0))
    };

    Ok(LedgerSummary {
        entries: entries.len() as u64,
        income: total(LedgerKind::Income)?,
        expense: total(LedgerKind::Expense)?,
        transfers_in: total(LedgerKind::TransferIn)?,
        transfers_out: total(LedgerKind::TransferOut)?,
    })
}

/// Lists transfers newest first, optionally only those touching one project on either side.
pub async fn transfer_history<C>(db: &C, project_id: Option<i64>) -> Result<Vec<TransferRecord>>
where
    C: ConnectionTrait,
{
    let mut query = Transaction::find().filter(transaction::Column::Kind.eq(LedgerKind::TransferOut));
    if let Some(project_id) = project_id {
        query = query.filter(
            Condition::any()
                .add(transaction::Column::ProjectId.eq(project_id))
                .add(transaction::Column::CounterpartProjectId.eq(project_id)),
        );
    }
    let outgoing_rows = query
        .order_by_desc(transaction::Column::OccurredOn)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await?;

    let incoming_ids: Vec<i64> = outgoing_rows
        .iter()
        .filter_map(|row| row.counterpart_entry_id)
        .collect();
    let mut incoming: HashMap<i64, transaction::Model> = Transaction::find()
        .filter(transaction::Column::Id.is_in(incoming_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.id, row))
        .collect();

    let names: HashMap<i64, String> = Project::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p: project::Model| (p.id, p.name))
        .collect();
    let name_of = |id: Option<i64>| {
        id.and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| "(deleted project)".to_string())
    };

    Ok(outgoing_rows
        .into_iter()
        .map(|outgoing| TransferRecord {
            incoming: outgoing
                .counterpart_entry_id
                .and_then(|id| incoming.remove(&id)),
            from_project: name_of(Some(outgoing.project_id)),
            to_project: name_of(outgoing.counterpart_project_id),
            amount: money::from_minor(outgoing.amount_minor.abs()),
            outgoing,
        })
        .collect())
}

/// Formats a portfolio summary into a human-readable line.
#[must_use]
pub fn format_portfolio_summary(summary: &PortfolioSummary) -> String {
    format!(
        "{} project(s): {} active, {} completed, {} suspended; {} allocated in total",
        summary.total_projects,
        summary.active,
        summary.completed,
        summary.suspended,
        summary.total_allocation
    )
}
