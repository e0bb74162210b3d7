//! Transaction entity - One immutable ledger entry against a (project, category) sub-ledger.
//!
//! Each entry has a `kind` (`income`, `expense`, `transfer_in`, `transfer_out`), an occurrence
//! date, a description and an optional reference number. Transfer entries additionally point at
//! the other side of the transfer through the `counterpart_*` columns.
//!
//! Amounts follow the stored sign convention of the ledger: `income`, `expense` and
//! `transfer_in` are positive, `transfer_out` is negative. [`LedgerKind::balance_weight`] turns
//! that convention into a single uniform fold.
use crate::errors::Error;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Kind of ledger entry
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Money received into the sub-ledger
    #[sea_orm(string_value = "income")]
    Income,
    /// Money spent from the sub-ledger (stored positive, subtracted in balances)
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Incoming half of a transfer
    #[sea_orm(string_value = "transfer_in")]
    TransferIn,
    /// Outgoing half of a transfer (stored negative)
    #[sea_orm(string_value = "transfer_out")]
    TransferOut,
}

impl LedgerKind {
    /// All four kinds, in the order they appear in summaries.
    pub const ALL: [Self; 4] = [
        Self::Income,
        Self::Expense,
        Self::TransferIn,
        Self::TransferOut,
    ];

    /// Multiplier applied to a stored amount when folding it into a balance.
    ///
    /// `transfer_out` rows are already negative, so only `expense` flips sign.
    #[must_use]
    pub const fn balance_weight(self) -> i64 {
        match self {
            Self::Expense => -1,
            Self::Income | Self::TransferIn | Self::TransferOut => 1,
        }
    }

    /// Whether the entry belongs to a transfer pair.
    #[must_use]
    pub const fn is_transfer(self) -> bool {
        matches!(self, Self::TransferIn | Self::TransferOut)
    }

    /// The kind of the matching row on the other side of a transfer.
    #[must_use]
    pub const fn counterpart(self) -> Option<Self> {
        match self {
            Self::TransferIn => Some(Self::TransferOut),
            Self::TransferOut => Some(Self::TransferIn),
            Self::Income | Self::Expense => None,
        }
    }

    /// Stable lowercase name, identical to the stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidKind {
                kind: s.to_string(),
                reason: "expected one of income, expense, transfer_in, transfer_out".to_string(),
            })
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the entry, also its creation order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Project this entry belongs to
    pub project_id: i64,
    /// Category this entry belongs to
    pub category_id: i64,
    /// Amount in minor units, signed per the ledger sign convention
    pub amount_minor: i64,
    /// Entry kind
    pub kind: LedgerKind,
    /// Date the money moved
    pub occurred_on: Date,
    /// Human-readable description
    pub description: String,
    /// Optional external reference number (receipt, voucher)
    pub reference: Option<String>,
    /// Project on the other side of a transfer
    pub counterpart_project_id: Option<i64>,
    /// Category on the other side of a transfer
    pub counterpart_category_id: Option<i64>,
    /// The matched row of a transfer pair
    pub counterpart_entry_id: Option<i64>,
    /// When the entry was written
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Contribution of this entry to its sub-ledger balance, in minor units.
    #[must_use]
    pub fn balance_effect(&self) -> i128 {
        i128::from(self.kind.balance_weight()) * i128::from(self.amount_minor)
    }
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one project
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
    /// Each entry belongs to one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
