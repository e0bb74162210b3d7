//! Unified error type for the ledger core.
//!
//! Every rejection carries the offending field and enough context to render a specific
//! message. Validation failures are raised before any write; only [`Error::Storage`] is worth
//! retrying, because a failed multi-row write always rolls back to a clean state.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Category key '{key}' already exists")]
    DuplicateKey { key: String },

    #[error("Project name '{name}' is already used by another project")]
    DuplicateName { name: String },

    #[error("Project window is invalid: end date {end} is before start date {start}")]
    InvalidWindow {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Invalid allocation for category '{category}': {reason}")]
    InvalidAllocation { category: String, reason: String },

    #[error(
        "Category '{key}' is still referenced by {allocations} allocation(s) and {transactions} transaction(s)"
    )]
    InUse {
        key: String,
        allocations: u64,
        transactions: u64,
    },

    #[error("Project {project_id} has {count} ledger entries and cannot be deleted")]
    HasTransactions { project_id: i64, count: u64 },

    #[error("Project not found: {reference}")]
    UnknownProject { reference: String },

    #[error("Category not found: {reference}")]
    UnknownCategory { reference: String },

    #[error("Ledger entry not found: {id}")]
    UnknownEntry { id: i64 },

    #[error("Invalid entry kind '{kind}': {reason}")]
    InvalidKind { kind: String, reason: String },

    #[error("Invalid project status '{status}'")]
    InvalidStatus { status: String },

    #[error("Invalid category key '{key}': {reason}")]
    InvalidCategoryKey { key: String, reason: String },

    #[error("Invalid {field}: {amount}")]
    InvalidAmount { field: &'static str, amount: Decimal },

    #[error("Total {field} exceeds the representable range")]
    AmountOverflow { field: &'static str },

    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Cannot transfer from a sub-ledger to itself (project {project_id}, category '{category}')")]
    SelfTransfer { project_id: i64, category: String },

    #[error("Storage failure: {0}")]
    Storage(#[from] sea_orm::DbErr),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Whether the caller may retry the operation as-is.
    ///
    /// Only storage-layer failures qualify; business rejections would reproduce the same result.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// The input field a rejection refers to, for form-level error rendering.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateKey { .. } | Self::InvalidCategoryKey { .. } => Some("key"),
            Self::DuplicateName { .. } => Some("name"),
            Self::InvalidWindow { .. } => Some("end_date"),
            Self::InvalidAllocation { .. } => Some("allocations"),
            Self::InUse { .. } | Self::UnknownCategory { .. } => Some("category"),
            Self::HasTransactions { .. } | Self::UnknownProject { .. } => Some("project"),
            Self::UnknownEntry { .. } => Some("entry"),
            Self::InvalidKind { .. } => Some("kind"),
            Self::InvalidStatus { .. } => Some("status"),
            Self::InvalidAmount { field, .. } | Self::AmountOverflow { field } => Some(*field),
            Self::InsufficientBalance { .. } => Some("amount"),
            Self::SelfTransfer { .. } => Some("destination"),
            Self::Storage(_) | Self::Config { .. } | Self::Io(_) | Self::EnvVar(_) => None,
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
