//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the four ledger tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod allocation;
pub mod category;
pub mod project;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use allocation::{
    Column as AllocationColumn, Entity as Allocation, Model as AllocationModel,
};
pub use category::{Column as CategoryColumn, Entity as Category, Model as CategoryModel};
pub use project::{
    Column as ProjectColumn, Entity as Project, Model as ProjectModel, ProjectStatus,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, LedgerKind, Model as TransactionModel,
};
