//! Category entity - A budget kind usable across all projects.
//!
//! Categories are referenced by their immutable uppercase key. They are never hard-deleted;
//! deactivation flips `is_active` so historical rows keep resolving.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier for the category
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Immutable key in uppercase identifier form (e.g. `"BOOKS"`, `"SUBSIDY"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Display name shown to users
    pub name: String,
    /// Optional longer description
    pub description: Option<String>,
    /// Soft delete flag - inactive categories cannot receive new allocations or entries
    pub is_active: bool,
    /// When the category was created
    pub created_at: DateTimeUtc,
    /// When the category was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Category and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One category is allocated in many projects
    #[sea_orm(has_many = "super::allocation::Entity")]
    Allocations,
    /// One category has many ledger entries
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
