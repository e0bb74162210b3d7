//! Allocation entity - The opening balance of one (project, category) sub-ledger.
//!
//! Allocations record what was originally budgeted. Transfers never edit them; everything that
//! happens afterwards lives in the `transactions` table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Allocation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "allocations")]
pub struct Model {
    /// Unique identifier for the allocation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Budget category
    pub category_id: i64,
    /// Budgeted amount in minor units (hundredths), never negative
    pub amount_minor: i64,
}

/// Defines relationships between Allocation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each allocation belongs to one project and goes away with it
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
    /// Each allocation is for one category
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
