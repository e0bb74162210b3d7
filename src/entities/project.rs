//! Project entity - A time-boxed cost center owning allocations and ledger entries.

use crate::errors::Error;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lifecycle status of a project
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Project is running and accepting entries
    #[sea_orm(string_value = "active")]
    Active,
    /// Project has finished
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Project is on hold
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

impl ProjectStatus {
    /// Stable lowercase name, identical to the stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "suspended" => Ok(Self::Suspended),
            _ => Err(Error::InvalidStatus {
                status: s.to_string(),
            }),
        }
    }
}

/// Project database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Unique identifier for the project
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Project name, unique ignoring case
    #[sea_orm(unique)]
    pub name: String,
    /// Person accountable for the project budget
    pub responsible_person: String,
    /// Optional free-text description
    pub description: Option<String>,
    /// First day of the project window
    pub start_date: Date,
    /// Last day of the project window (never before `start_date`)
    pub end_date: Date,
    /// Current lifecycle status
    pub status: ProjectStatus,
    /// When the project was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Project and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One project has many allocations
    #[sea_orm(has_many = "super::allocation::Entity")]
    Allocations,
    /// One project has many ledger entries
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
