/// Balance queries derived from allocations and ledger entries
pub mod balance;

/// Category registry: create, resolve, deactivate and seed categories
pub mod category;

/// Ledger entries: record, update, delete and list
pub mod ledger;

/// Decimal amounts to and from stored minor units
pub mod money;

/// Projects and their opening allocations
pub mod project;

/// Portfolio, ledger and transfer reports
pub mod report;

/// Transfer coordinator writing matched entry pairs
pub mod transfer;
