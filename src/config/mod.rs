/// Database connection and table creation
pub mod database;

/// Category seed configuration loading from config.toml
pub mod categories;
