//! Category registry - Handles the shared set of budget category kinds.
//!
//! Categories are referenced everywhere by their uppercase key. They are never hard-deleted:
//! deactivation is refused while any allocation or ledger entry still points at the category,
//! and otherwise only flips the active flag so history keeps resolving.

use crate::{
    config::categories::Config,
    entities::{Allocation, Category, Transaction, allocation, category, transaction},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument, warn};

/// Longest key accepted by the registry.
pub const MAX_KEY_LEN: usize = 50;

/// Checks that a key is an uppercase identifier: `A-Z` or `_` first, then `A-Z`, `0-9` or `_`.
///
/// # Errors
/// Returns `Error::InvalidCategoryKey` describing the first rule the key breaks.
pub fn validate_category_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidCategoryKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("key cannot be empty"));
    };
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key is longer than 50 characters"));
    }
    if !(first.is_ascii_uppercase() || first == '_') {
        return Err(invalid("key must start with an uppercase letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
        return Err(invalid(
            "key may only contain uppercase letters, digits and underscores",
        ));
    }
    Ok(())
}

/// Finds a category by its exact key, active or not.
pub async fn get_category_by_key<C>(db: &C, key: &str) -> Result<Option<category::Model>>
where
    C: ConnectionTrait,
{
    Category::find()
        .filter(category::Column::Key.eq(key))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a category by its unique ID, active or not.
pub async fn get_category_by_id<C>(db: &C, category_id: i64) -> Result<Option<category::Model>>
where
    C: ConnectionTrait,
{
    Category::find_by_id(category_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all active categories ordered by display name, as offered in selection lists.
pub async fn get_all_active_categories(db: &DatabaseConnection) -> Result<Vec<category::Model>> {
    Category::find()
        .filter(category::Column::IsActive.eq(true))
        .order_by_asc(category::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Resolves a human key to the active category row.
///
/// # Errors
/// Returns `Error::UnknownCategory` if the key is unknown or the category is deactivated.
pub async fn resolve_active_category<C>(db: &C, key: &str) -> Result<category::Model>
where
    C: ConnectionTrait,
{
    debug!("Resolving category key '{}'", key);
    get_category_by_key(db, key)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| Error::UnknownCategory {
            reference: key.to_string(),
        })
}

/// Resolves a human key to its category ID. Used by every write path that accepts a key.
pub async fn resolve_category_key<C>(db: &C, key: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    resolve_active_category(db, key).await.map(|c| c.id)
}

/// Loads an active category by ID.
///
/// # Errors
/// Returns `Error::UnknownCategory` if the ID does not exist or the category is deactivated.
pub async fn require_active_category<C>(db: &C, category_id: i64) -> Result<category::Model>
where
    C: ConnectionTrait,
{
    get_category_by_id(db, category_id)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| Error::UnknownCategory {
            reference: category_id.to_string(),
        })
}

/// Registers a new category.
///
/// # Errors
/// Returns an error if:
/// - The key is not an uppercase identifier (`Error::InvalidCategoryKey`)
/// - The key already exists, active or not (`Error::DuplicateKey`)
/// - The display name is empty
#[instrument(skip(db, description))]
pub async fn create_category<C>(
    db: &C,
    key: &str,
    name: &str,
    description: Option<String>,
) -> Result<category::Model>
where
    C: ConnectionTrait,
{
    validate_category_key(key)?;

    if name.trim().is_empty() {
        return Err(Error::Config {
            message: "Category name cannot be empty".to_string(),
        });
    }

    if get_category_by_key(db, key).await?.is_some() {
        return Err(Error::DuplicateKey {
            key: key.to_string(),
        });
    }

    let now = Utc::now();
    let model = category::ActiveModel {
        key: Set(key.to_string()),
        name: Set(name.trim().to_string()),
        description: Set(description),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let created = model.insert(db).await?;
    info!("Created category {} '{}'", created.key, created.name);
    Ok(created)
}

/// Updates the display name and/or description of a category. The key never changes.
///
/// `description: Some(None)` clears the description.
pub async fn update_category(
    db: &DatabaseConnection,
    category_id: i64,
    name: Option<String>,
    description: Option<Option<String>>,
) -> Result<category::Model> {
    let existing = get_category_by_id(db, category_id)
        .await?
        .ok_or_else(|| Error::UnknownCategory {
            reference: category_id.to_string(),
        })?;

    let mut active_model: category::ActiveModel = existing.into();
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(Error::Config {
                message: "Category name cannot be empty".to_string(),
            });
        }
        active_model.name = Set(name.trim().to_string());
    }
    if let Some(description) = description {
        active_model.description = Set(description);
    }
    active_model.updated_at = Set(Utc::now());

    active_model.update(db).await.map_err(Into::into)
}

/// Counts the allocations and ledger entries that reference a category.
pub async fn count_category_references<C>(db: &C, category_id: i64) -> Result<(u64, u64)>
where
    C: ConnectionTrait,
{
    let allocations = Allocation::find()
        .filter(allocation::Column::CategoryId.eq(category_id))
        .count(db)
        .await?;
    let transactions = Transaction::find()
        .filter(transaction::Column::CategoryId.eq(category_id))
        .count(db)
        .await?;
    Ok((allocations, transactions))
}

/// Soft-deletes a category that nothing references.
///
/// # Errors
/// Returns `Error::InUse` with both reference counts if any allocation or ledger entry still
/// uses the category, or `Error::UnknownCategory` if the ID does not exist.
#[instrument(skip(db))]
pub async fn deactivate_category(db: &DatabaseConnection, category_id: i64) -> Result<category::Model> {
    let txn = db.begin().await?;

    let existing = get_category_by_id(&txn, category_id)
        .await?
        .ok_or_else(|| Error::UnknownCategory {
            reference: category_id.to_string(),
        })?;

    let (allocations, transactions) = count_category_references(&txn, category_id).await?;
    if allocations > 0 || transactions > 0 {
        warn!(
            "Refusing to deactivate category {}: {} allocation(s), {} transaction(s)",
            existing.key, allocations, transactions
        );
        return Err(Error::InUse {
            key: existing.key,
            allocations,
            transactions,
        });
    }

    let mut active_model: category::ActiveModel = existing.into();
    active_model.is_active = Set(false);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(&txn).await?;

    txn.commit().await?;
    info!("Deactivated category {}", updated.key);
    Ok(updated)
}

/// Reactivates a previously deactivated category.
pub async fn restore_category(db: &DatabaseConnection, category_id: i64) -> Result<category::Model> {
    let existing = get_category_by_id(db, category_id)
        .await?
        .ok_or_else(|| Error::UnknownCategory {
            reference: category_id.to_string(),
        })?;

    let mut active_model: category::ActiveModel = existing.into();
    active_model.is_active = Set(true);
    active_model.updated_at = Set(Utc::now());
    let restored = active_model.update(db).await?;
    info!("Restored category {}", restored.key);
    Ok(restored)
}

/// Derives an unused key from a display name.
///
/// The name is uppercased, every run of characters outside `A-Z0-9` becomes a single `_`, and a
/// numeric suffix (`_1`, `_2`, ...) is appended until the key is free. Names with no usable
/// characters fall back to `CATEGORY`.
pub async fn generate_category_key<C>(db: &C, name: &str) -> Result<String>
where
    C: ConnectionTrait,
{
    let base = key_stem(name);

    let mut key = base.clone();
    let mut counter = 1;
    while get_category_by_key(db, &key).await?.is_some() {
        key = format!("{base}_{counter}");
        counter += 1;
    }
    Ok(key)
}

fn key_stem(name: &str) -> String {
    let mut stem = String::new();
    for c in name.trim().to_uppercase().chars() {
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            stem.push(c);
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }

    let mut stem = stem.trim_matches('_').to_string();
    if stem.starts_with(|c: char| c.is_ascii_digit()) {
        stem.insert(0, '_');
    }
    // leave room for a numeric suffix
    stem.truncate(MAX_KEY_LEN - 4);
    if stem.is_empty() {
        "CATEGORY".to_string()
    } else {
        stem
    }
}

/// Registers every category from the configuration that is not already present.
///
/// Deactivated categories listed in the configuration are restored. Returns the number of
/// categories created.
#[instrument(skip(db, config))]
pub async fn seed_categories(db: &DatabaseConnection, config: &Config) -> Result<usize> {
    info!(
        "Seeding categories. Found {} entries in config.",
        config.categories.len()
    );
    let txn = db.begin().await?;
    let mut created = 0;

    for entry in &config.categories {
        match get_category_by_key(&txn, &entry.key).await? {
            Some(existing) if existing.is_active => {
                debug!("Category {} already registered. Skipping.", entry.key);
            }
            Some(existing) => {
                let mut active_model: category::ActiveModel = existing.into();
                active_model.is_active = Set(true);
                active_model.updated_at = Set(Utc::now());
                active_model.update(&txn).await?;
                info!("Restored deactivated category {} from config.", entry.key);
            }
            None => {
                create_category(&txn, &entry.key, &entry.name, entry.description.clone()).await?;
                created += 1;
            }
        }
    }

    txn.commit().await?;
    Ok(created)
}
