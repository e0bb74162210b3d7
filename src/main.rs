use budget_ledger::{
    config::{categories, database},
    core::{category, report},
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the category configuration
    let config = categories::load_default_config()
        .inspect_err(|e| error!("Failed to load category configuration: {}", e))?;

    // 4. Connect and make sure the tables exist
    if database::get_database_url().starts_with("sqlite://data/") {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;

    // 5. Seed categories from config
    let created = category::seed_categories(&db, &config)
        .await
        .inspect_err(|e| error!("Failed to seed categories: {}", e))?;
    info!("Seeded {} new categories.", created);

    // 6. Report where the ledger stands
    let summary = report::portfolio_summary(&db).await?;
    info!("{}", report::format_portfolio_summary(&summary));

    Ok(())
}
