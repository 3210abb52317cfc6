use anyhow::Context;
use sales_process_core::config::{init_tracing, load_config};
use sales_process_core::db::{self, DatabaseProvider};
use sales_process_core::migrator::Migrator;
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Applies pending schema migrations to the configured database.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;
    init_tracing(config.log_level(), config.log_json);

    let provider = DatabaseProvider::from_app_config(&config).with_auto_migrate(false);
    let pool = provider
        .connection()
        .await
        .context("connecting to database")?;
    db::check_connection(&pool)
        .await
        .context("checking database connection")?;

    let pending = Migrator::get_pending_migrations(pool.as_ref())
        .await
        .context("listing pending migrations")?;
    if pending.is_empty() {
        info!("Schema is up to date");
        return Ok(());
    }
    for migration in &pending {
        info!(migration = migration.name(), "Pending migration");
    }

    db::run_migrations(&pool)
        .await
        .context("applying migrations")?;
    info!(applied = pending.len(), "Migrations applied");
    Ok(())
}
