pub mod query_builder;
pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

pub use query_builder::QueryBuilder;
pub use transaction::TxScope;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database
///
/// # Errors
/// Returns `ServiceError::DatabaseConnection` if the pool cannot be established
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::new(database_url)).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("sales_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        counter!("sales_db.connection_failures", 1);
        ServiceError::DatabaseConnection(e.to_string())
    })?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Runs the embedded schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::db_error("running migrations", e));

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    let start = std::time::Instant::now();

    let result = pool
        .ping()
        .await
        .map_err(|e| ServiceError::DatabaseConnection(e.to_string()));

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            histogram!("sales_db.connection_latency", elapsed);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("sales_db.connection_failures", 1);
        }
    }

    result
}

/// Shared store handle, connected once on first use.
///
/// Every repository receives the same `Arc<DatabaseConnection>` from here.
/// Concurrent first callers wait on one initialisation; a failed attempt
/// leaves the cell empty so a later call can retry.
#[derive(Debug)]
pub struct DatabaseProvider {
    config: DbConfig,
    auto_migrate: bool,
    connection: OnceCell<Arc<DbPool>>,
}

impl DatabaseProvider {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            auto_migrate: false,
            connection: OnceCell::new(),
        }
    }

    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.into()).with_auto_migrate(cfg.auto_migrate)
    }

    /// Run the embedded migrations right after the pool is first established.
    pub fn with_auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.auto_migrate = auto_migrate;
        self
    }

    /// Wraps an already open pool; no connection is made later.
    pub fn from_connection(pool: DbPool) -> Self {
        Self {
            config: DbConfig::default(),
            auto_migrate: false,
            connection: OnceCell::new_with(Some(Arc::new(pool))),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.initialized()
    }

    pub async fn connection(&self) -> Result<Arc<DbPool>, ServiceError> {
        let pool = self
            .connection
            .get_or_try_init(|| async {
                let pool = establish_connection_with_config(&self.config).await?;
                if self.auto_migrate {
                    run_migrations(&pool).await?;
                }
                counter!("sales_db.provider.initialized", 1);
                Ok::<_, ServiceError>(Arc::new(pool))
            })
            .await?;
        Ok(Arc::clone(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn db_config_follows_app_config() {
        let mut app = AppConfig::new("sqlite://x.db".into(), "test".into());
        app.db_max_connections = 4;
        app.db_acquire_timeout_secs = 2;
        let cfg = DbConfig::from(&app);
        assert_eq!(cfg.url, "sqlite://x.db");
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unreachable_store_reports_connection_error() {
        let provider = DatabaseProvider::new(DbConfig::new("bogus://localhost/db"));
        assert_matches!(
            provider.connection().await,
            Err(ServiceError::DatabaseConnection(_))
        );
        assert!(!provider.is_initialized());
    }
}
