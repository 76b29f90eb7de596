use crate::config::AppConfig;
use metrics::gauge;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement};
use std::time::Duration;
use tracing::{debug, info};

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
            acquire_timeout: Duration::from_secs(8),
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
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    gauge!("canteen_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Establishes a connection pool from the application configuration
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies the idempotent schema DDL for the order ledger.
///
/// The schema is small enough that versioned migrations would be overhead;
/// every statement is `IF NOT EXISTS` and safe to re-run on startup.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    for stmt in schema_statements(backend) {
        db.execute(Statement::from_string(backend, stmt.to_string()))
            .await?;
    }

    info!("Database schema is up to date");
    Ok(())
}

fn schema_statements(backend: DbBackend) -> Vec<&'static str> {
    // sea-orm's SQLite decimal codec round-trips `Decimal` through `f64`
    // (REAL) on both read and write. A `NUMERIC`-affinity column collapses an
    // integer-valued real like `155.0` to INTEGER storage, which the f64
    // decoder then rejects. Declaring the SQLite decimal columns with REAL
    // affinity keeps the storage class compatible with that codec. Postgres
    // keeps exact `NUMERIC(12, 2)`.
    let (orders, order_items) = match backend {
        DbBackend::Sqlite => (
            r#"CREATE TABLE IF NOT EXISTS orders (
                id VARCHAR(32) PRIMARY KEY,
                store_id VARCHAR(64) NOT NULL,
                customer VARCHAR(160) NOT NULL,
                status VARCHAR(16) NOT NULL,
                payment_method VARCHAR(24) NULL,
                payment_status VARCHAR(16) NOT NULL,
                total REAL NOT NULL,
                declared_total REAL NULL,
                gateway_order_id VARCHAR(64) NULL,
                gateway_payment_id VARCHAR(64) NULL,
                gateway_signature VARCHAR(128) NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT NOT NULL,
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                unit_price REAL NOT NULL
            )"#,
        ),
        _ => (
            r#"CREATE TABLE IF NOT EXISTS orders (
                id VARCHAR(32) PRIMARY KEY,
                store_id VARCHAR(64) NOT NULL,
                customer VARCHAR(160) NOT NULL,
                status VARCHAR(16) NOT NULL,
                payment_method VARCHAR(24) NULL,
                payment_status VARCHAR(16) NOT NULL,
                total NUMERIC(12, 2) NOT NULL,
                declared_total NUMERIC(12, 2) NULL,
                gateway_order_id VARCHAR(64) NULL,
                gateway_payment_id VARCHAR(64) NULL,
                gateway_signature VARCHAR(128) NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS order_items (
                id SERIAL PRIMARY KEY,
                order_id VARCHAR(32) NOT NULL,
                name VARCHAR(160) NOT NULL,
                quantity INTEGER NOT NULL,
                unit_price NUMERIC(12, 2) NOT NULL
            )"#,
        ),
    };

    vec![
        orders,
        order_items,
        "CREATE INDEX IF NOT EXISTS idx_orders_store_id ON orders (store_id)",
        "CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id)",
    ]
}

/// Lightweight connectivity probe used by the db-health endpoint.
pub async fn ping(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    db.query_one(Statement::from_string(backend, "SELECT 1".to_string()))
        .await?;
    Ok(())
}
