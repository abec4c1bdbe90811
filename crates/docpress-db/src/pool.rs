//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use docpress_core::{defaults, Error, Result, StoreConfig};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquire timeout.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }
}

fn is_memory(store: &StoreConfig) -> bool {
    store.path.as_os_str() == ":memory:"
}

fn connect_options(store: &StoreConfig) -> SqliteConnectOptions {
    let mut options = SqliteConnectOptions::new()
        .filename(&store.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(defaults::DB_BUSY_TIMEOUT_SECS))
        .synchronous(SqliteSynchronous::Normal)
        .pragma("temp_store", "MEMORY");

    if let Some(key) = &store.encryption_key {
        options = options.pragma("key", key.clone());
    }

    options
}

/// Create the primary (write) connection pool with default configuration.
pub async fn create_pool(store: &StoreConfig) -> Result<SqlitePool> {
    create_pool_with_config(store, PoolConfig::default()).await
}

/// Create the primary (write) connection pool with custom configuration.
///
/// An in-memory store is pinned to a single persistent connection: each
/// SQLite `:memory:` connection is its own database.
pub async fn create_pool_with_config(
    store: &StoreConfig,
    config: PoolConfig,
) -> Result<SqlitePool> {
    let start = Instant::now();
    let max_connections = if is_memory(store) {
        1
    } else {
        config.max_connections
    };

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        path = %store.path.display(),
        max_connections,
        use_replica = store.use_replica,
        "Creating store connection pool"
    );

    if let Some(sync_url) = &store.sync_url {
        info!(
            subsystem = "db",
            component = "pool",
            sync_url = %sync_url,
            sync_interval_secs = store.sync_interval_secs,
            "Remote sync configured; replication is handled by an external agent"
        );
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(config.min_connections.min(max_connections))
        .acquire_timeout(config.acquire_timeout);

    if is_memory(store) {
        // The sole connection must never be reaped or the database vanishes.
        pool_options = pool_options.min_connections(1).idle_timeout(None);
    }

    let pool = pool_options
        .connect_with(connect_options(store))
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Store connection pool established"
    );
    Ok(pool)
}

/// Create the optional read-only replica pool over the same file.
///
/// Returns `None` for in-memory stores and when `use_replica` is unset.
pub async fn create_read_pool(store: &StoreConfig) -> Result<Option<SqlitePool>> {
    if !store.use_replica || is_memory(store) {
        return Ok(None);
    }

    let options = connect_options(store)
        .create_if_missing(false)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    debug!(
        subsystem = "db",
        component = "pool",
        op = "replica_established",
        "Read-only replica pool established"
    );
    Ok(Some(pool))
}
