//! Engine and store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;

/// Store configuration (recognized options).
///
/// `path` is the local single-file database. The sync options describe an
/// external replication agent and are recognized and logged but do not change
/// the single-writer contract of this process. `use_replica` opens a second
/// read-only pool on the same file for hot reads.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Local database file path.
    pub path: PathBuf,
    /// Optional remote sync endpoint for an external replication agent.
    pub sync_url: Option<String>,
    /// Auth token for the sync endpoint.
    pub auth_token: Option<String>,
    /// Sync interval in seconds.
    pub sync_interval_secs: Option<u64>,
    /// Optional at-rest encryption key, applied as a connection pragma.
    pub encryption_key: Option<String>,
    /// Open a read-only replica pool for hot reads.
    pub use_replica: bool,
}

impl StoreConfig {
    /// Store config for a database file at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_url: None,
            auth_token: None,
            sync_interval_secs: None,
            encryption_key: None,
            use_replica: false,
        }
    }

    /// Read sync/replica/encryption options from the environment.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `DOCPRESS_DB_SYNC_URL` | Remote sync endpoint |
    /// | `DOCPRESS_DB_AUTH_TOKEN` | Sync endpoint auth token |
    /// | `DOCPRESS_DB_SYNC_INTERVAL_SECS` | Sync interval |
    /// | `DOCPRESS_DB_ENCRYPTION_KEY` | At-rest encryption key |
    /// | `DOCPRESS_DB_USE_REPLICA` | Open a read-only replica pool |
    pub fn from_env(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(path);
        config.sync_url = std::env::var("DOCPRESS_DB_SYNC_URL").ok().filter(|s| !s.is_empty());
        config.auth_token = std::env::var("DOCPRESS_DB_AUTH_TOKEN").ok().filter(|s| !s.is_empty());
        config.sync_interval_secs = std::env::var("DOCPRESS_DB_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok());
        config.encryption_key = std::env::var("DOCPRESS_DB_ENCRYPTION_KEY")
            .ok()
            .filter(|s| !s.is_empty());
        config.use_replica = std::env::var("DOCPRESS_DB_USE_REPLICA")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        config
    }
}

/// Configuration for the conversion engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data directory holding the store file and worker scratch space.
    pub data_dir: PathBuf,
    /// Store options.
    pub store: StoreConfig,
    /// Size of the worker pool.
    pub worker_count: usize,
    /// Queue-check tick.
    pub dispatch_interval: Duration,
    /// Orphan-sweep tick.
    pub cleanup_interval: Duration,
    /// Stuck-in-processing cutoff.
    pub orphan_threshold: Duration,
    /// Per-job claim upper bound.
    pub max_attempts: i64,
    /// Switch to temp-file streaming above this blob size.
    pub large_file_threshold: u64,
    /// Graceful shutdown wait per worker.
    pub shutdown_wait: Duration,
    /// Delay between worker constructions at startup.
    pub start_stagger: Duration,
    /// Worker safety-net poll interval when no signal arrives.
    pub worker_poll_interval: Duration,
}

impl EngineConfig {
    /// Engine config rooted at the given data directory, all other values
    /// defaulted.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let store = StoreConfig::new(data_dir.join(defaults::DB_FILE_NAME));
        Self {
            data_dir,
            store,
            worker_count: defaults::WORKER_COUNT,
            dispatch_interval: Duration::from_secs(defaults::DISPATCH_INTERVAL_SECS),
            cleanup_interval: Duration::from_secs(defaults::CLEANUP_INTERVAL_SECS),
            orphan_threshold: Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS),
            max_attempts: defaults::JOB_MAX_ATTEMPTS,
            large_file_threshold: defaults::LARGE_FILE_THRESHOLD_BYTES,
            shutdown_wait: Duration::from_secs(defaults::SHUTDOWN_WAIT_PER_WORKER_SECS),
            start_stagger: Duration::from_millis(defaults::WORKER_START_STAGGER_MS),
            worker_poll_interval: Duration::from_millis(defaults::WORKER_POLL_INTERVAL_MS),
        }
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DOCPRESS_DATA_DIR` | `./data` | Data directory |
    /// | `DOCPRESS_WORKER_COUNT` | `2` | Worker pool size |
    /// | `DOCPRESS_DISPATCH_INTERVAL_SECS` | `5` | Queue-check tick |
    /// | `DOCPRESS_CLEANUP_INTERVAL_SECS` | `60` | Orphan-sweep tick |
    /// | `DOCPRESS_ORPHAN_THRESHOLD_SECS` | `300` | Stuck-work cutoff |
    /// | `DOCPRESS_MAX_ATTEMPTS` | `3` | Per-job claim bound |
    /// | `DOCPRESS_LARGE_FILE_THRESHOLD` | `10485760` | Temp-file spill size |
    pub fn from_env() -> Self {
        let data_dir =
            std::env::var("DOCPRESS_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let mut config = Self::new(&data_dir);
        config.store = StoreConfig::from_env(config.store.path.clone());

        if let Ok(val) = std::env::var("DOCPRESS_WORKER_COUNT") {
            if let Ok(n) = val.parse::<usize>() {
                config.worker_count = n.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid DOCPRESS_WORKER_COUNT, using default");
            }
        }
        if let Ok(val) = std::env::var("DOCPRESS_DISPATCH_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.dispatch_interval = Duration::from_secs(n.max(1));
            }
        }
        if let Ok(val) = std::env::var("DOCPRESS_CLEANUP_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.cleanup_interval = Duration::from_secs(n.max(1));
            }
        }
        if let Ok(val) = std::env::var("DOCPRESS_ORPHAN_THRESHOLD_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.orphan_threshold = Duration::from_secs(n.max(1));
            }
        }
        if let Ok(val) = std::env::var("DOCPRESS_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse::<i64>() {
                config.max_attempts = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("DOCPRESS_LARGE_FILE_THRESHOLD") {
            if let Ok(n) = val.parse::<u64>() {
                config.large_file_threshold = n;
            }
        }

        config
    }

    /// Set the worker pool size.
    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = n.max(1);
        self
    }

    /// Set the dispatch tick.
    pub fn with_dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = interval;
        self
    }

    /// Set the cleanup tick.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the orphan threshold.
    pub fn with_orphan_threshold(mut self, threshold: Duration) -> Self {
        self.orphan_threshold = threshold;
        self
    }

    /// Set the worker safety-net poll interval.
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    /// Scratch directory for worker temp files.
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join(defaults::TEMP_DIR_NAME)
    }

    /// Temp file path for a document: `<data-dir>/tmp/<document-id>-<epoch-ms>.tmp`.
    pub fn temp_file_path(&self, document_id: &str, epoch_ms: i64) -> PathBuf {
        self.temp_dir()
            .join(format!("{}-{}.tmp", document_id, epoch_ms))
    }

    /// The store file path.
    pub fn db_path(&self) -> &Path {
        &self.store.path
    }
}
