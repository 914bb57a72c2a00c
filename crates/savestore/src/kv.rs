//! Durable key-value store for the local device backend
//!
//! A thin sled wrapper that stores UTF-8 string values under string keys.
//! Bulk writes go through a single sled batch so they land all-or-nothing.

use sled::Db;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Key-value store error types
#[derive(Debug, Error)]
pub enum KvError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Stored bytes are not valid UTF-8
    #[error("Invalid UTF-8 in stored value: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for key-value operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database path
    pub path: PathBuf,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Flush interval in milliseconds (None for flushing on every write batch)
    pub flush_every_ms: Option<u64>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gamesave_kv.db"),
            cache_capacity: 8 * 1024 * 1024, // 8MB
            flush_every_ms: Some(500),
        }
    }
}

impl KvConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }
}

/// Key-value store implementation
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Db>,
    sync_writes: bool,
}

impl KvStore {
    /// Open a key-value store with configuration
    pub fn open(config: KvConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms)
            .open()?;

        Ok(Self { db: Arc::new(db), sync_writes: config.flush_every_ms.is_none() })
    }

    /// Create an in-memory key-value store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;

        Ok(Self { db: Arc::new(db), sync_writes: false })
    }

    fn check_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::InvalidKey("empty key".to_string()));
        }
        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    /// Set a value by key
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        Self::check_key(key)?;
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    /// Write many values in one atomic batch
    pub fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            Self::check_key(key)?;
            batch.insert(key.as_bytes(), value.as_bytes());
        }

        self.db.apply_batch(batch)?;
        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(())
    }

    /// Remove a value by key
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// Get all entries whose key starts with a prefix
    ///
    /// Entries with non UTF-8 keys or values are skipped.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            match (String::from_utf8(key.to_vec()), String::from_utf8(value.to_vec())) {
                (Ok(key), Ok(value)) => entries.push((key, value)),
                _ => tracing::warn!(prefix, "skipping non UTF-8 entry in local store"),
            }
        }

        Ok(entries)
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
