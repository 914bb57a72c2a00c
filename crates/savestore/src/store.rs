//! Save store
//!
//! [`SaveStore`] is the explicit object every collaborator shares. It owns the
//! in-memory values, the registry of tracked keys, the two snapshot
//! generations, the codec and the backend handle.
//!
//! Writes only touch memory. Persisting happens on a flush, which serializes
//! every tracked value, compresses the ones that qualify, and writes the full
//! set to the backend only when it differs from what the backend last
//! accepted. Nothing here is fatal: every failure is logged and the store keeps
//! serving the last good in-memory value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::backend::{Backend, BackendError, BackendKind};
use crate::codec::{self, Codec, CodecError, CompressionStatus};
use crate::config::SaveConfig;
use crate::normalize;
use crate::registry::{Entry, Registry};
use crate::scheduler::{FlushTarget, SchedulerState, SyncScheduler};
use crate::snapshot::{self, SnapshotStore};

/// Save store error types
#[derive(Debug, Error)]
pub enum SaveError {
    /// Key is empty or reserved
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// Backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Import document has an unrecognized shape
    #[error("Invalid import document: {0}")]
    InvalidImport(String),
}

/// Result type for save store operations
pub type Result<T> = std::result::Result<T, SaveError>;

/// Store events
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A flush wrote changes to the backend
    Flushed {
        /// Number of entries written
        entries: usize,
        /// When the backend accepted the write
        at: DateTime<Utc>,
    },

    /// A flush could not write to the backend
    FlushFailed {
        /// Error description
        error: String,
    },

    /// A previously unknown key started being tracked
    KeyRegistered {
        /// The logical key
        key: String,
    },
}

/// Result of a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last accepted write
    Unchanged,
    /// Changes were written
    Written {
        /// Number of entries sent to the backend
        entries: usize,
    },
}

pub(crate) struct Inner {
    pub(crate) config: SaveConfig,
    backend: Arc<dyn Backend>,
    codec: RwLock<Codec>,
    registry: Mutex<Registry>,
    memory: Mutex<HashMap<String, Value>>,
    snapshots: tokio::sync::Mutex<SnapshotStore>,
    scheduler: SyncScheduler,
    data_loaded: AtomicBool,
    last_saved_at: Mutex<Option<DateTime<Utc>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl Inner {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Turn a raw backend payload into its in-memory form
    ///
    /// Stored text stays text; numbers are only parsed when a caller reads it.
    fn decode_stored(&self, raw: &str) -> Value {
        if codec::is_tagged(raw) {
            return Value::String(self.codec.read().decompress(raw));
        }
        Value::String(raw.to_string())
    }

    /// In-memory value for a key reset to its default
    ///
    /// A declared default keeps its own value; keys registered at runtime fall
    /// back to their default text.
    fn default_for(&self, key: &str, default_text: &str) -> Value {
        match self.config.declared_default(key) {
            Some(declared) => normalize::canonicalize(declared.clone()),
            None => Value::String(default_text.to_string()),
        }
    }

    fn register(&self, key: &str, observed: &Value) {
        let added = self.registry.lock().ensure(key, observed);
        if added {
            self.emit(SyncEvent::KeyRegistered { key: key.to_string() });
        }
    }

    async fn flush(&self) -> Result<FlushOutcome> {
        let mut snapshots = self.snapshots.lock().await;

        let pending = {
            let registry = self.registry.lock();
            let memory = self.memory.lock();
            let codec = self.codec.read();
            snapshot::compute_pending(&registry, &self.config.key_prefix, &codec, |key| {
                memory.get(key).cloned()
            })
        };
        snapshots.set_pending(pending);

        if !snapshots.has_changes() {
            tracing::debug!("no changes since last save");
            return Ok(FlushOutcome::Unchanged);
        }

        let entries = snapshots.pending().entries().to_vec();
        if let Err(e) = self.backend.write_bulk(&entries).await {
            tracing::error!(error = %e, backend = %self.backend.kind(), "failed to write save data");
            self.emit(SyncEvent::FlushFailed { error: e.to_string() });
            return Err(e.into());
        }

        snapshots.promote();

        let at = Utc::now();
        *self.last_saved_at.lock() = Some(at);
        tracing::info!(entries = entries.len(), backend = %self.backend.kind(), "save data written");
        self.emit(SyncEvent::Flushed { entries: entries.len(), at });

        Ok(FlushOutcome::Written { entries: entries.len() })
    }
}

#[async_trait]
impl FlushTarget for Inner {
    async fn flush(&self) {
        // Failures are logged and reported as events inside
        let _ = Inner::flush(self).await;
    }

    fn can_defer(&self) -> bool {
        self.backend.can_defer()
    }
}

/// Shared save store handle
///
/// Cloning is cheap; all clones operate on the same state.
#[derive(Clone)]
pub struct SaveStore {
    pub(crate) inner: Arc<Inner>,
}

impl SaveStore {
    /// Open a store over a resolved backend
    ///
    /// Loads everything persisted under the key prefix, registers keys found
    /// there that were not declared, and fills memory with saved values or
    /// defaults. A backend that fails to load leaves [`SaveStore::data_loaded`]
    /// false; defaults are applied and the store is usable either way.
    pub async fn open(config: SaveConfig, backend: Arc<dyn Backend>) -> Self {
        let codec = Codec::new(config.compression.clone());
        Self::open_with_codec(config, backend, codec).await
    }

    /// Open a store using a codec with a custom or missing engine
    pub async fn open_with_codec(
        config: SaveConfig,
        backend: Arc<dyn Backend>,
        codec: Codec,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        let registry = Registry::with_defaults(config.defaults.clone());

        let inner = Arc::new(Inner {
            codec: RwLock::new(codec),
            scheduler: SyncScheduler::new(config.scheduler.clone()),
            registry: Mutex::new(registry),
            memory: Mutex::new(HashMap::new()),
            snapshots: tokio::sync::Mutex::new(SnapshotStore::new()),
            data_loaded: AtomicBool::new(false),
            last_saved_at: Mutex::new(None),
            events,
            backend,
            config,
        });

        let store = Self { inner };
        store.load().await;
        store
    }

    async fn load(&self) {
        let inner = &self.inner;
        let prefix = inner.config.key_prefix.as_str();

        let persisted = match inner.backend.load_all(prefix).await {
            Ok(entries) => {
                inner.data_loaded.store(true, Ordering::SeqCst);
                entries
            }
            Err(e) => {
                tracing::error!(error = %e, "save data failed to load, using defaults");
                Vec::new()
            }
        };

        let mut found = HashMap::new();
        for (persisted_key, raw) in persisted {
            let Some(key) = persisted_key.strip_prefix(prefix) else {
                continue;
            };
            if key.is_empty() || inner.config.is_reserved(key) {
                continue;
            }

            let value = inner.decode_stored(&raw);
            if inner.registry.lock().ensure(key, &value) {
                tracing::debug!(key, "discovered undeclared save key");
            }
            found.insert(key.to_string(), value);
        }

        let registry = inner.registry.lock();
        let mut memory = inner.memory.lock();
        for entry in registry.all() {
            let value = match found.remove(&entry.key) {
                Some(value) => value,
                None => inner.default_for(&entry.key, &entry.default_value),
            };
            memory.insert(entry.key.clone(), value);
        }

        tracing::info!(
            keys = registry.len(),
            backend = %inner.backend.kind(),
            loaded = inner.data_loaded.load(Ordering::SeqCst),
            "save store ready"
        );
    }

    /// Start background syncing
    ///
    /// Requests an initial save and starts the periodic flush.
    pub async fn start(&self) {
        self.save().await;
        self.inner.scheduler.start_periodic(&self.inner);
    }

    /// Stop the periodic flush and cancel any pending debounced flush
    pub fn stop(&self) {
        self.inner.scheduler.stop_periodic();
        self.inner.scheduler.cancel();
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() || self.inner.config.is_reserved(key) {
            tracing::error!(key, "rejected invalid save key");
            return Err(SaveError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Store a value in memory
    ///
    /// Unknown keys are registered. Does not flush; call [`SaveStore::save`].
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.validate_key(key)?;

        let value = normalize::canonicalize(value.into());
        self.inner.register(key, &value);
        self.inner.memory.lock().insert(key.to_string(), value);
        Ok(())
    }

    /// Read a decoded value
    ///
    /// Falls through to the backend when the key is not in memory, and keeps
    /// what it finds there.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if self.validate_key(key).is_err() {
            return None;
        }

        let cached = self.inner.memory.lock().get(key).cloned();
        if let Some(value) = cached {
            self.inner.register(key, &value);
            return Some(normalize::decode(&value));
        }

        let raw = self.read_backend(key).await?;
        let value = self.inner.decode_stored(&raw);
        self.inner.register(key, &value);
        self.inner.memory.lock().insert(key.to_string(), value.clone());
        Some(normalize::decode(&value))
    }

    /// Read a value before decoding and decompression
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if self.validate_key(key).is_err() {
            return None;
        }

        let cached = self.inner.memory.lock().get(key).map(normalize::serialize);
        match cached {
            Some(raw) => Some(raw),
            None => self.read_backend(key).await,
        }
    }

    async fn read_backend(&self, key: &str) -> Option<String> {
        let persisted_key = self.inner.config.persisted_key(key);
        match self.inner.backend.read(&persisted_key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "backend read failed");
                None
            }
        }
    }

    /// Check whether a key has an in-memory value
    pub fn has(&self, key: &str) -> bool {
        self.inner.memory.lock().contains_key(key)
    }

    /// Request a debounced save
    pub async fn save(&self) {
        self.inner.scheduler.request(&self.inner).await;
    }

    /// Flush right away, regardless of the scheduler state
    pub async fn save_now(&self) -> Result<FlushOutcome> {
        self.inner.flush().await
    }

    /// Delete a key from memory, the registry and the backend, then flush
    pub async fn delete(&self, key: &str) -> Result<FlushOutcome> {
        self.validate_key(key)?;

        let persisted_key = self.inner.config.persisted_key(key);
        self.inner.backend.delete(&persisted_key).await?;

        self.inner.registry.lock().remove(key);
        self.inner.memory.lock().remove(key);
        tracing::info!(key, "deleted save entry");

        self.save_now().await
    }

    /// Restore a tracked key to its registered default
    pub fn reset_to_default(&self, key: &str) -> Result<()> {
        self.validate_key(key)?;

        let default = self
            .inner
            .registry
            .lock()
            .default_of(key)
            .map(str::to_string)
            .ok_or_else(|| SaveError::InvalidKey(key.to_string()))?;

        let value = self.inner.default_for(key, &default);
        self.inner.memory.lock().insert(key.to_string(), value);
        Ok(())
    }

    /// Reset every tracked key to its default and drop it from the backend
    ///
    /// Keys stay registered. Memory is only reset once every backend delete
    /// succeeded. Flushes right away and returns how many keys were reset.
    pub async fn clear_all(&self) -> Result<usize> {
        let entries = self.entries();

        for entry in &entries {
            let persisted_key = self.inner.config.persisted_key(&entry.key);
            self.inner.backend.delete(&persisted_key).await?;
        }

        {
            let mut memory = self.inner.memory.lock();
            for entry in &entries {
                let value = self.inner.default_for(&entry.key, &entry.default_value);
                memory.insert(entry.key.clone(), value);
            }
        }

        tracing::info!(keys = entries.len(), "cleared all saves");
        self.save_now().await?;
        Ok(entries.len())
    }

    /// Tracked keys in registration order
    pub fn keys(&self) -> Vec<String> {
        self.inner.registry.lock().keys().map(str::to_string).collect()
    }

    /// Registry entries in registration order
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.registry.lock().all().to_vec()
    }

    /// Whether the backend's data loaded at startup
    pub fn data_loaded(&self) -> bool {
        self.inner.data_loaded.load(Ordering::SeqCst)
    }

    /// When the backend last accepted a write
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_saved_at.lock()
    }

    /// Subscribe to store events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// The bound backend's kind
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Current scheduler state
    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    /// Enable compression with a threshold and optional key allow-list
    pub fn enable_compression(&self, threshold: usize, keys: Vec<String>) {
        self.inner.codec.write().enable(threshold, keys);
    }

    /// Disable compression of outgoing payloads
    pub fn disable_compression(&self) {
        self.inner.codec.write().disable();
    }

    /// Toggle compression logging
    pub fn set_compression_logging(&self, enabled: bool) {
        self.inner.codec.write().set_logging(enabled);
    }

    /// Current codec status
    pub fn compression_status(&self) -> CompressionStatus {
        self.inner.codec.read().status()
    }

    /// Compress a payload with the store's codec
    pub fn compress(&self, payload: &str) -> String {
        self.inner.codec.read().compress(payload)
    }

    /// Decompress a payload with the store's codec
    pub fn decompress(&self, payload: &str) -> String {
        self.inner.codec.read().decompress(payload)
    }

    /// Whether the raw form of a key is a compressed payload
    pub async fn is_compressed(&self, key: &str) -> bool {
        self.get_raw(key).await.is_some_and(|raw| codec::is_tagged(&raw))
    }
}
