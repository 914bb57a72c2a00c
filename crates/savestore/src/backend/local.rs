//! Local device backend

use async_trait::async_trait;

use super::{Backend, BackendKind, Result};
use crate::kv::{KvConfig, KvStore};

/// Backend writing to the durable local key-value store
#[derive(Clone)]
pub struct LocalBackend {
    kv: KvStore,
    deferrable: bool,
}

impl LocalBackend {
    /// Wrap an open key-value store
    pub fn new(kv: KvStore) -> Self {
        Self { kv, deferrable: true }
    }

    /// Open the key-value store described by `config`
    pub fn open(config: KvConfig) -> Result<Self> {
        Ok(Self::new(KvStore::open(config)?))
    }

    /// Create a backend over a temporary store (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(KvStore::in_memory()?))
    }

    /// Flush on every save request instead of debouncing
    ///
    /// Used when the hosting medium may be torn down without notice.
    pub fn immediate(mut self) -> Self {
        self.deferrable = false;
        self
    }

    /// The underlying key-value store
    pub fn kv(&self) -> &KvStore {
        &self.kv
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn can_defer(&self) -> bool {
        self.deferrable
    }

    async fn load_all(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self.kv.scan_prefix(prefix)?)
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv.get(key)?)
    }

    async fn write_bulk(&self, entries: &[(String, String)]) -> Result<()> {
        self.kv.set_many(entries)?;
        tracing::debug!(entries = entries.len(), "wrote save entries to local store");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.kv.remove(key)?;
        Ok(())
    }
}
