//! Persistence backends
//!
//! Exactly one backend is bound to a [`SaveStore`](crate::SaveStore) when it is
//! opened, and it is never swapped afterwards. Two variants exist:
//!
//! - [`LocalBackend`]: the device-bound store, backed by sled
//! - [`RemoteBackend`]: the account-bound store, reached through a
//!   [`RemoteSession`]
//!
//! Every key passed to a backend is already a persisted key (prefix included).

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::kv::KvError;

pub mod local;
pub mod remote;

pub use local::LocalBackend;
pub use remote::{RemoteBackend, RemoteSession, RetryPolicy};

#[cfg(test)]
pub use remote::MockRemoteSession;

/// Backend error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Local store error
    #[error("Local store error: {0}")]
    Kv(#[from] KvError),

    /// No live account session
    #[error("Remote session unavailable")]
    SessionUnavailable,

    /// Remote call failed
    #[error("Remote error: {0}")]
    Remote(String),

    /// Remote data could not be loaded after retrying
    #[error("Failed to load remote data after {attempts} attempts")]
    LoadFailed {
        /// Number of attempts made
        attempts: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Which concrete store a backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Device-bound local store
    Local,
    /// Account-bound remote store
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// Uniform interface over the concrete stores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// The concrete store behind this backend
    fn kind(&self) -> BackendKind;

    /// Whether writes may be deferred by the scheduler
    ///
    /// Backends whose medium can disappear at any moment return `false` and
    /// get flushed on every save request.
    fn can_defer(&self) -> bool;

    /// Load every persisted entry whose key starts with `prefix`
    async fn load_all(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Read one persisted value
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a full set of entries in one operation
    ///
    /// The write is all-or-nothing: on error nothing is considered written.
    async fn write_bulk(&self, entries: &[(String, String)]) -> Result<()>;

    /// Delete one persisted value
    async fn delete(&self, key: &str) -> Result<()>;
}
