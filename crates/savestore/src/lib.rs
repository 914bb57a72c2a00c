//! Game save synchronization engine
//!
//! This crate keeps named save values in memory, persists them to one of two
//! backends (a local sled store or a remote player account), compresses large
//! payloads, and coalesces bursts of save requests into a single write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod kv;
pub mod normalize;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod transfer;

pub use backend::{Backend, BackendError, BackendKind, LocalBackend, RemoteBackend, RemoteSession};
pub use codec::{Codec, CompressionConfig, CompressionStatus};
pub use config::SaveConfig;
pub use kv::{KvConfig, KvStore};
pub use registry::Entry;
pub use scheduler::SchedulerState;
pub use store::{FlushOutcome, SaveError, SaveStore, SyncEvent};
pub use transfer::{ExportDocument, ImportReport, SaveStats};
