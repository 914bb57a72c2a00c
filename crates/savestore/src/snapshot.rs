//! Flush snapshots
//!
//! A snapshot is the exact set of (persisted key, payload) pairs a flush would
//! send to the backend. Two generations are kept: `pending`, computed on each
//! flush attempt, and `committed`, the last set the backend accepted. A flush
//! only writes when the two differ.

use serde_json::Value;
use std::collections::HashMap;

use crate::codec::Codec;
use crate::normalize;
use crate::registry::Registry;

/// Persisted key/payload pairs in registry order
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(String, String)>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from pairs
    pub fn from_entries(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Entries in registry order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Payload recorded for a persisted key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compare two snapshots
///
/// Both must hold the same key set and byte-identical payloads per key.
pub fn equals(a: &Snapshot, b: &Snapshot) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let lookup: HashMap<&str, &str> =
        b.entries.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    a.entries
        .iter()
        .all(|(k, v)| lookup.get(k.as_str()).is_some_and(|other| *other == v.as_str()))
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

/// Compute the snapshot for the current in-memory state
///
/// Walks the registry in order, serializes each entry's current value and
/// routes it through the codec when it qualifies. Keys with no in-memory
/// value are left out.
pub fn compute_pending<F>(registry: &Registry, prefix: &str, codec: &Codec, mut read: F) -> Snapshot
where
    F: FnMut(&str) -> Option<Value>,
{
    let mut entries = Vec::with_capacity(registry.len());

    for entry in registry.all() {
        let Some(value) = read(&entry.key) else {
            continue;
        };

        let serialized = normalize::serialize(&value);
        let payload = codec.encode_for_storage(&entry.key, serialized);
        entries.push((format!("{}{}", prefix, entry.key), payload));
    }

    Snapshot { entries }
}

/// The two snapshot generations
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    pending: Snapshot,
    committed: Snapshot,
}

impl SnapshotStore {
    /// Create a store with both generations empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending generation
    pub fn set_pending(&mut self, snapshot: Snapshot) {
        self.pending = snapshot;
    }

    /// The pending generation
    pub fn pending(&self) -> &Snapshot {
        &self.pending
    }

    /// The committed generation
    pub fn committed(&self) -> &Snapshot {
        &self.committed
    }

    /// Check whether pending differs from committed
    pub fn has_changes(&self) -> bool {
        !equals(&self.pending, &self.committed)
    }

    /// Mark the pending generation as accepted by the backend
    pub fn promote(&mut self) {
        self.committed = self.pending.clone();
    }
}
