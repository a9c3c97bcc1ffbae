//! In-memory registry of enrolled identities.
//!
//! Copy-on-write behind a reader-writer lock: readers clone an `Arc` of the
//! whole map, writers replace or mutate it under the write lock, so a snapshot
//! never mixes entries from before and after a mutation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RegistryError, RegistryResult};
use crate::types::Embedding;

/// Immutable view of every (label, embedding) entry at one point in time.
pub type Snapshot = Arc<BTreeMap<String, Embedding>>;

#[derive(Debug, Default)]
pub struct RegistryStore {
    entries: RwLock<Snapshot>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        // A panicking writer cannot leave a half-applied map: mutations are
        // single map operations or whole-Arc swaps.
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace the embedding for `label`.
    pub fn enroll(&self, label: &str, embedding: Embedding) {
        let mut entries = self.write();
        Arc::make_mut(&mut entries).insert(label.to_string(), embedding);
    }

    /// Remove `label`, failing with `NotFound` if it is not enrolled.
    pub fn revoke(&self, label: &str) -> RegistryResult<Embedding> {
        let mut entries = self.write();
        // Checked first so a miss never forces a copy of a shared map.
        if !entries.contains_key(label) {
            return Err(RegistryError::NotFound(label.to_string()));
        }
        Arc::make_mut(&mut entries)
            .remove(label)
            .ok_or_else(|| RegistryError::NotFound(label.to_string()))
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.read())
    }

    /// Every enrolled label, in lexicographic order.
    pub fn list_labels(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.read().contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Replace the whole registry in one step.
    pub fn rebuild(&self, entries: impl IntoIterator<Item = (String, Embedding)>) {
        let fresh: Snapshot = Arc::new(entries.into_iter().collect());
        *self.write() = fresh;
    }
}
