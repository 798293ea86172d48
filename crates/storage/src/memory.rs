use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EntityRef, NewVersion, VersionRecord};
use crate::traits::VersionStorage;

/// In-memory `VersionStorage` backend.
///
/// Clones share the same underlying store. Write and read failures can be
/// injected to exercise error propagation in callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    versions: HashMap<EntityRef, Vec<VersionRecord>>,
    next_sequence: u64,
    fail_writes: bool,
    fail_reads: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append_version` fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every subsequent read fail with a backend error.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Total number of committed versions across all entities.
    pub fn len(&self) -> usize {
        self.lock().versions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // No mutation below can panic halfway, so a poisoned lock holds intact data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VersionStorage for MemoryStorage {
    async fn append_version(&self, draft: NewVersion) -> Result<VersionRecord, StorageError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StorageError::Backend(
                "injected write failure".to_string(),
            ));
        }

        if let Some(latest) = inner.versions.get(&draft.entity).and_then(|v| v.last()) {
            if draft.created_at < latest.created_at {
                return Err(StorageError::OutOfOrder {
                    entity: draft.entity,
                    created_at: draft.created_at,
                    latest: latest.created_at,
                });
            }
        }

        inner.next_sequence += 1;
        let record = draft.commit(inner.next_sequence);
        inner
            .versions
            .entry(record.entity.clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list_versions(&self, entity: &EntityRef) -> Result<Vec<VersionRecord>, StorageError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StorageError::Backend("injected read failure".to_string()));
        }
        // Appends are checked against the latest timestamp and sequence ids
        // only grow, so insertion order is already the total order.
        Ok(inner.versions.get(entity).cloned().unwrap_or_default())
    }
}
