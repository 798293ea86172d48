use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EntityRef, NewVersion, VersionRecord};

/// The storage trait for Verso history backends.
///
/// A `VersionStorage` implementation provides durable, append-only storage
/// for version records. The history engine never updates or deletes a
/// committed record.
///
/// ## Ordering
///
/// Versions of one entity are totally ordered by `(created_at, sequence_id)`.
/// `append_version` assigns a `sequence_id` strictly greater than any the
/// backend has assigned before, and rejects a draft whose `created_at`
/// precedes the latest committed version of the same entity with
/// `StorageError::OutOfOrder`. Equal timestamps are allowed; the sequence
/// id breaks the tie.
///
/// ## Atomicity
///
/// `append_version` is all-or-nothing. When it returns an error, no part of
/// the draft is visible to later reads.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one backend can be
/// shared between engines and across async task boundaries.
#[async_trait]
pub trait VersionStorage: Send + Sync + 'static {
    /// Commit a draft and return the committed record.
    async fn append_version(&self, draft: NewVersion) -> Result<VersionRecord, StorageError>;

    /// All committed versions of `entity`, in ascending
    /// `(created_at, sequence_id)` order. Empty if the entity has no history.
    async fn list_versions(&self, entity: &EntityRef) -> Result<Vec<VersionRecord>, StorageError>;

    /// The most recent committed version of `entity`, if any.
    async fn latest_version(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<VersionRecord>, StorageError> {
        Ok(self.list_versions(entity).await?.pop())
    }
}
