use time::OffsetDateTime;

use crate::record::EntityRef;

/// All errors that can be returned by a VersionStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The draft's timestamp precedes the latest committed version for the
    /// same entity. Committing it would break per-entity ordering.
    #[error("out-of-order version for {entity}: {created_at} precedes latest {latest}")]
    OutOfOrder {
        entity: EntityRef,
        created_at: OffsetDateTime,
        latest: OffsetDateTime,
    },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
