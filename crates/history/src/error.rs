use time::OffsetDateTime;
use verso_model::SnapshotError;
use verso_storage::{EntityRef, StorageError};

/// Errors surfaced by the history engine.
///
/// Every failure propagates to the caller unchanged; the engine neither
/// retries nor substitutes defaults.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// No committed version can reconstruct the entity at `at`.
    #[error("no version of {entity} covers {at}")]
    NotFound {
        entity: EntityRef,
        at: OffsetDateTime,
    },

    /// The entity's latest version is a `destroy`; only a new `create` may
    /// follow it.
    #[error("{entity} was destroyed; no further changes can be recorded")]
    Destroyed { entity: EntityRef },

    /// The persistence collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A decoded snapshot does not fit the entity's shape.
    #[error("cannot reify {entity} from version {sequence_id}: {source}")]
    Reify {
        entity: EntityRef,
        sequence_id: u64,
        #[source]
        source: serde_json::Error,
    },
}
