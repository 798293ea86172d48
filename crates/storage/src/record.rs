use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use verso_model::{decode_snapshot, AttributeMap, SnapshotError};

/// Extra key/value data attached to a version at commit time.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Names the tracked entity a version belongs to: a type tag plus a
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub item_type: String,
    pub item_id: String,
}

impl EntityRef {
    pub fn new(item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_type, self.item_id)
    }
}

/// The lifecycle event a version documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Create,
    Update,
    Destroy,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Create => "create",
            Event::Update => "update",
            Event::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version that has been built but not yet committed.
///
/// The backend assigns `sequence_id` when it commits the draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVersion {
    pub entity: EntityRef,
    pub event: Event,
    /// Encoded attribute map. For `create` this is the post-image; for
    /// `update` and `destroy` it is the pre-image.
    pub snapshot: Option<String>,
    pub actor: Option<String>,
    pub metadata: Metadata,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl NewVersion {
    /// Attach the backend-assigned sequence id, producing the committed record.
    pub fn commit(self, sequence_id: u64) -> VersionRecord {
        VersionRecord {
            sequence_id,
            entity: self.entity,
            event: self.event,
            snapshot: self.snapshot,
            actor: self.actor,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

/// A committed, immutable version of a tracked entity.
///
/// Versions of one entity are totally ordered by `(created_at, sequence_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Strictly increasing per write; breaks ties between equal timestamps.
    pub sequence_id: u64,
    pub entity: EntityRef,
    pub event: Event,
    pub snapshot: Option<String>,
    pub actor: Option<String>,
    pub metadata: Metadata,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl VersionRecord {
    /// The total-order key for versions of the same entity.
    pub fn order_key(&self) -> (OffsetDateTime, u64) {
        (self.created_at, self.sequence_id)
    }

    /// Decode the stored snapshot. An absent snapshot decodes to an empty map.
    pub fn attributes(&self) -> Result<AttributeMap, SnapshotError> {
        decode_snapshot(self.snapshot.as_deref())
    }
}
