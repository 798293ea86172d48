//! Verso value model -- attribute maps, the snapshot codec, and the
//! attribute-level diff used to build audit trails.
//!
//! Everything here is pure and synchronous. Storage and the history engine
//! build on these types.

pub mod attributes;
pub mod diff;

pub use attributes::{decode_snapshot, encode_snapshot, AttributeMap, SnapshotError};
pub use diff::{diff, AttributeChange, ChangeSet};
