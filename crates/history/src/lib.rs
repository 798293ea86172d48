//! Verso version history engine.
//!
//! Captures a version whenever a tracked entity is created, updated, or
//! destroyed; reconstructs the entity's state at any past moment; and builds
//! a newest-first audit trail of attribute-level changes.
//!
//! The engine is generic over a [`VersionStorage`](verso_storage::VersionStorage)
//! backend and a host entity type implementing [`Tracked`]. The host decides
//! when to call the `record_*` operations relative to its own writes.

pub mod audit;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod history;
pub mod reify;

pub use audit::{build_audit_trail, default_audit_ignore, AuditEntry, DEFAULT_AUDIT_IGNORE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HistorySwitch, MetadataValue, SuspendGuard, TrackingConfig, TrackingOptions};
pub use entity::{PendingChanges, Tracked};
pub use error::HistoryError;
pub use history::History;
pub use reify::{reify, AsOf, Reified};

pub use verso_model::{diff, AttributeChange, AttributeMap, ChangeSet};
pub use verso_storage::{EntityRef, Event, Metadata, VersionRecord};
