pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use record::{EntityRef, Event, Metadata, NewVersion, VersionRecord};
pub use traits::VersionStorage;
