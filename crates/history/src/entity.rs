//! The host-side view of a tracked entity.

use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;
use verso_model::AttributeMap;
use verso_storage::EntityRef;

/// A mutable entity whose history is recorded.
///
/// Implemented by the host for each tracked type. Reification additionally
/// requires the type to implement `serde::de::DeserializeOwned`, so that a
/// stored attribute map can be turned back into an instance.
pub trait Tracked {
    /// Stable identity: type tag plus primary key.
    fn entity_ref(&self) -> EntityRef;

    /// The entity's current attribute state.
    fn attributes(&self) -> AttributeMap;

    /// Last-modified marker.
    fn updated_at(&self) -> OffsetDateTime;
}

/// The attributes an in-flight mutation changes, with their prior values.
///
/// Supplied by the host's own change tracking when it calls
/// `record_update`. `None` as a prior value means the attribute did not
/// exist before the mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    previous: BTreeMap<String, Option<Value>>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name` changed from `previous`.
    pub fn changed(mut self, name: impl Into<String>, previous: Value) -> Self {
        self.previous.insert(name.into(), Some(previous));
        self
    }

    /// Record that `name` was added by the mutation.
    pub fn added(mut self, name: impl Into<String>) -> Self {
        self.previous.insert(name.into(), None);
        self
    }

    /// Derive the pending changes between two full attribute maps.
    pub fn between(before: &AttributeMap, after: &AttributeMap) -> Self {
        let mut previous = BTreeMap::new();
        for (name, old) in before {
            if after.get(name) != Some(old) {
                previous.insert(name.clone(), Some(old.clone()));
            }
        }
        for name in after.keys() {
            if !before.contains_key(name) {
                previous.insert(name.clone(), None);
            }
        }
        Self { previous }
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    /// Names of the changed attributes, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.previous.keys().map(String::as_str)
    }

    /// Roll `current` back to the state before the mutation.
    pub fn pre_image(&self, mut current: AttributeMap) -> AttributeMap {
        for (name, previous) in &self.previous {
            match previous {
                Some(value) => {
                    current.insert(name.clone(), value.clone());
                }
                None => {
                    current.remove(name);
                }
            }
        }
        current
    }
}
