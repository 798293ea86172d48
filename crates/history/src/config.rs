//! Tracking configuration: the global enable switch, per-type options, and
//! metadata declarations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use verso_storage::Metadata;

/// Process-wide history enable flag, on by default.
///
/// Clones share one flag, so a host hands the same switch to every engine it
/// builds and can suspend capture everywhere at once (e.g. during a bulk
/// import).
#[derive(Debug, Clone)]
pub struct HistorySwitch {
    enabled: Arc<AtomicBool>,
}

impl Default for HistorySwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl HistorySwitch {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Disable history until the returned guard is dropped, then restore the
    /// previous setting.
    pub fn suspend(&self) -> SuspendGuard {
        let previous = self.enabled.swap(false, Ordering::AcqRel);
        SuspendGuard {
            switch: self.clone(),
            previous,
        }
    }
}

/// Restores a [`HistorySwitch`] on drop.
#[must_use = "history is re-enabled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuspendGuard {
    switch: HistorySwitch,
    previous: bool,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.switch
            .enabled
            .store(self.previous, Ordering::Release);
    }
}

/// Static per-entity-type options.
///
/// Deserializable so a host can keep them alongside its own configuration.
/// Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    /// Per-type tracking flag.
    pub enabled: bool,
    /// Attributes whose changes alone never produce an update version.
    pub ignore: BTreeSet<String>,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: BTreeSet::new(),
        }
    }
}

/// A metadata entry: a fixed value, or a computation over the entity
/// evaluated when the version is committed.
pub enum MetadataValue<E> {
    Value(Value),
    Computed(Arc<dyn Fn(&E) -> Value + Send + Sync>),
}

impl<E> MetadataValue<E> {
    fn resolve(&self, entity: &E) -> Value {
        match self {
            MetadataValue::Value(v) => v.clone(),
            MetadataValue::Computed(f) => f(entity),
        }
    }
}

impl<E> Clone for MetadataValue<E> {
    fn clone(&self) -> Self {
        match self {
            MetadataValue::Value(v) => MetadataValue::Value(v.clone()),
            MetadataValue::Computed(f) => MetadataValue::Computed(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for MetadataValue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            MetadataValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Full per-entity-type configuration, fixed at registration.
pub struct TrackingConfig<E> {
    pub options: TrackingOptions,
    metadata: BTreeMap<String, MetadataValue<E>>,
}

impl<E> Default for TrackingConfig<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for TrackingConfig<E> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<E> fmt::Debug for TrackingConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingConfig")
            .field("options", &self.options)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<E> TrackingConfig<E> {
    pub fn new() -> Self {
        Self::from_options(TrackingOptions::default())
    }

    pub fn from_options(options: TrackingOptions) -> Self {
        Self {
            options,
            metadata: BTreeMap::new(),
        }
    }

    /// Start with the per-type tracking flag off.
    pub fn disabled(mut self) -> Self {
        self.options.enabled = false;
        self
    }

    pub fn ignore(mut self, attribute: impl Into<String>) -> Self {
        self.options.ignore.insert(attribute.into());
        self
    }

    pub fn metadata_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .insert(key.into(), MetadataValue::Value(value.into()));
        self
    }

    pub fn metadata_with<F>(mut self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&E) -> Value + Send + Sync + 'static,
    {
        self.metadata
            .insert(key.into(), MetadataValue::Computed(Arc::new(compute)));
        self
    }

    /// Resolve every metadata entry against `entity`.
    pub fn evaluate_metadata(&self, entity: &E) -> Metadata {
        self.metadata
            .iter()
            .map(|(key, value)| (key.clone(), value.resolve(entity)))
            .collect()
    }

    /// A change is relevant iff at least one changed attribute is outside
    /// the ignore set. No changes at all is never relevant.
    pub fn is_relevant<'a>(&self, mut changed: impl Iterator<Item = &'a str>) -> bool {
        changed.any(|name| !self.options.ignore.contains(name))
    }
}
