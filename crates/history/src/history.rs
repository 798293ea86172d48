//! The version store: captures a version on create, update, and destroy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use verso_model::{encode_snapshot, AttributeMap};
use verso_storage::{EntityRef, Event, Metadata, NewVersion, VersionRecord, VersionStorage};

use crate::clock::{Clock, SystemClock};
use crate::config::{HistorySwitch, TrackingConfig};
use crate::entity::{PendingChanges, Tracked};
use crate::error::HistoryError;

/// History engine for one tracked entity type.
///
/// All `record_*` calls for one entity instance must be serialized by the
/// host, in the order the lifecycle events occur.
pub struct History<S, E> {
    storage: Arc<S>,
    config: TrackingConfig<E>,
    switch: HistorySwitch,
    tracking: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl<S, E> History<S, E>
where
    S: VersionStorage,
    E: Tracked,
{
    pub fn new(storage: Arc<S>, config: TrackingConfig<E>) -> Self {
        let tracking = AtomicBool::new(config.options.enabled);
        Self {
            storage,
            config,
            switch: HistorySwitch::new(),
            tracking,
            clock: Arc::new(SystemClock),
        }
    }

    /// Share a process-wide switch with other engines.
    pub fn with_switch(mut self, switch: HistorySwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// The configuration this engine was built with.
    ///
    /// `options.enabled` is only the initial per-type flag; after
    /// [`set_tracking`](Self::set_tracking) use [`is_tracking`](Self::is_tracking).
    pub fn config(&self) -> &TrackingConfig<E> {
        &self.config
    }

    pub fn switch(&self) -> &HistorySwitch {
        &self.switch
    }

    /// Toggle the per-type tracking flag.
    pub fn set_tracking(&self, enabled: bool) {
        self.tracking.store(enabled, Ordering::Release);
    }

    /// The current per-type tracking flag.
    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// True when both the global switch and the per-type flag are on.
    pub fn is_active(&self) -> bool {
        self.switch.is_enabled() && self.is_tracking()
    }

    /// Record a `create` event carrying the entity's full current state.
    ///
    /// Returns `None` without touching storage when history is inactive.
    pub async fn record_create(
        &self,
        entity: &E,
        actor: Option<&str>,
        metadata: Metadata,
    ) -> Result<Option<VersionRecord>, HistoryError> {
        if !self.is_active() {
            debug!(entity = %entity.entity_ref(), "history inactive, create not recorded");
            return Ok(None);
        }
        let snapshot = entity.attributes();
        self.commit(entity, Event::Create, &snapshot, actor, metadata)
            .await
            .map(Some)
    }

    /// Record an `update` event carrying the pre-image.
    ///
    /// `entity` holds the new, not yet durable, state; `changes` carries the
    /// prior values of the changed attributes. Must be called before the host
    /// commits the new state. Returns `None` when history is inactive or when
    /// only ignored attributes changed, and [`HistoryError::Destroyed`] when
    /// the entity's latest version is a `destroy`.
    pub async fn record_update(
        &self,
        entity: &E,
        changes: &PendingChanges,
        actor: Option<&str>,
        metadata: Metadata,
    ) -> Result<Option<VersionRecord>, HistoryError> {
        if !self.is_active() {
            debug!(entity = %entity.entity_ref(), "history inactive, update not recorded");
            return Ok(None);
        }
        if !self.config.is_relevant(changes.names()) {
            debug!(
                entity = %entity.entity_ref(),
                changed = ?changes.names().collect::<Vec<_>>(),
                "no relevant attribute changed, update not recorded"
            );
            return Ok(None);
        }
        self.ensure_not_destroyed(entity).await?;
        let pre_image = changes.pre_image(entity.attributes());
        self.commit(entity, Event::Update, &pre_image, actor, metadata)
            .await
            .map(Some)
    }

    /// Record a `destroy` event carrying the state just before removal.
    ///
    /// Fails with [`HistoryError::Destroyed`] if the entity is already
    /// destroyed.
    pub async fn record_destroy(
        &self,
        entity: &E,
        actor: Option<&str>,
        metadata: Metadata,
    ) -> Result<Option<VersionRecord>, HistoryError> {
        if !self.is_active() {
            debug!(entity = %entity.entity_ref(), "history inactive, destroy not recorded");
            return Ok(None);
        }
        self.ensure_not_destroyed(entity).await?;
        let snapshot = entity.attributes();
        self.commit(entity, Event::Destroy, &snapshot, actor, metadata)
            .await
            .map(Some)
    }

    /// All committed versions of `entity`, oldest first.
    pub async fn versions_for(&self, entity: &E) -> Result<Vec<VersionRecord>, HistoryError> {
        self.versions_for_ref(&entity.entity_ref()).await
    }

    /// Like [`versions_for`](Self::versions_for), for an entity that may no
    /// longer exist.
    pub async fn versions_for_ref(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<VersionRecord>, HistoryError> {
        Ok(self.storage.list_versions(entity).await?)
    }

    /// The version committed immediately before `version` for the same entity.
    pub async fn previous_version(
        &self,
        version: &VersionRecord,
    ) -> Result<Option<VersionRecord>, HistoryError> {
        let mut versions = self.versions_for_ref(&version.entity).await?;
        let index = versions
            .iter()
            .position(|v| v.sequence_id == version.sequence_id);
        Ok(match index {
            Some(i) if i > 0 => Some(versions.swap_remove(i - 1)),
            _ => None,
        })
    }

    /// The version committed immediately after `version` for the same entity.
    pub async fn next_version(
        &self,
        version: &VersionRecord,
    ) -> Result<Option<VersionRecord>, HistoryError> {
        let mut versions = self.versions_for_ref(&version.entity).await?;
        let index = versions
            .iter()
            .position(|v| v.sequence_id == version.sequence_id);
        Ok(match index {
            Some(i) if i + 1 < versions.len() => Some(versions.swap_remove(i + 1)),
            _ => None,
        })
    }

    async fn ensure_not_destroyed(&self, entity: &E) -> Result<(), HistoryError> {
        let entity = entity.entity_ref();
        match self.storage.latest_version(&entity).await? {
            Some(latest) if latest.event == Event::Destroy => {
                debug!(entity = %entity, "entity destroyed, change rejected");
                Err(HistoryError::Destroyed { entity })
            }
            _ => Ok(()),
        }
    }

    async fn commit(
        &self,
        entity: &E,
        event: Event,
        snapshot: &AttributeMap,
        actor: Option<&str>,
        extra: Metadata,
    ) -> Result<VersionRecord, HistoryError> {
        let mut metadata = self.config.evaluate_metadata(entity);
        metadata.extend(extra);

        let draft = NewVersion {
            entity: entity.entity_ref(),
            event,
            snapshot: Some(encode_snapshot(snapshot)?),
            actor: actor.map(str::to_owned),
            metadata,
            created_at: self.clock.now(),
        };
        let record = self.storage.append_version(draft).await?;
        debug!(
            entity = %record.entity,
            event = %record.event,
            sequence_id = record.sequence_id,
            "version committed"
        );
        Ok(record)
    }
}
