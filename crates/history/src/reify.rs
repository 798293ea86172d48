//! Reconstructing historical entity state from stored versions.

use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::trace;
use verso_model::AttributeMap;
use verso_storage::{EntityRef, Event, VersionRecord, VersionStorage};

use crate::entity::Tracked;
use crate::error::HistoryError;
use crate::history::History;

/// A detached entity rebuilt from a stored version.
///
/// Offers read access to the rebuilt entity but no way to hand it back to
/// the host as if it were live. Call [`into_detached`](Self::into_detached)
/// to take ownership of the plain value.
#[derive(Debug, Clone)]
pub struct Reified<E> {
    entity: E,
    attributes: AttributeMap,
    version: VersionRecord,
}

impl<E> Reified<E> {
    /// Always true; lets generic callers tell reconstructions from live rows.
    pub fn is_reified(&self) -> bool {
        true
    }

    /// The exact attribute map decoded from the version's snapshot.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// The version this entity was rebuilt from.
    pub fn version(&self) -> &VersionRecord {
        &self.version
    }

    pub fn into_detached(self) -> E {
        self.entity
    }
}

impl<E> Deref for Reified<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

/// An entity as of some point in time.
#[derive(Debug)]
pub enum AsOf<'a, E> {
    /// Nothing changed since the requested time; the live entity applies.
    Current(&'a E),
    Reified(Reified<E>),
}

impl<E> AsOf<'_, E> {
    pub fn is_current(&self) -> bool {
        matches!(self, AsOf::Current(_))
    }
}

/// Deserialize `version`'s snapshot into an entity of type `E`.
pub fn reify<E: DeserializeOwned>(version: &VersionRecord) -> Result<Reified<E>, HistoryError> {
    let attributes = version.attributes()?;
    let object = Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    let entity = serde_json::from_value(object).map_err(|source| HistoryError::Reify {
        entity: version.entity.clone(),
        sequence_id: version.sequence_id,
        source,
    })?;
    Ok(Reified {
        entity,
        attributes,
        version: version.clone(),
    })
}

impl<S, E> History<S, E>
where
    S: VersionStorage,
    E: Tracked,
{
    /// The version whose snapshot holds the entity's state at `at`.
    ///
    /// That is the earliest version committed strictly after `at`: its
    /// snapshot is the pre-image of the first change after `at`. A `create`
    /// version committed after `at` means the entity did not exist yet, so
    /// the result is `NotFound`, as it is when no version follows `at`.
    pub async fn version_at(
        &self,
        entity: &EntityRef,
        at: OffsetDateTime,
    ) -> Result<VersionRecord, HistoryError> {
        match self.covering_version(entity, at).await? {
            Covering::Version(version) => Ok(version),
            Covering::Live => Err(HistoryError::NotFound {
                entity: entity.clone(),
                at,
            }),
        }
    }

    /// The entity's attribute state as of `at`.
    ///
    /// When no version follows `at` but history began at or before it, no
    /// recorded change has happened since and the live attributes apply.
    pub async fn state_at(
        &self,
        entity: &E,
        at: OffsetDateTime,
    ) -> Result<AttributeMap, HistoryError> {
        if entity.updated_at() <= at {
            return Ok(entity.attributes());
        }
        match self.covering_version(&entity.entity_ref(), at).await? {
            Covering::Version(version) => Ok(version.attributes()?),
            Covering::Live => Ok(entity.attributes()),
        }
    }

    /// Rebuild a detached entity from `version`.
    pub fn reify(&self, version: &VersionRecord) -> Result<Reified<E>, HistoryError>
    where
        E: DeserializeOwned,
    {
        reify(version)
    }

    /// The entity as of `at`: the live entity if unchanged since, otherwise
    /// a reified copy.
    pub async fn entity_at<'a>(
        &self,
        entity: &'a E,
        at: OffsetDateTime,
    ) -> Result<AsOf<'a, E>, HistoryError>
    where
        E: DeserializeOwned,
    {
        if entity.updated_at() <= at {
            return Ok(AsOf::Current(entity));
        }
        match self.covering_version(&entity.entity_ref(), at).await? {
            Covering::Version(version) => Ok(AsOf::Reified(reify(&version)?)),
            Covering::Live => Ok(AsOf::Current(entity)),
        }
    }

    /// The state of a destroyed entity just before removal, if its latest
    /// version is a `destroy`.
    pub async fn latest_destroyed(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<Reified<E>>, HistoryError>
    where
        E: DeserializeOwned,
    {
        match self.storage().latest_version(entity).await? {
            Some(version) if version.event == Event::Destroy => Ok(Some(reify(&version)?)),
            _ => Ok(None),
        }
    }

    async fn covering_version(
        &self,
        entity: &EntityRef,
        at: OffsetDateTime,
    ) -> Result<Covering, HistoryError> {
        let versions = self.versions_for_ref(entity).await?;
        let started = versions.first().is_some_and(|v| v.created_at <= at);
        let found = versions.into_iter().find(|v| v.created_at > at);
        trace!(
            entity = %entity,
            %at,
            found = ?found.as_ref().map(|v| v.sequence_id),
            "version lookup"
        );
        match found {
            Some(version) if version.event != Event::Create => Ok(Covering::Version(version)),
            None if started => Ok(Covering::Live),
            _ => Err(HistoryError::NotFound {
                entity: entity.clone(),
                at,
            }),
        }
    }
}

/// Where the state at some instant lives.
enum Covering {
    /// No recorded change since; the live entity is the state.
    Live,
    /// The pre-image held by this version.
    Version(VersionRecord),
}
