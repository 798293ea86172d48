//! Audit trail construction.
//!
//! An audit trail lists the changes an entity went through, newest first.
//! Each entry pairs an older version with its successor (or with the live
//! entity, for the newest version) and diffs their snapshots.

use std::collections::BTreeSet;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use verso_model::{diff, AttributeMap, ChangeSet, SnapshotError};
use verso_storage::{Event, VersionRecord, VersionStorage};

use crate::entity::Tracked;
use crate::error::HistoryError;
use crate::history::History;

/// Attributes left out of audit diffs unless the caller says otherwise.
pub const DEFAULT_AUDIT_IGNORE: &[&str] = &["updated_at"];

/// One human-facing change summary.
///
/// `A` is the actor identity: the raw stored actor token by default, or
/// whatever the host's resolver maps it to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry<A = Option<String>> {
    pub event: Event,
    pub changed_by: A,
    #[serde(with = "time::serde::rfc3339")]
    pub changed_at: OffsetDateTime,
    pub changes: ChangeSet,
}

impl AuditEntry {
    /// Format the entry as a heading line followed by indented change lines.
    pub fn to_text(&self) -> String {
        let at = self
            .changed_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.changed_at.to_string());
        let by = self.changed_by.as_deref().unwrap_or("unknown");
        let mut lines = vec![format!("{at} {} by {by}", self.event)];
        let body = self.changes.to_text();
        lines.extend(body.lines().map(|l| format!("    {l}")));
        lines.join("\n")
    }
}

/// A snapshot in the descending walk: a real version or the live entity.
struct Step<'a> {
    event: Event,
    actor: Option<&'a str>,
    created_at: OffsetDateTime,
    attributes: AttributeMap,
}

/// Build an audit trail from ascending `versions` plus the live state.
///
/// Empty history yields an empty trail. Otherwise there is one entry per
/// real version: each is diffed against its successor, the newest against
/// `current`.
pub fn build_audit_trail<A, R>(
    versions: &[VersionRecord],
    current: AttributeMap,
    current_at: OffsetDateTime,
    ignored: &BTreeSet<String>,
    resolve: R,
) -> Result<Vec<AuditEntry<A>>, SnapshotError>
where
    R: Fn(Option<&str>) -> A,
{
    if versions.is_empty() {
        return Ok(Vec::new());
    }

    let mut steps = Vec::with_capacity(versions.len() + 1);
    for v in versions {
        steps.push(Step {
            event: v.event,
            actor: v.actor.as_deref(),
            created_at: v.created_at,
            attributes: v.attributes()?,
        });
    }
    // Pseudo-version for the live entity, so the newest change can be
    // diffed against "now".
    steps.push(Step {
        event: Event::Update,
        actor: None,
        created_at: current_at,
        attributes: current,
    });
    steps.reverse();

    let trail = steps
        .windows(2)
        .map(|pair| {
            let (newer, older) = (&pair[0], &pair[1]);
            AuditEntry {
                event: older.event,
                changed_by: resolve(older.actor),
                changed_at: older.created_at,
                changes: diff(&older.attributes, &newer.attributes, ignored),
            }
        })
        .collect();
    Ok(trail)
}

/// The default ignore set for audit diffs.
pub fn default_audit_ignore() -> BTreeSet<String> {
    DEFAULT_AUDIT_IGNORE.iter().map(|s| s.to_string()).collect()
}

impl<S, E> History<S, E>
where
    S: VersionStorage,
    E: Tracked,
{
    /// The entity's audit trail, newest change first, ignoring `updated_at`
    /// and reporting raw actor tokens.
    pub async fn audit_trail(&self, entity: &E) -> Result<Vec<AuditEntry>, HistoryError> {
        self.audit_trail_with(entity, &default_audit_ignore(), |actor| {
            actor.map(str::to_owned)
        })
        .await
    }

    /// The entity's audit trail with a custom ignore set and actor resolver.
    pub async fn audit_trail_with<A, R>(
        &self,
        entity: &E,
        ignored: &BTreeSet<String>,
        resolve: R,
    ) -> Result<Vec<AuditEntry<A>>, HistoryError>
    where
        R: Fn(Option<&str>) -> A,
    {
        let versions = self.versions_for(entity).await?;
        let trail = build_audit_trail(
            &versions,
            entity.attributes(),
            entity.updated_at(),
            ignored,
            resolve,
        )?;
        Ok(trail)
    }
}
