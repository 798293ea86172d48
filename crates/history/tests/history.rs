//! End-to-end history tests against the in-memory backend.
//!
//! Covers recording on create/update/destroy, switch gating, point-in-time
//! reconstruction, reification, and audit trails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use verso_history::{
    AsOf, AttributeMap, EntityRef, Event, History, HistoryError, HistorySwitch, ManualClock,
    Metadata, PendingChanges, Tracked, TrackingConfig,
};
use verso_storage::{MemoryStorage, StorageError, VersionStorage};

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: u64,
    name: String,
    size: i64,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Tracked for Widget {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new("Widget", self.id.to_string())
    }

    fn attributes(&self) -> AttributeMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => AttributeMap::new(),
        }
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }
}

const T0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

fn t(hours: i64) -> OffsetDateTime {
    T0 + Duration::hours(hours)
}

struct Harness {
    clock: Arc<ManualClock>,
    storage: Arc<MemoryStorage>,
    history: History<MemoryStorage, Widget>,
}

fn harness(config: TrackingConfig<Widget>) -> Harness {
    let clock = Arc::new(ManualClock::new(t(1)));
    let storage = Arc::new(MemoryStorage::new());
    let history = History::new(storage.clone(), config).with_clock(clock.clone());
    Harness {
        clock,
        storage,
        history,
    }
}

fn widget(name: &str, at: OffsetDateTime) -> Widget {
    Widget {
        id: 1,
        name: name.to_string(),
        size: 10,
        updated_at: at,
    }
}

impl Harness {
    async fn create(&self, w: &Widget, actor: &str) {
        self.clock.set(w.updated_at);
        self.history
            .record_create(w, Some(actor), Metadata::new())
            .await
            .unwrap()
            .expect("create recorded");
    }

    /// Apply `mutate` at time `at`, recording the update first.
    async fn update(
        &self,
        w: &mut Widget,
        at: OffsetDateTime,
        actor: &str,
        mutate: impl FnOnce(&mut Widget),
    ) {
        let before = w.attributes();
        mutate(w);
        w.updated_at = at;
        self.clock.set(at);
        let changes = PendingChanges::between(&before, &w.attributes());
        self.history
            .record_update(w, &changes, Some(actor), Metadata::new())
            .await
            .unwrap();
    }
}

// ──────────────────────────────────────────────
// Recording
// ──────────────────────────────────────────────

#[tokio::test]
async fn create_stores_post_image() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(1));
    let record = h
        .history
        .record_create(&w, Some("alice"), Metadata::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.event, Event::Create);
    assert_eq!(record.actor.as_deref(), Some("alice"));
    assert_eq!(record.created_at, t(1));
    assert_eq!(record.attributes().unwrap(), w.attributes());
}

#[tokio::test]
async fn update_stores_pre_image() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    let original = w.attributes();

    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    let versions = h.history.versions_for(&w).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].event, Event::Update);
    assert_eq!(versions[1].attributes().unwrap(), original);
    assert_eq!(versions[1].created_at, t(2));
}

#[tokio::test]
async fn destroy_stores_state_before_removal() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.clock.set(t(3));

    let record = h
        .history
        .record_destroy(&w, Some("carol"), Metadata::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.event, Event::Destroy);
    assert_eq!(record.attributes().unwrap(), w.attributes());
}

#[tokio::test]
async fn ignored_only_change_records_nothing() {
    let h = harness(TrackingConfig::new().ignore("updated_at"));
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;

    // Touch: only updated_at changes.
    h.update(&mut w, t(2), "bob", |_| {}).await;
    assert_eq!(h.history.versions_for(&w).await.unwrap().len(), 1);

    h.update(&mut w, t(3), "bob", |w| w.size = 11).await;
    assert_eq!(h.history.versions_for(&w).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_change_set_records_nothing() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(1));
    let recorded = h
        .history
        .record_update(&w, &PendingChanges::new(), None, Metadata::new())
        .await
        .unwrap();
    assert!(recorded.is_none());
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn metadata_merges_config_and_call_values() {
    let config = TrackingConfig::new()
        .metadata_value("source", "web")
        .metadata_value("channel", "default")
        .metadata_with("size_at_commit", |w: &Widget| json!(w.size));
    let h = harness(config);
    let w = widget("A", t(1));

    let mut extra = Metadata::new();
    extra.insert("channel".to_string(), json!("api"));
    extra.insert("request_id".to_string(), json!("r-1"));
    let record = h
        .history
        .record_create(&w, None, extra)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.metadata.get("source"), Some(&json!("web")));
    assert_eq!(record.metadata.get("channel"), Some(&json!("api")));
    assert_eq!(record.metadata.get("request_id"), Some(&json!("r-1")));
    assert_eq!(record.metadata.get("size_at_commit"), Some(&json!(10)));
    assert_eq!(record.actor, None);
}

// ──────────────────────────────────────────────
// Switches
// ──────────────────────────────────────────────

#[tokio::test]
async fn global_switch_gates_every_operation() {
    let switch = HistorySwitch::new();
    let storage = Arc::new(MemoryStorage::new());
    let history: History<_, Widget> =
        History::new(storage.clone(), TrackingConfig::new()).with_switch(switch.clone());
    let w = widget("A", t(1));

    switch.disable();
    let created = history.record_create(&w, None, Metadata::new()).await;
    assert!(created.unwrap().is_none());
    let changes = PendingChanges::new().changed("name", json!("Z"));
    assert!(history
        .record_update(&w, &changes, None, Metadata::new())
        .await
        .unwrap()
        .is_none());
    let destroyed = history.record_destroy(&w, None, Metadata::new()).await;
    assert!(destroyed.unwrap().is_none());
    assert!(storage.is_empty());

    switch.enable();
    let created = history.record_create(&w, None, Metadata::new()).await;
    assert!(created.unwrap().is_some());
}

#[tokio::test]
async fn suspend_guard_spans_engines_sharing_a_switch() {
    let switch = HistorySwitch::new();
    let storage = Arc::new(MemoryStorage::new());
    let a: History<_, Widget> =
        History::new(storage.clone(), TrackingConfig::new()).with_switch(switch.clone());
    let b: History<_, Widget> =
        History::new(storage.clone(), TrackingConfig::new()).with_switch(switch.clone());
    let w = widget("A", t(1));

    {
        let _guard = switch.suspend();
        assert!(!a.is_active());
        assert!(!b.is_active());
        let created = b.record_create(&w, None, Metadata::new()).await;
        assert!(created.unwrap().is_none());
    }
    assert!(a.is_active());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn per_type_tracking_flag() {
    let h = harness(TrackingConfig::new().disabled());
    let w = widget("A", t(1));
    assert!(!h.history.is_active());
    let created = h.history.record_create(&w, None, Metadata::new()).await;
    assert!(created.unwrap().is_none());

    h.history.set_tracking(true);
    assert!(h.history.is_tracking());
    assert!(h.history.is_active());
    // The configured flag is only the starting value.
    assert!(!h.history.config().options.enabled);
    let created = h.history.record_create(&w, None, Metadata::new()).await;
    assert!(created.unwrap().is_some());

    h.history.set_tracking(false);
    assert!(!h.history.is_tracking());
    assert!(!h.history.is_active());
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[tokio::test]
async fn write_failure_propagates_and_commits_nothing() {
    let h = harness(TrackingConfig::new());
    h.storage.fail_writes(true);
    let err = h
        .history
        .record_create(&widget("A", t(1)), None, Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Storage(StorageError::Backend(_))));
    h.storage.fail_writes(false);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn read_failure_propagates_from_audit_trail() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.storage.fail_reads(true);
    let err = h.history.audit_trail(&w).await.unwrap_err();
    assert!(matches!(err, HistoryError::Storage(_)));
}

#[tokio::test]
async fn clock_running_backwards_is_rejected() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(5));
    h.create(&w, "alice").await;

    w.name = "B".to_string();
    h.clock.set(t(4));
    let changes = PendingChanges::new().changed("name", json!("A"));
    let err = h
        .history
        .record_update(&w, &changes, None, Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Storage(StorageError::OutOfOrder { .. })));
}

// ──────────────────────────────────────────────
// Point-in-time reconstruction
// ──────────────────────────────────────────────

#[tokio::test]
async fn state_at_or_after_last_change_is_live_state() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    for at in [t(2), t(3), t(100)] {
        assert_eq!(h.history.state_at(&w, at).await.unwrap(), w.attributes());
    }
}

#[tokio::test]
async fn state_between_versions_is_pre_image_of_next_change() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;
    h.update(&mut w, t(4), "carol", |w| w.size = 99).await;

    let state = h
        .history
        .state_at(&w, t(1) + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(state.get("name"), Some(&json!("A")));
    assert_eq!(state.get("size"), Some(&json!(10)));

    let state = h.history.state_at(&w, t(3)).await.unwrap();
    assert_eq!(state.get("name"), Some(&json!("B")));
    assert_eq!(state.get("size"), Some(&json!(10)));

    // At the instant of a change, that change has landed.
    let state = h.history.state_at(&w, t(2)).await.unwrap();
    assert_eq!(state.get("name"), Some(&json!("B")));
}

#[tokio::test]
async fn state_before_creation_is_not_found() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    let err = h.history.state_at(&w, T0).await.unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { at, .. } if at == T0));
}

#[tokio::test]
async fn state_without_history_is_not_found() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(5));
    let err = h.history.state_at(&w, t(1)).await.unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { .. }));
}

#[tokio::test]
async fn state_after_unrecorded_touch_is_live_state() {
    let h = harness(TrackingConfig::new().ignore("updated_at"));
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;

    // Touch: bumps updated_at without recording a version.
    h.update(&mut w, t(3), "bob", |_| {}).await;
    assert_eq!(h.history.versions_for(&w).await.unwrap().len(), 1);

    let state = h.history.state_at(&w, t(2)).await.unwrap();
    assert_eq!(state, w.attributes());
    assert_eq!(state.get("name"), Some(&json!("A")));
    assert!(h.history.entity_at(&w, t(2)).await.unwrap().is_current());

    // Before the create, the entity still did not exist.
    let err = h.history.state_at(&w, T0).await.unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { .. }));

    // version_at itself names a version, and none follows t(2).
    let err = h
        .history
        .version_at(&w.entity_ref(), t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { .. }));
}

#[tokio::test]
async fn entity_at_distinguishes_live_from_reified() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    match h.history.entity_at(&w, t(3)).await.unwrap() {
        AsOf::Current(live) => assert_eq!(live, &w),
        AsOf::Reified(_) => panic!("expected the live entity"),
    }

    match h.history.entity_at(&w, t(1)).await.unwrap() {
        AsOf::Reified(past) => {
            assert!(past.is_reified());
            assert_eq!(past.name, "A");
            assert_eq!(past.updated_at, t(1));
        }
        AsOf::Current(_) => panic!("expected a reified entity"),
    }
}

#[tokio::test]
async fn reify_attributes_equal_snapshot() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    for version in h.history.versions_for(&w).await.unwrap() {
        let reified = h.history.reify(&version).unwrap();
        assert_eq!(reified.attributes(), &version.attributes().unwrap());
        assert_eq!(reified.version(), &version);
    }
}

#[tokio::test]
async fn latest_destroyed_restores_removed_entity() {
    let h = harness(TrackingConfig::new());
    let w = widget("A", t(1));
    h.create(&w, "alice").await;
    assert!(h
        .history
        .latest_destroyed(&w.entity_ref())
        .await
        .unwrap()
        .is_none());

    h.clock.set(t(2));
    h.history
        .record_destroy(&w, None, Metadata::new())
        .await
        .unwrap();
    let restored = h
        .history
        .latest_destroyed(&w.entity_ref())
        .await
        .unwrap()
        .expect("destroy version");
    assert_eq!(restored.into_detached(), w);
}

#[tokio::test]
async fn changes_after_destroy_are_rejected() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.clock.set(t(2));
    h.history
        .record_destroy(&w, Some("carol"), Metadata::new())
        .await
        .unwrap()
        .expect("destroy recorded");
    let before = h.history.versions_for(&w).await.unwrap();

    w.name = "B".to_string();
    h.clock.set(t(3));
    let changes = PendingChanges::new().changed("name", json!("A"));
    let err = h
        .history
        .record_update(&w, &changes, None, Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, HistoryError::Destroyed { entity } if *entity == w.entity_ref()));

    let err = h
        .history
        .record_destroy(&w, None, Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Destroyed { .. }));
    assert_eq!(h.history.versions_for(&w).await.unwrap(), before);

    // A new create starts the entity over.
    h.clock.set(t(4));
    let recreated = h
        .history
        .record_create(&w, None, Metadata::new())
        .await
        .unwrap()
        .expect("create recorded");
    assert_eq!(recreated.event, Event::Create);
    h.clock.set(t(5));
    let updated = h
        .history
        .record_update(&w, &changes, None, Metadata::new())
        .await
        .unwrap();
    assert!(updated.is_some());
}

#[tokio::test]
async fn version_navigation() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;
    h.update(&mut w, t(3), "carol", |w| w.name = "C".to_string())
        .await;

    let versions = h.history.versions_for(&w).await.unwrap();
    let middle = &versions[1];
    assert_eq!(
        h.history.previous_version(middle).await.unwrap().as_ref(),
        Some(&versions[0])
    );
    assert_eq!(
        h.history.next_version(middle).await.unwrap().as_ref(),
        Some(&versions[2])
    );
    assert!(h.history.previous_version(&versions[0]).await.unwrap().is_none());
    assert!(h.history.next_version(&versions[2]).await.unwrap().is_none());
}

#[tokio::test]
async fn versions_for_reflects_new_commits_with_timestamp_ties() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    assert_eq!(h.history.versions_for(&w).await.unwrap().len(), 1);

    // Same instant as the create.
    h.update(&mut w, t(1), "bob", |w| w.name = "B".to_string())
        .await;
    let versions = h.history.versions_for(&w).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].event, Event::Create);
    assert_eq!(versions[1].event, Event::Update);
    assert!(versions[0].order_key() < versions[1].order_key());
    assert_eq!(
        h.storage.list_versions(&w.entity_ref()).await.unwrap(),
        versions
    );
}

// ──────────────────────────────────────────────
// Audit trail
// ──────────────────────────────────────────────

#[tokio::test]
async fn audit_trail_reports_rename() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;

    let trail = h.history.audit_trail(&w).await.unwrap();
    assert_eq!(trail.len(), 2);

    let rename = &trail[0];
    assert_eq!(rename.event, Event::Update);
    assert_eq!(rename.changed_by.as_deref(), Some("bob"));
    assert_eq!(rename.changed_at, t(2));
    assert_eq!(rename.changes.len(), 1);
    let change = rename.changes.get("name").unwrap();
    assert_eq!(change.before, Some(json!("A")));
    assert_eq!(change.after, Some(json!("B")));

    assert_eq!(trail[1].event, Event::Create);
    assert_eq!(trail[1].changed_at, t(1));
}

#[tokio::test]
async fn audit_trail_length_matches_version_count() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "alice").await;
    h.update(&mut w, t(2), "bob", |w| w.name = "B".to_string())
        .await;
    h.update(&mut w, t(3), "carol", |w| w.size = 20).await;
    h.update(&mut w, t(4), "dave", |w| w.name = "D".to_string())
        .await;

    let trail = h.history.audit_trail(&w).await.unwrap();
    let versions = h.history.versions_for(&w).await.unwrap();
    assert_eq!(trail.len(), versions.len());

    let at: Vec<_> = trail.iter().map(|e| e.changed_at).collect();
    assert_eq!(at, vec![t(4), t(3), t(2), t(1)]);
    assert_eq!(trail[1].changes.get("size").unwrap().after, Some(json!(20)));
}

#[tokio::test]
async fn audit_trail_empty_without_history() {
    let h = harness(TrackingConfig::new());
    let trail = h.history.audit_trail(&widget("A", t(1))).await.unwrap();
    assert!(trail.is_empty());
}

#[tokio::test]
async fn audit_trail_with_resolver_and_custom_ignore() {
    let h = harness(TrackingConfig::new());
    let mut w = widget("A", t(1));
    h.create(&w, "user-7").await;
    h.update(&mut w, t(2), "user-9", |w| {
        w.name = "B".to_string();
        w.size = 11;
    })
    .await;

    let ignored = ["updated_at", "size"].iter().map(|s| s.to_string()).collect();
    let trail = h
        .history
        .audit_trail_with(&w, &ignored, |actor: Option<&str>| {
            actor
                .and_then(|a| a.strip_prefix("user-"))
                .and_then(|id| id.parse::<u32>().ok())
        })
        .await
        .unwrap();

    assert_eq!(trail[0].changed_by, Some(9));
    assert_eq!(trail[1].changed_by, Some(7));
    let names: Vec<_> = trail[0].changes.iter().map(|c| c.attribute.as_str()).collect();
    assert_eq!(names, vec!["name"]);
}
