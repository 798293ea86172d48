use std::future::Future;

use super::{at, make_draft, widget, TestResult};
use crate::record::Event;
use crate::VersionStorage;

pub(super) async fn run_append_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "append",
        "empty_store_lists_nothing",
        empty_store_lists_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "append_returns_draft_fields",
        append_returns_draft_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "appended_record_is_listed",
        appended_record_is_listed(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "sequence_ids_strictly_increase",
        sequence_ids_strictly_increase(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "committed_records_read_back_unchanged",
        committed_records_read_back_unchanged(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "absent_snapshot_is_preserved",
        absent_snapshot_is_preserved(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "latest_version_is_newest",
        latest_version_is_newest(factory).await,
    ));

    results
}

async fn empty_store_lists_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    if !versions.is_empty() {
        return Err(format!("expected no versions, got {}", versions.len()));
    }
    let latest = s
        .latest_version(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    if latest.is_some() {
        return Err("expected no latest version".to_string());
    }
    Ok(())
}

/// The committed record carries every field of the draft unchanged.
async fn append_returns_draft_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let draft = make_draft(&widget("1"), Event::Create, "A", at(0));
    let record = s
        .append_version(draft.clone())
        .await
        .map_err(|e| e.to_string())?;

    if record.entity != draft.entity {
        return Err(format!("entity mismatch: {}", record.entity));
    }
    if record.event != draft.event {
        return Err(format!("event mismatch: {}", record.event));
    }
    if record.snapshot != draft.snapshot {
        return Err(format!("snapshot mismatch: {:?}", record.snapshot));
    }
    if record.actor != draft.actor {
        return Err(format!("actor mismatch: {:?}", record.actor));
    }
    if record.metadata != draft.metadata {
        return Err(format!("metadata mismatch: {:?}", record.metadata));
    }
    if record.created_at != draft.created_at {
        return Err(format!("created_at mismatch: {}", record.created_at));
    }
    Ok(())
}

async fn appended_record_is_listed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = s
        .append_version(make_draft(&widget("1"), Event::Create, "A", at(0)))
        .await
        .map_err(|e| e.to_string())?;
    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    if versions != vec![record] {
        return Err(format!("expected exactly the appended record, got {versions:?}"));
    }
    Ok(())
}

async fn sequence_ids_strictly_increase<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut last = None;
    for i in 0..5 {
        // Alternate entities: sequence ids grow across the whole backend.
        let entity = widget(if i % 2 == 0 { "1" } else { "2" });
        let record = s
            .append_version(make_draft(&entity, Event::Update, "A", at(i)))
            .await
            .map_err(|e| e.to_string())?;
        if let Some(prev) = last {
            if record.sequence_id <= prev {
                return Err(format!(
                    "sequence id {} not greater than previous {}",
                    record.sequence_id, prev
                ));
            }
        }
        last = Some(record.sequence_id);
    }
    Ok(())
}

/// Repeated reads return identical records; nothing is rewritten after commit.
async fn committed_records_read_back_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = s
        .append_version(make_draft(&widget("1"), Event::Create, "A", at(0)))
        .await
        .map_err(|e| e.to_string())?;
    let before = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;

    s.append_version(make_draft(&widget("1"), Event::Update, "B", at(1)))
        .await
        .map_err(|e| e.to_string())?;
    let after = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;

    if after.len() != 2 {
        return Err(format!("expected 2 versions, got {}", after.len()));
    }
    if after[0] != first || before[0] != first {
        return Err("first record changed after a later append".to_string());
    }
    Ok(())
}

async fn absent_snapshot_is_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut draft = make_draft(&widget("1"), Event::Update, "A", at(0));
    draft.snapshot = None;
    draft.actor = None;
    s.append_version(draft).await.map_err(|e| e.to_string())?;

    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    let record = versions.first().ok_or("record missing")?;
    if record.snapshot.is_some() {
        return Err(format!("expected no snapshot, got {:?}", record.snapshot));
    }
    if record.actor.is_some() {
        return Err(format!("expected no actor, got {:?}", record.actor));
    }
    Ok(())
}

async fn latest_version_is_newest<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (i, name) in ["A", "B", "C"].iter().enumerate() {
        s.append_version(make_draft(&widget("1"), Event::Update, name, at(i as i64)))
            .await
            .map_err(|e| e.to_string())?;
    }
    let latest = s
        .latest_version(&widget("1"))
        .await
        .map_err(|e| e.to_string())?
        .ok_or("latest version missing")?;
    let name = latest
        .attributes()
        .map_err(|e| e.to_string())?
        .get("name")
        .cloned();
    if name != Some(serde_json::json!("C")) {
        return Err(format!("expected latest name \"C\", got {name:?}"));
    }
    Ok(())
}
