use std::future::Future;

use super::{at, make_draft, widget, TestResult};
use crate::record::Event;
use crate::{StorageError, VersionStorage};

pub(super) async fn run_ordering_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "ordering",
        "list_is_ascending_by_timestamp",
        list_is_ascending_by_timestamp(factory).await,
    ));
    results.push(TestResult::from_result(
        "ordering",
        "equal_timestamps_ordered_by_sequence",
        equal_timestamps_ordered_by_sequence(factory).await,
    ));
    results.push(TestResult::from_result(
        "ordering",
        "no_two_records_compare_equal",
        no_two_records_compare_equal(factory).await,
    ));
    results.push(TestResult::from_result(
        "ordering",
        "out_of_order_append_rejected",
        out_of_order_append_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "ordering",
        "rejected_append_commits_nothing",
        rejected_append_commits_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "ordering",
        "older_timestamp_allowed_for_other_entity",
        older_timestamp_allowed_for_other_entity(factory).await,
    ));

    results
}

async fn list_is_ascending_by_timestamp<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
        s.append_version(make_draft(&widget("1"), Event::Update, name, at(10 * i as i64)))
            .await
            .map_err(|e| e.to_string())?;
    }
    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    let keys: Vec<_> = versions.iter().map(|v| v.order_key()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    if keys != sorted {
        return Err(format!("versions not ascending: {keys:?}"));
    }
    Ok(())
}

/// Two records sharing a timestamp come back in commit order.
async fn equal_timestamps_ordered_by_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = s
        .append_version(make_draft(&widget("1"), Event::Create, "A", at(5)))
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .append_version(make_draft(&widget("1"), Event::Update, "B", at(5)))
        .await
        .map_err(|e| e.to_string())?;

    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    if versions != vec![first, second] {
        return Err(format!("tied records out of commit order: {versions:?}"));
    }
    Ok(())
}

async fn no_two_records_compare_equal<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for _ in 0..4 {
        s.append_version(make_draft(&widget("1"), Event::Update, "A", at(0)))
            .await
            .map_err(|e| e.to_string())?;
    }
    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    for pair in versions.windows(2) {
        if pair[0].order_key() >= pair[1].order_key() {
            return Err(format!(
                "order keys not strictly increasing: {:?} then {:?}",
                pair[0].order_key(),
                pair[1].order_key()
            ));
        }
    }
    Ok(())
}

async fn out_of_order_append_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.append_version(make_draft(&widget("1"), Event::Create, "A", at(10)))
        .await
        .map_err(|e| e.to_string())?;
    let result = s
        .append_version(make_draft(&widget("1"), Event::Update, "B", at(9)))
        .await;
    match result {
        Err(StorageError::OutOfOrder { entity, .. }) if entity == widget("1") => Ok(()),
        other => Err(format!("expected OutOfOrder for Widget/1, got {other:?}")),
    }
}

async fn rejected_append_commits_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.append_version(make_draft(&widget("1"), Event::Create, "A", at(10)))
        .await
        .map_err(|e| e.to_string())?;
    let _ = s
        .append_version(make_draft(&widget("1"), Event::Update, "B", at(0)))
        .await;
    let versions = s
        .list_versions(&widget("1"))
        .await
        .map_err(|e| e.to_string())?;
    if versions.len() != 1 {
        return Err(format!(
            "rejected append left {} versions, expected 1",
            versions.len()
        ));
    }
    Ok(())
}

/// Timestamp ordering is per entity, not global.
async fn older_timestamp_allowed_for_other_entity<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.append_version(make_draft(&widget("1"), Event::Create, "A", at(100)))
        .await
        .map_err(|e| e.to_string())?;
    s.append_version(make_draft(&widget("2"), Event::Create, "B", at(1)))
        .await
        .map_err(|e| format!("other entity rejected: {e}"))?;
    Ok(())
}
