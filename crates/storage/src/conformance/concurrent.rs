use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use super::{at, make_draft, widget, TestResult};
use crate::record::Event;
use crate::{StorageError, VersionStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_appends_get_unique_sequence_ids",
        concurrent_appends_get_unique_sequence_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_appends_all_listed_in_order",
        concurrent_appends_all_listed_in_order(factory).await,
    ));

    results
}

/// Spawn N tasks that append at once, to one shared entity or to N distinct ones.
async fn spawn_appends<S: VersionStorage>(
    storage: &Arc<S>,
    same_entity: bool,
) -> Result<Vec<u64>, String> {
    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let entity = if same_entity {
            widget("shared")
        } else {
            widget(&format!("w-{i}"))
        };
        handles.push(tokio::spawn(async move {
            // Equal timestamps: none of these can be rejected as out of order.
            s.append_version(make_draft(&entity, Event::Update, "A", at(0)))
                .await
                .map(|r| r.sequence_id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        ids.push(id);
    }
    Ok(ids)
}

async fn concurrent_appends_get_unique_sequence_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let ids = spawn_appends(&storage, false).await?;
    let unique: BTreeSet<u64> = ids.iter().copied().collect();
    if unique.len() != N {
        return Err(format!("expected {N} unique sequence ids, got {ids:?}"));
    }
    Ok(())
}

/// N tasks race on the same entity; every append lands and the list is
/// strictly ordered.
async fn concurrent_appends_all_listed_in_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    spawn_appends(&storage, true).await?;

    let versions = storage
        .list_versions(&widget("shared"))
        .await
        .map_err(|e| e.to_string())?;
    if versions.len() != N {
        return Err(format!("expected {N} versions, got {}", versions.len()));
    }
    for pair in versions.windows(2) {
        if pair[0].order_key() >= pair[1].order_key() {
            return Err(format!(
                "concurrent appends out of order: seq {} then {}",
                pair[0].sequence_id, pair[1].sequence_id
            ));
        }
    }
    Ok(())
}
