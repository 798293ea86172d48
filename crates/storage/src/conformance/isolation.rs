use std::future::Future;

use super::{at, make_draft, TestResult};
use crate::record::{EntityRef, Event};
use crate::VersionStorage;

pub(super) async fn run_isolation_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "isolation",
        "versions_scoped_to_item_id",
        versions_scoped_to_item_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "isolation",
        "versions_scoped_to_item_type",
        versions_scoped_to_item_type(factory).await,
    ));

    results
}

async fn versions_scoped_to_item_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = EntityRef::new("Widget", "1");
    let b = EntityRef::new("Widget", "2");
    s.append_version(make_draft(&a, Event::Create, "A", at(0)))
        .await
        .map_err(|e| e.to_string())?;
    s.append_version(make_draft(&b, Event::Create, "B", at(1)))
        .await
        .map_err(|e| e.to_string())?;
    s.append_version(make_draft(&a, Event::Update, "A2", at(2)))
        .await
        .map_err(|e| e.to_string())?;

    let versions = s.list_versions(&a).await.map_err(|e| e.to_string())?;
    if versions.len() != 2 || versions.iter().any(|v| v.entity != a) {
        return Err(format!("Widget/1 history polluted: {versions:?}"));
    }
    Ok(())
}

/// The same id under two item types names two different entities.
async fn versions_scoped_to_item_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let widget = EntityRef::new("Widget", "1");
    let gadget = EntityRef::new("Gadget", "1");
    s.append_version(make_draft(&widget, Event::Create, "A", at(0)))
        .await
        .map_err(|e| e.to_string())?;

    let versions = s.list_versions(&gadget).await.map_err(|e| e.to_string())?;
    if !versions.is_empty() {
        return Err(format!("Gadget/1 sees Widget/1 history: {versions:?}"));
    }
    Ok(())
}
