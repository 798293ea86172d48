//! Conformance test suite for `VersionStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `VersionStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Append**: committed records carry the draft's fields and a sequence id
//! - **Ordering**: ascending `(created_at, sequence_id)` reads, timestamp ties,
//!   out-of-order rejection
//! - **Isolation**: one entity's versions never leak into another's
//! - **Immutability**: committed records read back unchanged
//! - **Concurrency**: parallel appends get unique, increasing sequence ids
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use verso_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod concurrent;
mod isolation;
mod ordering;

use std::fmt;
use std::future::Future;

use time::OffsetDateTime;

use crate::record::{EntityRef, Event, Metadata, NewVersion};
use crate::VersionStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "ordering").
    pub category: String,
    /// Test name (e.g. "append_assigns_sequence_id").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: VersionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory).await);
    results.extend(ordering::run_ordering_tests(&factory).await);
    results.extend(isolation::run_isolation_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: draft constructors with sensible defaults ───────────────────────

fn widget(id: &str) -> EntityRef {
    EntityRef::new("Widget", id)
}

/// Seconds after 2025-01-01T00:00:00Z.
fn at(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_735_689_600 + seconds)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn make_draft(
    entity: &EntityRef,
    event: Event,
    name: &str,
    created_at: OffsetDateTime,
) -> NewVersion {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::json!("conformance"));
    NewVersion {
        entity: entity.clone(),
        event,
        snapshot: Some(serde_json::json!({ "name": name }).to_string()),
        actor: Some("tester".to_string()),
        metadata,
        created_at,
    }
}
