//! Conformance test suite for `RegistryStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `RegistryStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Initialization**: empty store, farm insertion, duplicate detection
//! - **Error handling**: correct error variants for missing tokens and indexes
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-record snapshots
//! - **Index assignment**: 1-based global and per-owner indexes, never reused
//! - **Concurrency**: racing writers are serialized
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use reap_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_sqlite_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod index;
mod init;
mod snapshot;

use std::fmt;
use std::future::Future;

use crate::record::{NewFarmRecord, NewTransitionRecord};
use crate::RegistryStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_assigns_first_global_index").
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
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(index::run_index_tests(&factory).await);
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

// ── Helpers: record constructors and one-shot writes ─────────────────────────

fn make_farm(token_id: u64, owner: &str) -> NewFarmRecord {
    NewFarmRecord {
        token_id,
        name: format!("Farm {token_id}"),
        size: "294.32ha".to_string(),
        location: "Lyaduywa, Kenya".to_string(),
        image_hash: "QmUfideC1r5JhMVwgd8vjC7DtVnXw3QGfCSQA7fUVHK789".to_string(),
        soil: "loam soil".to_string(),
        state: "Dormant".to_string(),
        owner: owner.to_string(),
        tokenized_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_transition(token_id: u64, from_state: &str, to_state: &str) -> NewTransitionRecord {
    NewTransitionRecord {
        token_id,
        from_state: from_state.to_string(),
        to_state: to_state.to_string(),
        caller: "owner-a".to_string(),
        transitioned_at: "2025-01-01T00:00:30Z".to_string(),
    }
}

/// Insert farms in a single committed snapshot.
async fn seed<S: RegistryStorage>(s: &S, farms: &[(u64, &str)]) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (token_id, owner) in farms {
        s.insert_farm(&mut snap, make_farm(*token_id, owner))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}
