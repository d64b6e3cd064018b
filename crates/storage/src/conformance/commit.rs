//! Atomic commit conformance tests.
//!
//! A snapshot that touches several records must commit all of them or none.

use std::future::Future;

use super::{make_farm, make_transition, seed, TestResult};
use crate::RegistryStorage;

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "state_and_transition_both_visible_after_commit",
        state_and_transition_both_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_farm_inserts_all_visible_after_commit",
        multi_farm_inserts_all_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_farm_inserts_none_visible_after_abort",
        multi_farm_inserts_none_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "transition_sequence_increments",
        transition_sequence_increments(factory).await,
    ));

    results
}

/// In one snapshot: update state + insert transition + commit. Both visible.
async fn state_and_transition_both_visible_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_farm_state(&mut snap, 1, "Preparation", "2025-01-02T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.insert_transition(&mut snap, make_transition(1, "Dormant", "Preparation"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_farm(1).await.map_err(|e| e.to_string())?;
    if rec.state != "Preparation" {
        return Err(format!("expected state Preparation, got {}", rec.state));
    }
    let history = s.list_transitions(1).await.map_err(|e| e.to_string())?;
    match history.as_slice() {
        [t] if t.from_state == "Dormant" && t.to_state == "Preparation" && t.sequence == 1 => {
            Ok(())
        }
        other => Err(format!("unexpected history: {other:?}")),
    }
}

async fn multi_farm_inserts_all_visible_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(10, "owner-a"), (20, "owner-b"), (30, "owner-a")]).await?;

    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    if count != 3 {
        return Err(format!("expected farm_count 3, got {count}"));
    }
    for token_id in [10, 20, 30] {
        if !s.farm_exists(token_id).await.map_err(|e| e.to_string())? {
            return Err(format!("token {token_id} missing after commit"));
        }
    }
    Ok(())
}

/// A failing insert mid-snapshot followed by abort leaves nothing behind.
async fn multi_farm_inserts_none_visible_after_abort<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_farm(&mut snap, make_farm(10, "owner-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_farm(&mut snap, make_farm(20, "owner-b"))
        .await
        .map_err(|e| e.to_string())?;
    if s.insert_farm(&mut snap, make_farm(10, "owner-c")).await.is_ok() {
        let _ = s.abort_snapshot(snap).await;
        return Err("duplicate insert succeeded".to_string());
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    if count != 0 {
        return Err(format!("expected farm_count 0, got {count}"));
    }
    for owner in ["owner-a", "owner-b", "owner-c"] {
        let balance = s.owner_balance(owner).await.map_err(|e| e.to_string())?;
        if balance != 0 {
            return Err(format!("{owner} balance {balance} after abort"));
        }
    }
    Ok(())
}

async fn transition_sequence_increments<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;

    for (from, to) in [("Dormant", "Preparation"), ("Preparation", "Planting")] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_transition(&mut snap, make_transition(1, from, to))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let sequences: Vec<u64> = s
        .list_transitions(1)
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .map(|t| t.sequence)
        .collect();
    if sequences != vec![1, 2] {
        return Err(format!("expected sequences [1, 2], got {sequences:?}"));
    }
    Ok(())
}
