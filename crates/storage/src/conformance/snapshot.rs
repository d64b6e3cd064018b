//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{make_farm, make_transition, seed, TestResult};
use crate::RegistryStorage;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "begin_commit_abort_succeed",
        begin_commit_abort_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_farm_invisible",
        uncommitted_farm_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_state_update_invisible",
        uncommitted_state_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_farm",
        abort_discards_farm(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_owner_change",
        abort_discards_owner_change(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_rolls_back",
        dropped_snapshot_rolls_back(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "transition_invisible_after_abort",
        transition_invisible_after_abort(factory).await,
    ));

    results
}

async fn begin_commit_abort_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))
}

async fn uncommitted_farm_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_farm(&mut snap, make_farm(1, "owner-a"))
        .await
        .map_err(|e| e.to_string())?;

    let exists = s.farm_exists(1).await.map_err(|e| e.to_string())?;
    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    let balance = s.owner_balance("owner-a").await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if exists || count != 0 || balance != 0 {
        return Err(format!(
            "uncommitted insert leaked: exists={exists} count={count} balance={balance}"
        ));
    }
    if !s.farm_exists(1).await.map_err(|e| e.to_string())? {
        return Err("farm not visible after commit".to_string());
    }
    Ok(())
}

async fn uncommitted_state_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let outside = s.get_farm(1).await.map_err(|e| e.to_string())?;
    let inside = s
        .get_farm_for_update(&mut snap, 1)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if outside.state != "Dormant" {
        return Err(format!("uncommitted state leaked: {}", outside.state));
    }
    if inside.state != "Preparation" {
        return Err(format!("snapshot did not see its own write: {}", inside.state));
    }
    let after = s.get_farm(1).await.map_err(|e| e.to_string())?;
    if after.state != "Preparation" || after.updated_at != "2025-01-02T00:00:00Z" {
        return Err(format!("committed update not visible: {after:?}"));
    }
    Ok(())
}

async fn abort_discards_farm<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_farm(&mut snap, make_farm(1, "owner-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if s.farm_exists(1).await.map_err(|e| e.to_string())? {
        return Err("aborted farm is visible".to_string());
    }
    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    if count != 0 {
        return Err(format!("expected farm_count 0 after abort, got {count}"));
    }
    Ok(())
}

async fn abort_discards_owner_change<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_farm_owner(&mut snap, 1, "owner-b", "2025-01-02T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_farm(1).await.map_err(|e| e.to_string())?;
    if rec.owner != "owner-a" || rec.owner_index != 1 {
        return Err(format!("aborted transfer leaked: {rec:?}"));
    }
    let b = s.owner_balance("owner-b").await.map_err(|e| e.to_string())?;
    if b != 0 {
        return Err(format!("owner-b balance {b} after aborted transfer"));
    }
    Ok(())
}

/// Dropping a snapshot without commit or abort rolls it back and lets the
/// next writer in.
async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_farm(&mut snap, make_farm(1, "owner-a"))
            .await
            .map_err(|e| e.to_string())?;
    }
    if s.farm_exists(1).await.map_err(|e| e.to_string())? {
        return Err("dropped snapshot was committed".to_string());
    }
    seed(&s, &[(1, "owner-a")]).await
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let seen = s
        .get_farm_for_update(&mut snap, 1)
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .insert_farm(&mut snap, make_farm(2, "owner-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if seen.token_id != 1 {
        return Err(format!("expected token 1, got {}", seen.token_id));
    }
    if second.global_index != 2 || second.owner_index != 2 {
        return Err(format!(
            "expected indexes 2/2, got global {} owner {}",
            second.global_index, second.owner_index
        ));
    }
    Ok(())
}

async fn transition_invisible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let history = s.list_transitions(1).await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("expected no transitions, got {}", history.len()));
    }
    Ok(())
}
