use std::future::Future;

use super::{make_transition, seed, TestResult};
use crate::{RegistryStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_farm_nonexistent",
        get_farm_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_farm_for_update_nonexistent",
        get_farm_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_state_nonexistent",
        update_state_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_owner_nonexistent",
        update_owner_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "insert_transition_nonexistent",
        insert_transition_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "farm_at_zero_and_past_end",
        farm_at_zero_and_past_end(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "owner_farm_at_out_of_range_has_correct_fields",
        owner_farm_at_out_of_range_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_queries_empty_for_unknown",
        list_queries_empty_for_unknown(factory).await,
    ));

    results
}

// ── 1. get_farm on empty store returns TokenNotFound ─────────────────────────

async fn get_farm_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_farm(2).await {
        Err(StorageError::TokenNotFound { token_id: 2 }) => Ok(()),
        other => Err(format!("expected TokenNotFound {{ token_id: 2 }}, got {other:?}")),
    }
}

async fn get_farm_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_farm_for_update(&mut snap, 3).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::TokenNotFound { token_id: 3 }) => Ok(()),
        other => Err(format!("expected TokenNotFound, got {other:?}")),
    }
}

async fn update_state_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_farm_state(&mut snap, 3, "Planting", "2025-01-01T00:00:00Z")
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::TokenNotFound { .. }) => Ok(()),
        other => Err(format!("expected TokenNotFound, got {other:?}")),
    }
}

async fn update_owner_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_farm_owner(&mut snap, 3, "owner-b", "2025-01-01T00:00:00Z")
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::TokenNotFound { .. }) => Ok(()),
        other => Err(format!("expected TokenNotFound, got {other:?}")),
    }
}

async fn insert_transition_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_transition(&mut snap, make_transition(3, "Dormant", "Planting"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::TokenNotFound { .. }) => Ok(()),
        other => Err(format!("expected TokenNotFound, got {other:?}")),
    }
}

async fn farm_at_zero_and_past_end<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;
    for index in [0, 2] {
        match s.farm_at(index).await {
            Err(StorageError::IndexOutOfRange { index: i, count: 1 }) if i == index => {}
            other => {
                return Err(format!(
                    "farm_at({index}): expected IndexOutOfRange, got {other:?}"
                ))
            }
        }
    }
    Ok(())
}

async fn owner_farm_at_out_of_range_has_correct_fields<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;
    match s.owner_farm_at("owner-a", 2).await {
        Err(StorageError::OwnerIndexOutOfRange {
            owner,
            index: 2,
            balance: 1,
        }) if owner == "owner-a" => {}
        other => return Err(format!("expected OwnerIndexOutOfRange, got {other:?}")),
    }
    match s.owner_farm_at("owner-z", 1).await {
        Err(StorageError::OwnerIndexOutOfRange { balance: 0, .. }) => Ok(()),
        other => Err(format!(
            "unknown owner: expected OwnerIndexOutOfRange, got {other:?}"
        )),
    }
}

async fn list_queries_empty_for_unknown<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let farms = s
        .list_owner_farms("owner-z")
        .await
        .map_err(|e| e.to_string())?;
    if !farms.is_empty() {
        return Err(format!("expected no farms, got {}", farms.len()));
    }
    let history = s.list_transitions(99).await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("expected no transitions, got {}", history.len()));
    }
    Ok(())
}
