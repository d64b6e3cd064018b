use std::future::Future;

use super::{make_farm, seed, TestResult};
use crate::{RegistryStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "fresh_store_is_empty",
        fresh_store_is_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_returns_full_record",
        insert_returns_full_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_sets_updated_at_to_tokenized_at",
        insert_sets_updated_at_to_tokenized_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_farm_readable_via_get_farm",
        inserted_farm_readable_via_get_farm(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_farm_readable_via_get_farm_for_update",
        inserted_farm_readable_via_get_farm_for_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_returns_token_exists",
        double_insert_returns_token_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_across_snapshots",
        double_insert_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_counts_toward_owner_balance",
        insert_counts_toward_owner_balance(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A fresh store has no farms, no balances, and no token 1.
async fn fresh_store_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    if count != 0 {
        return Err(format!("expected farm_count 0, got {count}"));
    }
    if s.farm_exists(1).await.map_err(|e| e.to_string())? {
        return Err("token 1 exists in fresh store".to_string());
    }
    let balance = s.owner_balance("owner-a").await.map_err(|e| e.to_string())?;
    if balance != 0 {
        return Err(format!("expected balance 0, got {balance}"));
    }
    Ok(())
}

/// `insert_farm` echoes every input field and assigns index 1 / 1.
async fn insert_returns_full_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let input = make_farm(293730023, "owner-a");
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rec = s
        .insert_farm(&mut snap, input.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if rec.token_id != input.token_id
        || rec.name != input.name
        || rec.size != input.size
        || rec.location != input.location
        || rec.image_hash != input.image_hash
        || rec.soil != input.soil
        || rec.state != input.state
        || rec.owner != input.owner
    {
        return Err(format!("record does not match input: {rec:?}"));
    }
    if rec.global_index != 1 || rec.owner_index != 1 {
        return Err(format!(
            "expected indexes 1/1, got global {} owner {}",
            rec.global_index, rec.owner_index
        ));
    }
    Ok(())
}

async fn insert_sets_updated_at_to_tokenized_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;
    let rec = s.get_farm(1).await.map_err(|e| e.to_string())?;
    if rec.updated_at != rec.tokenized_at {
        return Err(format!(
            "updated_at '{}' != tokenized_at '{}'",
            rec.updated_at, rec.tokenized_at
        ));
    }
    Ok(())
}

async fn inserted_farm_readable_via_get_farm<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(5, "owner-a")]).await?;
    let rec = s.get_farm(5).await.map_err(|e| e.to_string())?;
    if rec.token_id != 5 || rec.owner != "owner-a" || rec.state != "Dormant" {
        return Err(format!("unexpected record: {rec:?}"));
    }
    if !s.farm_exists(5).await.map_err(|e| e.to_string())? {
        return Err("farm_exists(5) returned false".to_string());
    }
    Ok(())
}

/// A snapshot sees its own uncommitted insert.
async fn inserted_farm_readable_via_get_farm_for_update<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_farm(&mut snap, make_farm(9, "owner-a"))
        .await
        .map_err(|e| e.to_string())?;
    let rec = s
        .get_farm_for_update(&mut snap, 9)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if rec.token_id != 9 {
        return Err(format!("expected token 9, got {}", rec.token_id));
    }
    Ok(())
}

async fn double_insert_returns_token_exists<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = s.insert_farm(&mut snap, make_farm(1, "owner-b")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::TokenExists { token_id: 1 }) => Ok(()),
        other => Err(format!("expected TokenExists {{ token_id: 1 }}, got {other:?}")),
    }
}

/// A duplicate in a later snapshot fails and leaves the original untouched.
async fn double_insert_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_farm(&mut snap, make_farm(1, "owner-b")).await;
    let _ = s.abort_snapshot(snap).await;
    if !matches!(result, Err(StorageError::TokenExists { .. })) {
        return Err(format!("expected TokenExists, got {result:?}"));
    }

    let rec = s.get_farm(1).await.map_err(|e| e.to_string())?;
    if rec.owner != "owner-a" {
        return Err(format!("owner changed to '{}'", rec.owner));
    }
    let count = s.farm_count().await.map_err(|e| e.to_string())?;
    if count != 1 {
        return Err(format!("expected farm_count 1, got {count}"));
    }
    Ok(())
}

async fn insert_counts_toward_owner_balance<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a"), (2, "owner-a"), (3, "owner-b")]).await?;
    let a = s.owner_balance("owner-a").await.map_err(|e| e.to_string())?;
    let b = s.owner_balance("owner-b").await.map_err(|e| e.to_string())?;
    if a != 2 || b != 1 {
        return Err(format!("expected balances 2/1, got {a}/{b}"));
    }
    Ok(())
}
