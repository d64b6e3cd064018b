//! Index assignment conformance tests.
//!
//! Global and per-owner indexes are 1-based, monotonic, and never reused.
//! Per-owner positions rank an owner's current holdings by owner index.

use std::future::Future;

use super::{seed, TestResult};
use crate::RegistryStorage;

pub(super) async fn run_index_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "index",
        "global_index_follows_creation_order",
        global_index_follows_creation_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "index",
        "owner_index_counts_per_owner",
        owner_index_counts_per_owner(factory).await,
    ));
    results.push(TestResult::from_result(
        "index",
        "farm_at_resolves_global_index",
        farm_at_resolves_global_index(factory).await,
    ));
    results.push(TestResult::from_result(
        "index",
        "owner_farm_at_walks_holdings",
        owner_farm_at_walks_holdings(factory).await,
    ));
    results.push(TestResult::from_result(
        "index",
        "transfer_assigns_fresh_owner_index",
        transfer_assigns_fresh_owner_index(factory).await,
    ));
    results.push(TestResult::from_result(
        "index",
        "transfer_keeps_global_index",
        transfer_keeps_global_index(factory).await,
    ));

    results
}

async fn global_index_follows_creation_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(300, "owner-a"), (100, "owner-b"), (200, "owner-a")]).await?;
    for (token_id, expected) in [(300, 1), (100, 2), (200, 3)] {
        let rec = s.get_farm(token_id).await.map_err(|e| e.to_string())?;
        if rec.global_index != expected {
            return Err(format!(
                "token {token_id}: expected global index {expected}, got {}",
                rec.global_index
            ));
        }
    }
    Ok(())
}

async fn owner_index_counts_per_owner<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a"), (2, "owner-b"), (3, "owner-a")]).await?;
    for (token_id, expected) in [(1, 1), (2, 1), (3, 2)] {
        let rec = s.get_farm(token_id).await.map_err(|e| e.to_string())?;
        if rec.owner_index != expected {
            return Err(format!(
                "token {token_id}: expected owner index {expected}, got {}",
                rec.owner_index
            ));
        }
    }
    Ok(())
}

async fn farm_at_resolves_global_index<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(300, "owner-a"), (100, "owner-b")]).await?;
    let first = s.farm_at(1).await.map_err(|e| e.to_string())?;
    let second = s.farm_at(2).await.map_err(|e| e.to_string())?;
    if first.token_id != 300 || second.token_id != 100 {
        return Err(format!(
            "expected [300, 100], got [{}, {}]",
            first.token_id, second.token_id
        ));
    }
    Ok(())
}

async fn owner_farm_at_walks_holdings<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a"), (2, "owner-b"), (3, "owner-a")]).await?;
    let balance = s.owner_balance("owner-a").await.map_err(|e| e.to_string())?;
    let mut walked = Vec::new();
    for position in 1..=balance {
        let rec = s
            .owner_farm_at("owner-a", position)
            .await
            .map_err(|e| e.to_string())?;
        walked.push(rec.token_id);
    }
    let listed: Vec<u64> = s
        .list_owner_farms("owner-a")
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .map(|f| f.token_id)
        .collect();
    if walked != vec![1, 3] || listed != walked {
        return Err(format!("walked {walked:?}, listed {listed:?}"));
    }
    Ok(())
}

/// After a transfer out, the old owner's positions close up and the new
/// owner's counter issues the next index. The sender's next insert does not
/// reuse the freed index.
async fn transfer_assigns_fresh_owner_index<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a"), (2, "owner-a"), (3, "owner-b")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let moved = s
        .update_farm_owner(&mut snap, 1, "owner-b", "2025-01-02T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if moved.owner != "owner-b" || moved.owner_index != 2 {
        return Err(format!("unexpected transferred record: {moved:?}"));
    }
    let a = s.owner_balance("owner-a").await.map_err(|e| e.to_string())?;
    let b = s.owner_balance("owner-b").await.map_err(|e| e.to_string())?;
    if a != 1 || b != 2 {
        return Err(format!("expected balances 1/2, got {a}/{b}"));
    }
    let first_of_a = s
        .owner_farm_at("owner-a", 1)
        .await
        .map_err(|e| e.to_string())?;
    if first_of_a.token_id != 2 {
        return Err(format!(
            "owner-a position 1: expected token 2, got {}",
            first_of_a.token_id
        ));
    }

    seed(&s, &[(4, "owner-a")]).await?;
    let fourth = s.get_farm(4).await.map_err(|e| e.to_string())?;
    if fourth.owner_index != 3 {
        return Err(format!(
            "expected owner index 3 for next insert, got {}",
            fourth.owner_index
        ));
    }
    Ok(())
}

async fn transfer_keeps_global_index<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[(1, "owner-a"), (2, "owner-a")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_farm_owner(&mut snap, 2, "owner-b", "2025-01-02T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.farm_at(2).await.map_err(|e| e.to_string())?;
    if rec.token_id != 2 || rec.global_index != 2 || rec.owner != "owner-b" {
        return Err(format!("unexpected record at global index 2: {rec:?}"));
    }
    Ok(())
}
