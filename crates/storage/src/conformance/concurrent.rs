use std::future::Future;
use std::sync::Arc;

use super::{make_farm, TestResult};
use crate::{RegistryStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_insert_same_token_exactly_one_wins",
        concurrent_insert_same_token_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_distinct_tokens_all_succeed",
        concurrent_inserts_distinct_tokens_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_state_updates_final_state_consistent",
        concurrent_state_updates_final_state_consistent(factory).await,
    ));

    results
}

// ── Concurrent insert of one token: exactly one wins ────────────────────────

/// N tasks each open a snapshot and try to insert the same token id.
/// Writers are serialized, so exactly one commit succeeds and every other
/// task sees `TokenExists`.
async fn concurrent_insert_same_token_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = s
                .insert_farm(&mut snap, make_farm(293730023, &format!("owner-{i}")))
                .await;
            match result {
                Ok(_) => {
                    s.commit_snapshot(snap).await?;
                    Ok::<bool, StorageError>(true) // won
                }
                Err(StorageError::TokenExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false) // lost
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    let count = storage.farm_count().await.map_err(|e| e.to_string())?;
    if count != 1 {
        return Err(format!("expected farm_count 1, got {count}"));
    }

    Ok(())
}

// ── Concurrent inserts of distinct tokens: all succeed ──────────────────────

/// N tasks each insert a different token. All succeed and the global indexes
/// they receive are exactly `1..=N` with no gaps or repeats.
async fn concurrent_inserts_distinct_tokens_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let rec = s
                .insert_farm(&mut snap, make_farm(1000 + i as u64, "owner-a"))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<u64, StorageError>(rec.global_index)
        }));
    }

    let mut indexes = Vec::new();
    for handle in handles {
        let index = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        indexes.push(index);
    }
    indexes.sort_unstable();
    let expected: Vec<u64> = (1..=N as u64).collect();
    if indexes != expected {
        return Err(format!("expected global indexes {expected:?}, got {indexes:?}"));
    }

    let balance = storage
        .owner_balance("owner-a")
        .await
        .map_err(|e| e.to_string())?;
    if balance != N as u64 {
        return Err(format!("expected balance {N}, got {balance}"));
    }
    Ok(())
}

// ── Concurrent state updates: last committed writer wins cleanly ────────────

/// N tasks each set the same farm to a distinct state and append a transition.
/// The final state must be one of the written labels and the history must
/// contain exactly N transitions with sequences `1..=N`.
async fn concurrent_state_updates_final_state_consistent<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RegistryStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .insert_farm(&mut snap, make_farm(1, "owner-a"))
            .await
            .map_err(|e| format!("insert: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit insert: {e}"))?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let label = format!("Phase{i}");
            let mut snap = s.begin_snapshot().await?;
            let current = s.get_farm_for_update(&mut snap, 1).await?;
            s.update_farm_state(&mut snap, 1, &label, "2025-01-02T00:00:00Z")
                .await?;
            s.insert_transition(
                &mut snap,
                crate::NewTransitionRecord {
                    token_id: 1,
                    from_state: current.state,
                    to_state: label,
                    caller: "owner-a".to_string(),
                    transitioned_at: "2025-01-02T00:00:00Z".to_string(),
                },
            )
            .await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    let rec = storage.get_farm(1).await.map_err(|e| e.to_string())?;
    if !rec.state.starts_with("Phase") {
        return Err(format!("unexpected final state '{}'", rec.state));
    }
    let history = storage
        .list_transitions(1)
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != N {
        return Err(format!("expected {N} transitions, got {}", history.len()));
    }
    // Each transition starts where the previous one ended.
    for pair in history.windows(2) {
        if pair[1].from_state != pair[0].to_state {
            return Err(format!(
                "broken chain: {} -> {} then {} -> {}",
                pair[0].from_state, pair[0].to_state, pair[1].from_state, pair[1].to_state
            ));
        }
    }
    if history.last().map(|t| t.to_state.as_str()) != Some(rec.state.as_str()) {
        return Err("final state does not match last transition".to_string());
    }
    Ok(())
}
