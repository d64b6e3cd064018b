//! End-to-end behaviour of the farm registry over in-memory storage.
//!
//! Covers the full client surface:
//!
//! 1. Fresh registry: empty supply, no tokens, metadata
//! 2. Tokenization: existence, ownership, balances, events, duplicates
//! 3. Index queries: per-owner and global 1-based lookups
//! 4. Lifecycle: owner-gated transitions, history, missing tokens
//! 5. Transfers: balance movement and index assignment
//! 6. Notifications: subscribers only hear committed changes

use reap_registry::{
    FarmRegistry, FarmState, Identity, Lookup, RegistryError, RegistryEvent, TokenizeRequest,
};
use reap_storage::MemoryStorage;
use std::sync::Arc;

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

const TOKEN_ID: u64 = 293730023;

fn registry() -> FarmRegistry<MemoryStorage> {
    FarmRegistry::new(MemoryStorage::new())
}

fn account(n: usize) -> Identity {
    Identity::new(format!("0x{:040x}", n + 1)).unwrap()
}

fn arunga_vineyard() -> TokenizeRequest {
    TokenizeRequest {
        name: "Arunga Vineyard".to_string(),
        size: "294.32ha".to_string(),
        location: "Lyaduywa, Kenya".to_string(),
        image_hash: "QmUfideC1r5JhMVwgd8vjC7DtVnXw3QGfCSQA7fUVHK789".to_string(),
        soil: "loam soil".to_string(),
        token_id: TOKEN_ID,
    }
}

fn farm_request(token_id: u64, name: &str) -> TokenizeRequest {
    TokenizeRequest {
        name: name.to_string(),
        token_id,
        ..arunga_vineyard()
    }
}

async fn tokenize_farm(registry: &FarmRegistry<MemoryStorage>) {
    registry
        .tokenize(arunga_vineyard(), &account(0))
        .await
        .unwrap();
}

// ──────────────────────────────────────────────
// 1. Fresh registry
// ──────────────────────────────────────────────

#[tokio::test]
async fn initial_state_is_empty() {
    let r = registry();
    assert_eq!(r.total_supply().await.unwrap(), 0);
    assert!(!r.exists(TOKEN_ID).await.unwrap());
}

#[tokio::test]
async fn metadata_name_and_symbol() {
    let r = registry();
    assert_eq!(r.name(), "Reap");
    assert_eq!(r.symbol(), "REA");
}

#[tokio::test]
async fn unknown_token_does_not_exist() {
    let r = registry();
    tokenize_farm(&r).await;
    assert!(!r.exists(2).await.unwrap());
}

// ──────────────────────────────────────────────
// 2. Tokenization
// ──────────────────────────────────────────────

#[tokio::test]
async fn tokenize_creates_farm_and_emits_two_events() {
    let r = registry();
    let receipt = r.tokenize(arunga_vineyard(), &account(0)).await.unwrap();

    assert!(r.exists(TOKEN_ID).await.unwrap());
    assert_eq!(receipt.events.len(), 2);
    assert!(matches!(
        &receipt.events[0],
        RegistryEvent::FarmTokenized { token_id, global_index: 1, owner_index: 1, .. }
            if *token_id == TOKEN_ID
    ));
    assert_eq!(
        receipt.events[1],
        RegistryEvent::RegistryGrown { total_farms: 1 }
    );
    assert_eq!(receipt.farm.state, FarmState::Dormant);
}

#[tokio::test]
async fn tokenize_assigns_owner_balance_and_supply() {
    let r = registry();
    tokenize_farm(&r).await;

    assert_eq!(r.owner_of(TOKEN_ID).await.unwrap(), account(0));
    assert_eq!(r.balance_of(&account(0)).await.unwrap(), 1);
    assert_eq!(r.total_tokenized_farms().await.unwrap(), 1);
    assert_eq!(r.total_supply().await.unwrap(), 1);
    assert_eq!(r.get_token_state(TOKEN_ID).await.unwrap(), FarmState::Dormant);
}

#[tokio::test]
async fn duplicate_tokenize_fails_and_leaves_state_untouched() {
    let r = registry();
    tokenize_farm(&r).await;
    let before = r.get_farm(TOKEN_ID).await.unwrap();

    let err = r
        .tokenize(farm_request(TOKEN_ID, "Impostor Farm"), &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateId { token_id: TOKEN_ID }));

    assert_eq!(r.get_farm(TOKEN_ID).await.unwrap(), before);
    assert_eq!(r.total_supply().await.unwrap(), 1);
    assert_eq!(r.balance_of(&account(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn tokenize_rejects_blank_required_fields() {
    let r = registry();
    let err = r
        .tokenize(farm_request(1, ""), &account(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
    assert_eq!(r.total_supply().await.unwrap(), 0);
}

#[tokio::test]
async fn get_farm_returns_full_projection() {
    let r = registry();
    tokenize_farm(&r).await;

    let farm = r.get_farm(TOKEN_ID).await.unwrap();
    assert_eq!(farm.name, "Arunga Vineyard");
    assert_eq!(farm.soil, "loam soil");
    assert_eq!(farm.size, "294.32ha");
    assert_eq!(farm.image_hash, "QmUfideC1r5JhMVwgd8vjC7DtVnXw3QGfCSQA7fUVHK789");
    assert_eq!(farm.owner, account(0));
    assert_eq!(farm.tokenized_at, farm.updated_at);
}

#[tokio::test]
async fn get_farm_for_unknown_token_is_not_found() {
    let r = registry();
    let err = r.get_farm(2).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(Lookup::Token(2))));
    assert!(matches!(
        r.get_token_state(2).await,
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(r.owner_of(2).await, Err(RegistryError::NotFound(_))));
}

// ──────────────────────────────────────────────
// 3. Index queries
// ──────────────────────────────────────────────

#[tokio::test]
async fn query_farms_belonging_to_an_account() {
    let r = registry();
    tokenize_farm(&r).await;

    let total = r.balance_of(&account(0)).await.unwrap();
    let mut farms = Vec::new();
    for i in 1..=total {
        farms.push(r.query_user_tokenized_farm(&account(0), i).await.unwrap());
    }

    assert_eq!(total, 1);
    assert_eq!(farms.len(), 1);
    assert_eq!(farms[0].token_id, TOKEN_ID);
    assert_eq!(farms[0].name, "Arunga Vineyard");
    assert_eq!(farms[0].state, FarmState::Dormant);
    assert_eq!(farms[0].location, "Lyaduywa, Kenya");
}

#[tokio::test]
async fn query_all_tokenized_farms() {
    let r = registry();
    tokenize_farm(&r).await;

    let total = r.total_tokenized_farms().await.unwrap();
    let mut farms = Vec::new();
    for i in 1..=total {
        farms.push(r.query_tokenized_farm(i).await.unwrap());
    }

    assert_eq!(total, 1);
    assert_eq!(farms.len(), 1);
    assert_eq!(farms[0].token_id, TOKEN_ID);
    assert_eq!(farms[0].name, "Arunga Vineyard");
    assert_eq!(farms[0].state, FarmState::Dormant);
    assert_eq!(farms[0].location, "Lyaduywa, Kenya");
}

#[tokio::test]
async fn index_queries_out_of_range_are_not_found() {
    let r = registry();
    tokenize_farm(&r).await;

    for index in [0, 2] {
        assert!(matches!(
            r.query_tokenized_farm(index).await,
            Err(RegistryError::NotFound(Lookup::GlobalIndex { .. }))
        ));
        assert!(matches!(
            r.query_user_tokenized_farm(&account(0), index).await,
            Err(RegistryError::NotFound(Lookup::OwnerIndex { .. }))
        ));
    }
    assert!(matches!(
        r.query_user_tokenized_farm(&account(1), 1).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn indexes_track_creation_order_across_owners() {
    let r = registry();
    r.tokenize(farm_request(10, "North"), &account(0)).await.unwrap();
    r.tokenize(farm_request(20, "South"), &account(1)).await.unwrap();
    let east = r.tokenize(farm_request(30, "East"), &account(0)).await.unwrap();

    assert_eq!(east.farm.global_index, 3);
    assert_eq!(east.farm.owner_index, 2);
    assert_eq!(
        east.events[1],
        RegistryEvent::RegistryGrown { total_farms: 3 }
    );
    assert_eq!(r.query_tokenized_farm(2).await.unwrap().token_id, 20);

    let names: Vec<String> = r
        .farms_of(&account(0))
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["North", "East"]);
}

// ──────────────────────────────────────────────
// 4. Lifecycle
// ──────────────────────────────────────────────

#[tokio::test]
async fn owner_can_transition_state() {
    let r = registry();
    tokenize_farm(&r).await;

    let receipt = r
        .transition_state(TOKEN_ID, FarmState::Preparation, &account(0))
        .await
        .unwrap();

    assert_eq!(r.get_token_state(TOKEN_ID).await.unwrap(), FarmState::Preparation);
    assert_eq!(
        receipt.events,
        vec![RegistryEvent::StateTransitioned {
            token_id: TOKEN_ID,
            from: FarmState::Dormant,
            to: FarmState::Preparation,
            caller: account(0),
        }]
    );
}

#[tokio::test]
async fn non_owner_transition_is_unauthorized() {
    let r = registry();
    tokenize_farm(&r).await;

    let err = r
        .transition_state(TOKEN_ID, FarmState::Preparation, &account(1))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::Unauthorized { token_id: TOKEN_ID, .. }));
    assert_eq!(r.get_token_state(TOKEN_ID).await.unwrap(), FarmState::Dormant);
    assert!(r.state_history(TOKEN_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn transition_of_unknown_token_is_not_found() {
    let r = registry();
    tokenize_farm(&r).await;

    let err = r
        .transition_state(3, FarmState::Planting, &account(0))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(Lookup::Token(3))));
}

/// Missing token and wrong caller together: existence is checked first.
#[tokio::test]
async fn missing_token_reported_before_wrong_caller() {
    let r = registry();
    tokenize_farm(&r).await;

    let err = r
        .transition_state(3, FarmState::Planting, &account(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn arunga_vineyard_scenario() {
    let r = registry();
    let (a, b) = (account(0), account(1));
    r.tokenize(arunga_vineyard(), &a).await.unwrap();

    assert!(r.exists(TOKEN_ID).await.unwrap());
    assert_eq!(r.owner_of(TOKEN_ID).await.unwrap(), a);
    assert_eq!(r.balance_of(&a).await.unwrap(), 1);
    assert_eq!(r.total_tokenized_farms().await.unwrap(), 1);
    assert_eq!(r.get_token_state(TOKEN_ID).await.unwrap(), FarmState::Dormant);

    r.transition_state(TOKEN_ID, FarmState::Preparation, &a)
        .await
        .unwrap();
    assert_eq!(
        r.get_token_state(TOKEN_ID).await.unwrap().as_str(),
        "Preparation"
    );

    assert!(r
        .transition_state(TOKEN_ID, FarmState::Preparation, &b)
        .await
        .is_err());
    assert_eq!(
        r.get_token_state(TOKEN_ID).await.unwrap().as_str(),
        "Preparation"
    );
}

#[tokio::test]
async fn transitions_are_free_form_and_recorded() {
    let r = registry();
    tokenize_farm(&r).await;
    let owner = account(0);

    for state in [
        FarmState::Harvesting,
        FarmState::Other("Fallow".to_string()),
        FarmState::Dormant,
        FarmState::Dormant,
    ] {
        r.transition_state(TOKEN_ID, state, &owner).await.unwrap();
    }

    let history = r.state_history(TOKEN_ID).await.unwrap();
    let steps: Vec<(String, String)> = history
        .iter()
        .map(|t| (t.from.to_string(), t.to.to_string()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("Dormant".to_string(), "Harvesting".to_string()),
            ("Harvesting".to_string(), "Fallow".to_string()),
            ("Fallow".to_string(), "Dormant".to_string()),
            ("Dormant".to_string(), "Dormant".to_string()),
        ]
    );
    assert_eq!(history[3].sequence, 4);
    assert!(history.iter().all(|t| t.caller == owner));
}

#[tokio::test]
async fn history_of_unknown_token_is_not_found() {
    let r = registry();
    assert!(matches!(
        r.state_history(42).await,
        Err(RegistryError::NotFound(Lookup::Token(42)))
    ));
}

// ──────────────────────────────────────────────
// 5. Transfers
// ──────────────────────────────────────────────

#[tokio::test]
async fn transfer_moves_ownership_and_balances() {
    let r = registry();
    let (a, b) = (account(0), account(1));
    r.tokenize(farm_request(1, "First"), &a).await.unwrap();
    r.tokenize(farm_request(2, "Second"), &a).await.unwrap();
    r.tokenize(farm_request(3, "Third"), &b).await.unwrap();

    let receipt = r.transfer(1, &b, &a).await.unwrap();
    assert_eq!(
        receipt.events,
        vec![RegistryEvent::Transferred {
            token_id: 1,
            from: a.clone(),
            to: b.clone(),
        }]
    );

    assert_eq!(r.owner_of(1).await.unwrap(), b);
    assert_eq!(r.balance_of(&a).await.unwrap(), 1);
    assert_eq!(r.balance_of(&b).await.unwrap(), 2);
    assert_eq!(r.query_user_tokenized_farm(&a, 1).await.unwrap().token_id, 2);
    let moved = r.query_user_tokenized_farm(&b, 2).await.unwrap();
    assert_eq!(moved.token_id, 1);
    assert_eq!(moved.owner_index, 2);
    assert_eq!(moved.global_index, 1);

    // New owner now controls the lifecycle; old owner does not.
    r.transition_state(1, FarmState::Planting, &b).await.unwrap();
    assert!(matches!(
        r.transition_state(1, FarmState::Growing, &a).await,
        Err(RegistryError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn transfer_by_non_owner_is_unauthorized() {
    let r = registry();
    tokenize_farm(&r).await;

    let err = r
        .transfer(TOKEN_ID, &account(2), &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized { .. }));
    assert_eq!(r.owner_of(TOKEN_ID).await.unwrap(), account(0));
}

#[tokio::test]
async fn transfer_to_self_is_silent_noop() {
    let r = registry();
    tokenize_farm(&r).await;

    let receipt = r
        .transfer(TOKEN_ID, &account(0), &account(0))
        .await
        .unwrap();
    assert!(receipt.events.is_empty());
    assert_eq!(r.get_farm(TOKEN_ID).await.unwrap().owner_index, 1);
}

// ──────────────────────────────────────────────
// 6. Notifications
// ──────────────────────────────────────────────

#[tokio::test]
async fn subscribers_receive_committed_events_in_order() {
    let r = registry();
    let mut rx = r.subscribe();

    tokenize_farm(&r).await;
    // Rejected mutations publish nothing.
    let _ = r.tokenize(arunga_vineyard(), &account(0)).await;
    let _ = r
        .transition_state(TOKEN_ID, FarmState::Planting, &account(1))
        .await;
    r.transition_state(TOKEN_ID, FarmState::Planting, &account(0))
        .await
        .unwrap();

    assert!(matches!(
        rx.recv().await.unwrap(),
        RegistryEvent::FarmTokenized { .. }
    ));
    assert_eq!(
        rx.recv().await.unwrap(),
        RegistryEvent::RegistryGrown { total_farms: 1 }
    );
    assert!(matches!(
        rx.recv().await.unwrap(),
        RegistryEvent::StateTransitioned { to: FarmState::Planting, .. }
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_tokenizes_publish_in_commit_order() {
    const FARMS: u64 = 32;
    let r = Arc::new(registry());
    let mut rx = r.subscribe();

    let handles: Vec<_> = (0..FARMS)
        .map(|i| {
            let r = r.clone();
            tokio::spawn(async move {
                r.tokenize(farm_request(1000 + i, "Parallel Farm"), &account(i as usize))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for expected_total in 1..=FARMS {
        let global_index = match rx.recv().await.unwrap() {
            RegistryEvent::FarmTokenized { global_index, .. } => global_index,
            other => panic!("expected FarmTokenized, got {:?}", other),
        };
        assert_eq!(global_index, expected_total);
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::RegistryGrown {
                total_farms: expected_total
            }
        );
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn events_serialize_with_tag() {
    let r = registry();
    let receipt = r.tokenize(arunga_vineyard(), &account(0)).await.unwrap();
    let json = serde_json::to_value(&receipt.events[1]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"event": "registry_grown", "total_farms": 1})
    );
}
