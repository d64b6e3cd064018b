//! The farm registry service.
//!
//! Mutations follow one shape:
//! 1. Validate input (no snapshot yet)
//! 2. Begin a storage snapshot
//! 3. Read the farm for update, check existence, then ownership
//! 4. Apply writes and build events
//! 5. Commit, then publish events; any failure aborts the snapshot
//!
//! Events reach subscribers only after the commit succeeds, so a listener
//! never hears about a change that was rolled back. Each mutation holds the
//! registry's write lock from step 2 until its events are published, so
//! subscribers see events in commit order.

use reap_storage::{NewTransitionRecord, RegistryStorage};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::event::{Receipt, RegistryEvent, TokenizeReceipt};
use crate::types::{Farm, FarmState, Identity, StateTransition, TokenizeRequest};
use crate::{NAME, SYMBOL};

/// Default number of undelivered events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

fn timestamp() -> Result<String, RegistryError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| RegistryError::Internal(format!("failed to format timestamp: {}", e)))
}

fn authorize(farm_owner: &str, token_id: u64, caller: &Identity) -> Result<(), RegistryError> {
    if farm_owner != caller.as_str() {
        return Err(RegistryError::Unauthorized {
            token_id,
            caller: caller.to_string(),
        });
    }
    Ok(())
}

/// Authoritative ledger of tokenized farms.
///
/// Construct one per store and share it by reference (or `Arc`); there is no
/// global instance.
pub struct FarmRegistry<S> {
    storage: S,
    events: broadcast::Sender<RegistryEvent>,
    /// Held across commit and publish.
    write_lock: Mutex<()>,
}

impl<S: RegistryStorage> FarmRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self::with_event_capacity(storage, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(storage: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        FarmRegistry {
            storage,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Human-readable registry name.
    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOL
    }

    /// Receive events for every mutation committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, events: &[RegistryEvent]) {
        for event in events {
            // No subscribers is not an error.
            let _ = self.events.send(event.clone());
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Create a new farm owned by `caller`, starting in `Dormant`.
    ///
    /// Emits `FarmTokenized` followed by `RegistryGrown`.
    pub async fn tokenize(
        &self,
        request: TokenizeRequest,
        caller: &Identity,
    ) -> Result<TokenizeReceipt, RegistryError> {
        request.validate()?;
        let now = timestamp()?;
        let token_id = request.token_id;

        let _serial = self.write_lock.lock().await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let record = match self
            .storage
            .insert_farm(&mut snapshot, request.into_record(caller, &now))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                debug!(token_id, caller = %caller, error = %e, "tokenize rejected");
                return Err(e.into());
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        // Writers are serialized, so the newest global index is the total.
        let total_farms = record.global_index;
        let farm = Farm::from(record);
        let events = vec![
            RegistryEvent::FarmTokenized {
                token_id,
                owner: farm.owner.clone(),
                name: farm.name.clone(),
                global_index: farm.global_index,
                owner_index: farm.owner_index,
            },
            RegistryEvent::RegistryGrown { total_farms },
        ];
        info!(token_id, owner = %caller, total_farms, "farm tokenized");
        self.publish(&events);

        Ok(TokenizeReceipt { farm, events })
    }

    /// Move a farm to `new_state`. Only the owner may do this.
    ///
    /// A missing token is reported as `NotFound` before ownership is checked.
    pub async fn transition_state(
        &self,
        token_id: u64,
        new_state: FarmState,
        caller: &Identity,
    ) -> Result<Receipt, RegistryError> {
        let now = timestamp()?;

        let _serial = self.write_lock.lock().await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let event = match self
            .apply_transition(&mut snapshot, token_id, new_state, caller, &now)
            .await
        {
            Ok(event) => event,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                debug!(token_id, caller = %caller, error = %e, "transition rejected");
                return Err(e);
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        if let RegistryEvent::StateTransitioned { from, to, .. } = &event {
            info!(token_id, %from, %to, "farm state transitioned");
        }
        let events = vec![event];
        self.publish(&events);
        Ok(Receipt { events })
    }

    async fn apply_transition(
        &self,
        snapshot: &mut S::Snapshot,
        token_id: u64,
        new_state: FarmState,
        caller: &Identity,
        now: &str,
    ) -> Result<RegistryEvent, RegistryError> {
        let current = self.storage.get_farm_for_update(snapshot, token_id).await?;
        authorize(&current.owner, token_id, caller)?;

        self.storage
            .update_farm_state(snapshot, token_id, new_state.as_str(), now)
            .await?;
        self.storage
            .insert_transition(
                snapshot,
                NewTransitionRecord {
                    token_id,
                    from_state: current.state.clone(),
                    to_state: new_state.as_str().to_string(),
                    caller: caller.as_str().to_string(),
                    transitioned_at: now.to_string(),
                },
            )
            .await?;

        Ok(RegistryEvent::StateTransitioned {
            token_id,
            from: FarmState::from_stored(current.state),
            to: new_state,
            caller: caller.clone(),
        })
    }

    /// Hand a farm to `to`. Only the owner may do this.
    ///
    /// Transferring to the current owner succeeds without emitting anything.
    pub async fn transfer(
        &self,
        token_id: u64,
        to: &Identity,
        caller: &Identity,
    ) -> Result<Receipt, RegistryError> {
        let now = timestamp()?;

        let _serial = self.write_lock.lock().await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let event = match self
            .apply_transfer(&mut snapshot, token_id, to, caller, &now)
            .await
        {
            Ok(event) => event,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                debug!(token_id, caller = %caller, error = %e, "transfer rejected");
                return Err(e);
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        let events: Vec<RegistryEvent> = event.into_iter().collect();
        if !events.is_empty() {
            info!(token_id, from = %caller, to = %to, "farm transferred");
        }
        self.publish(&events);
        Ok(Receipt { events })
    }

    async fn apply_transfer(
        &self,
        snapshot: &mut S::Snapshot,
        token_id: u64,
        to: &Identity,
        caller: &Identity,
        now: &str,
    ) -> Result<Option<RegistryEvent>, RegistryError> {
        let current = self.storage.get_farm_for_update(snapshot, token_id).await?;
        authorize(&current.owner, token_id, caller)?;
        if current.owner == to.as_str() {
            return Ok(None);
        }
        self.storage
            .update_farm_owner(snapshot, token_id, to.as_str(), now)
            .await?;
        Ok(Some(RegistryEvent::Transferred {
            token_id,
            from: caller.clone(),
            to: to.clone(),
        }))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn exists(&self, token_id: u64) -> Result<bool, RegistryError> {
        Ok(self.storage.farm_exists(token_id).await?)
    }

    pub async fn owner_of(&self, token_id: u64) -> Result<Identity, RegistryError> {
        Ok(self.get_farm(token_id).await?.owner)
    }

    /// Number of farms `owner` currently holds.
    pub async fn balance_of(&self, owner: &Identity) -> Result<u64, RegistryError> {
        Ok(self.storage.owner_balance(owner.as_str()).await?)
    }

    pub async fn total_supply(&self) -> Result<u64, RegistryError> {
        Ok(self.storage.farm_count().await?)
    }

    /// Same count as [`total_supply`](Self::total_supply).
    pub async fn total_tokenized_farms(&self) -> Result<u64, RegistryError> {
        self.total_supply().await
    }

    pub async fn get_farm(&self, token_id: u64) -> Result<Farm, RegistryError> {
        Ok(self.storage.get_farm(token_id).await?.into())
    }

    pub async fn get_token_state(&self, token_id: u64) -> Result<FarmState, RegistryError> {
        Ok(self.get_farm(token_id).await?.state)
    }

    /// The `index`-th (1-based) farm among `owner`'s holdings.
    pub async fn query_user_tokenized_farm(
        &self,
        owner: &Identity,
        index: u64,
    ) -> Result<Farm, RegistryError> {
        Ok(self
            .storage
            .owner_farm_at(owner.as_str(), index)
            .await?
            .into())
    }

    /// The `index`-th (1-based) farm in creation order.
    pub async fn query_tokenized_farm(&self, index: u64) -> Result<Farm, RegistryError> {
        Ok(self.storage.farm_at(index).await?.into())
    }

    /// All farms `owner` holds, in the order `query_user_tokenized_farm` walks them.
    pub async fn farms_of(&self, owner: &Identity) -> Result<Vec<Farm>, RegistryError> {
        let records = self.storage.list_owner_farms(owner.as_str()).await?;
        Ok(records.into_iter().map(Farm::from).collect())
    }

    pub async fn state_history(&self, token_id: u64) -> Result<Vec<StateTransition>, RegistryError> {
        if !self.storage.farm_exists(token_id).await? {
            return Err(RegistryError::NotFound(crate::Lookup::Token(token_id)));
        }
        let records = self.storage.list_transitions(token_id).await?;
        Ok(records.into_iter().map(StateTransition::from).collect())
    }
}
