//! In-process `RegistryStorage` backend.
//!
//! A snapshot holds the writer lock and records only what it touches: new
//! and modified farms, the owner books it changes, and appended transitions.
//! Reads inside the snapshot fall through to the committed ledger. Commit
//! folds the overlay into the ledger; abort or drop discards it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StorageError;
use crate::record::{FarmRecord, NewFarmRecord, NewTransitionRecord, TransitionRecord};
use crate::traits::RegistryStorage;

/// Holdings of a single owner.
#[derive(Debug, Clone, Default)]
struct OwnerBook {
    /// Highest owner index handed out so far.
    issued: u64,
    /// owner_index -> token_id
    holdings: BTreeMap<u64, u64>,
}

#[derive(Debug, Default)]
struct Ledger {
    farms: HashMap<u64, FarmRecord>,
    /// Token ids in creation order; position + 1 is the global index.
    order: Vec<u64>,
    owners: HashMap<String, OwnerBook>,
    transitions: HashMap<u64, Vec<TransitionRecord>>,
}

/// Writes made inside one snapshot, not yet visible to readers.
#[derive(Debug, Default)]
struct Overlay {
    /// Farms created or modified; replaces the committed record on commit.
    farms: HashMap<u64, FarmRecord>,
    /// Token ids created, appended after the committed order.
    order: Vec<u64>,
    /// Owner books touched; each replaces the committed book on commit.
    owners: HashMap<String, OwnerBook>,
    /// Transitions appended per token.
    transitions: HashMap<u64, Vec<TransitionRecord>>,
}

impl Ledger {
    fn farm(&self, token_id: u64) -> Result<&FarmRecord, StorageError> {
        self.farms
            .get(&token_id)
            .ok_or(StorageError::TokenNotFound { token_id })
    }

    fn apply(&mut self, overlay: Overlay) {
        self.farms.extend(overlay.farms);
        self.order.extend(overlay.order);
        self.owners.extend(overlay.owners);
        for (token_id, records) in overlay.transitions {
            self.transitions.entry(token_id).or_default().extend(records);
        }
    }

    fn balance(&self, owner: &str) -> u64 {
        self.owners
            .get(owner)
            .map(|book| book.holdings.len() as u64)
            .unwrap_or(0)
    }

    fn at(&self, index: u64) -> Result<&FarmRecord, StorageError> {
        let count = self.order.len() as u64;
        if index == 0 || index > count {
            return Err(StorageError::IndexOutOfRange { index, count });
        }
        self.farm(self.order[(index - 1) as usize])
    }

    fn owner_at(&self, owner: &str, position: u64) -> Result<&FarmRecord, StorageError> {
        let out_of_range = || StorageError::OwnerIndexOutOfRange {
            owner: owner.to_string(),
            index: position,
            balance: self.balance(owner),
        };
        if position == 0 {
            return Err(out_of_range());
        }
        let token_id = self
            .owners
            .get(owner)
            .and_then(|book| book.holdings.values().nth((position - 1) as usize))
            .ok_or_else(out_of_range)?;
        self.farm(*token_id)
    }

    fn owner_farms(&self, owner: &str) -> Vec<FarmRecord> {
        self.owners
            .get(owner)
            .map(|book| {
                book.holdings
                    .values()
                    .filter_map(|token_id| self.farms.get(token_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The committed ledger seen through a snapshot's overlay.
struct Draft<'a> {
    base: &'a Ledger,
    overlay: &'a mut Overlay,
}

impl Draft<'_> {
    fn farm(&self, token_id: u64) -> Result<&FarmRecord, StorageError> {
        match self.overlay.farms.get(&token_id) {
            Some(farm) => Ok(farm),
            None => self.base.farm(token_id),
        }
    }

    /// Copy-on-write access to a single farm.
    fn farm_mut(&mut self, token_id: u64) -> Result<&mut FarmRecord, StorageError> {
        if !self.overlay.farms.contains_key(&token_id) {
            let farm = self.base.farm(token_id)?.clone();
            self.overlay.farms.insert(token_id, farm);
        }
        self.overlay
            .farms
            .get_mut(&token_id)
            .ok_or(StorageError::TokenNotFound { token_id })
    }

    fn book_mut(&mut self, owner: &str) -> &mut OwnerBook {
        let base = self.base;
        self.overlay
            .owners
            .entry(owner.to_string())
            .or_insert_with(|| base.owners.get(owner).cloned().unwrap_or_default())
    }

    /// Give `token_id` to `owner`, returning the owner index it was assigned.
    fn grant(&mut self, owner: &str, token_id: u64) -> u64 {
        let book = self.book_mut(owner);
        book.issued += 1;
        book.holdings.insert(book.issued, token_id);
        book.issued
    }

    fn insert(&mut self, farm: NewFarmRecord) -> Result<FarmRecord, StorageError> {
        if self.farm(farm.token_id).is_ok() {
            return Err(StorageError::TokenExists {
                token_id: farm.token_id,
            });
        }
        let owner_index = self.grant(&farm.owner, farm.token_id);
        self.overlay.order.push(farm.token_id);
        let record = FarmRecord {
            token_id: farm.token_id,
            name: farm.name,
            size: farm.size,
            location: farm.location,
            image_hash: farm.image_hash,
            soil: farm.soil,
            state: farm.state,
            owner: farm.owner,
            owner_index,
            global_index: (self.base.order.len() + self.overlay.order.len()) as u64,
            updated_at: farm.tokenized_at.clone(),
            tokenized_at: farm.tokenized_at,
        };
        self.overlay.farms.insert(record.token_id, record.clone());
        Ok(record)
    }

    fn reassign(
        &mut self,
        token_id: u64,
        new_owner: &str,
        updated_at: &str,
    ) -> Result<FarmRecord, StorageError> {
        let current = self.farm(token_id)?;
        if current.owner == new_owner {
            return Ok(current.clone());
        }
        let (old_owner, old_index) = (current.owner.clone(), current.owner_index);
        self.book_mut(&old_owner).holdings.remove(&old_index);
        let owner_index = self.grant(new_owner, token_id);
        let farm = self.farm_mut(token_id)?;
        farm.owner = new_owner.to_string();
        farm.owner_index = owner_index;
        farm.updated_at = updated_at.to_string();
        Ok(farm.clone())
    }

    fn push_transition(
        &mut self,
        transition: NewTransitionRecord,
    ) -> Result<TransitionRecord, StorageError> {
        let token_id = transition.token_id;
        self.farm(token_id)?;
        let committed = self.base.transitions.get(&token_id).map_or(0, Vec::len);
        let history = self.overlay.transitions.entry(token_id).or_default();
        let record = TransitionRecord {
            token_id,
            sequence: (committed + history.len()) as u64 + 1,
            from_state: transition.from_state,
            to_state: transition.to_state,
            caller: transition.caller,
            transitioned_at: transition.transitioned_at,
        };
        history.push(record.clone());
        Ok(record)
    }
}

/// An open transaction against a [`MemoryStorage`].
///
/// Holds the writer lock until committed, aborted, or dropped.
pub struct MemorySnapshot {
    overlay: Overlay,
    _writer: OwnedMutexGuard<()>,
}

impl MemorySnapshot {
    fn draft<'a>(&'a mut self, base: &'a Ledger) -> Draft<'a> {
        Draft {
            base,
            overlay: &mut self.overlay,
        }
    }
}

/// In-memory registry storage. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    committed: RwLock<Ledger>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        Ok(MemorySnapshot {
            overlay: Overlay::default(),
            _writer: writer,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot { overlay, _writer } = snapshot;
        self.committed.write().await.apply(overlay);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_farm(
        &self,
        snapshot: &mut MemorySnapshot,
        farm: NewFarmRecord,
    ) -> Result<FarmRecord, StorageError> {
        let base = self.committed.read().await;
        snapshot.draft(&base).insert(farm)
    }

    async fn get_farm_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        token_id: u64,
    ) -> Result<FarmRecord, StorageError> {
        let base = self.committed.read().await;
        snapshot.draft(&base).farm(token_id).cloned()
    }

    async fn update_farm_state(
        &self,
        snapshot: &mut MemorySnapshot,
        token_id: u64,
        new_state: &str,
        updated_at: &str,
    ) -> Result<FarmRecord, StorageError> {
        let base = self.committed.read().await;
        let mut draft = snapshot.draft(&base);
        let farm = draft.farm_mut(token_id)?;
        farm.state = new_state.to_string();
        farm.updated_at = updated_at.to_string();
        Ok(farm.clone())
    }

    async fn update_farm_owner(
        &self,
        snapshot: &mut MemorySnapshot,
        token_id: u64,
        new_owner: &str,
        updated_at: &str,
    ) -> Result<FarmRecord, StorageError> {
        let base = self.committed.read().await;
        snapshot
            .draft(&base)
            .reassign(token_id, new_owner, updated_at)
    }

    async fn insert_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        transition: NewTransitionRecord,
    ) -> Result<TransitionRecord, StorageError> {
        let base = self.committed.read().await;
        snapshot.draft(&base).push_transition(transition)
    }

    async fn get_farm(&self, token_id: u64) -> Result<FarmRecord, StorageError> {
        self.committed.read().await.farm(token_id).cloned()
    }

    async fn farm_exists(&self, token_id: u64) -> Result<bool, StorageError> {
        Ok(self.committed.read().await.farms.contains_key(&token_id))
    }

    async fn farm_count(&self) -> Result<u64, StorageError> {
        Ok(self.committed.read().await.order.len() as u64)
    }

    async fn owner_balance(&self, owner: &str) -> Result<u64, StorageError> {
        Ok(self.committed.read().await.balance(owner))
    }

    async fn farm_at(&self, index: u64) -> Result<FarmRecord, StorageError> {
        self.committed.read().await.at(index).cloned()
    }

    async fn owner_farm_at(&self, owner: &str, position: u64) -> Result<FarmRecord, StorageError> {
        self.committed.read().await.owner_at(owner, position).cloned()
    }

    async fn list_owner_farms(&self, owner: &str) -> Result<Vec<FarmRecord>, StorageError> {
        Ok(self.committed.read().await.owner_farms(owner))
    }

    async fn list_transitions(&self, token_id: u64) -> Result<Vec<TransitionRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .await
            .transitions
            .get(&token_id)
            .cloned()
            .unwrap_or_default())
    }
}
