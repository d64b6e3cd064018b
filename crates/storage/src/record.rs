use serde::{Deserialize, Serialize};

/// A farm as stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmRecord {
    pub token_id: u64,
    pub name: String,
    pub size: String,
    pub location: String,
    pub image_hash: String,
    pub soil: String,
    /// Lifecycle label, e.g. `"Dormant"`.
    pub state: String,
    pub owner: String,
    /// 1-based position assigned by the owner's counter when the owner acquired the farm.
    pub owner_index: u64,
    /// 1-based position in global creation order.
    pub global_index: u64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub tokenized_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

/// Input for `RegistryStorage::insert_farm`. Indexes are assigned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFarmRecord {
    pub token_id: u64,
    pub name: String,
    pub size: String,
    pub location: String,
    pub image_hash: String,
    pub soil: String,
    pub state: String,
    pub owner: String,
    /// ISO 8601 / RFC 3339 timestamp string. Also used as the initial `updated_at`.
    pub tokenized_at: String,
}

/// A single lifecycle state transition of one farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub token_id: u64,
    /// 1-based, per token.
    pub sequence: u64,
    pub from_state: String,
    pub to_state: String,
    pub caller: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub transitioned_at: String,
}

/// Input for `RegistryStorage::insert_transition`. The sequence is assigned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransitionRecord {
    pub token_id: u64,
    pub from_state: String,
    pub to_state: String,
    pub caller: String,
    pub transitioned_at: String,
}
