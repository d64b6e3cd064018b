use serde::{Deserialize, Serialize};

use crate::types::{Farm, FarmState, Identity};

/// Change notification emitted by a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A new farm record was created.
    FarmTokenized {
        token_id: u64,
        owner: Identity,
        name: String,
        global_index: u64,
        owner_index: u64,
    },
    /// The registry grew; always follows `FarmTokenized`.
    RegistryGrown { total_farms: u64 },
    StateTransitioned {
        token_id: u64,
        from: FarmState,
        to: FarmState,
        caller: Identity,
    },
    Transferred {
        token_id: u64,
        from: Identity,
        to: Identity,
    },
}

/// Committed result of a mutation, with the events it emitted in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub events: Vec<RegistryEvent>,
}

/// Committed result of `FarmRegistry::tokenize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizeReceipt {
    pub farm: Farm,
    pub events: Vec<RegistryEvent>,
}
