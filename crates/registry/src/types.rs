//! Domain types: identities, lifecycle labels, and farm projections.

use std::fmt;
use std::str::FromStr;

use reap_storage::{FarmRecord, NewFarmRecord, TransitionRecord};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Reject empty labels and labels with surrounding whitespace.
fn check_label(what: &str, value: &str) -> Result<(), RegistryError> {
    if value.is_empty() {
        return Err(RegistryError::InvalidInput(format!(
            "{} must not be empty",
            what
        )));
    }
    if value.trim() != value {
        return Err(RegistryError::InvalidInput(format!(
            "{} '{}' has surrounding whitespace",
            what, value
        )));
    }
    Ok(())
}

/// An account identity, e.g. `0x66aB6D9362d4F35596279692F0251Db635165871`.
///
/// The registry treats identities as opaque; authenticating the caller is the
/// job of whatever sits in front of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Result<Self, RegistryError> {
        let value = value.into();
        check_label("identity", &value)?;
        Ok(Identity(value))
    }

    /// Wrap an identity read back from storage.
    pub(crate) fn from_stored(value: String) -> Self {
        Identity(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Cultivation phase of a farm.
///
/// The set is open: any non-empty label is a valid state, and the well-known
/// phases get their own variants. Transitions between any two labels are
/// allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FarmState {
    #[default]
    Dormant,
    Preparation,
    Planting,
    Growing,
    Harvesting,
    Other(String),
}

impl FarmState {
    pub fn as_str(&self) -> &str {
        match self {
            FarmState::Dormant => "Dormant",
            FarmState::Preparation => "Preparation",
            FarmState::Planting => "Planting",
            FarmState::Growing => "Growing",
            FarmState::Harvesting => "Harvesting",
            FarmState::Other(label) => label,
        }
    }

    /// Map a stored label back to a state without validating it.
    pub(crate) fn from_stored(label: String) -> Self {
        match label.as_str() {
            "Dormant" => FarmState::Dormant,
            "Preparation" => FarmState::Preparation,
            "Planting" => FarmState::Planting,
            "Growing" => FarmState::Growing,
            "Harvesting" => FarmState::Harvesting,
            _ => FarmState::Other(label),
        }
    }
}

impl fmt::Display for FarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FarmState {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_label("state", s)?;
        Ok(FarmState::from_stored(s.to_string()))
    }
}

impl TryFrom<String> for FarmState {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        check_label("state", &value)?;
        Ok(FarmState::from_stored(value))
    }
}

impl From<FarmState> for String {
    fn from(state: FarmState) -> Self {
        match state {
            FarmState::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

/// Input to `FarmRegistry::tokenize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeRequest {
    pub name: String,
    /// Free-form area description, e.g. `"294.32ha"`.
    pub size: String,
    pub location: String,
    /// Content address of the farm image, e.g. an IPFS CID.
    pub image_hash: String,
    pub soil: String,
    pub token_id: u64,
}

impl TokenizeRequest {
    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        for (field, value) in [
            ("name", &self.name),
            ("location", &self.location),
            ("image_hash", &self.image_hash),
        ] {
            if value.trim().is_empty() {
                return Err(RegistryError::InvalidInput(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_record(self, owner: &Identity, tokenized_at: &str) -> NewFarmRecord {
        NewFarmRecord {
            token_id: self.token_id,
            name: self.name,
            size: self.size,
            location: self.location,
            image_hash: self.image_hash,
            soil: self.soil,
            state: FarmState::Dormant.as_str().to_string(),
            owner: owner.as_str().to_string(),
            tokenized_at: tokenized_at.to_string(),
        }
    }
}

/// Full projection of a tokenized farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    pub token_id: u64,
    pub name: String,
    pub size: String,
    pub location: String,
    pub image_hash: String,
    pub soil: String,
    pub state: FarmState,
    pub owner: Identity,
    /// 1-based, assigned when the current owner acquired the farm.
    pub owner_index: u64,
    /// 1-based position in creation order.
    pub global_index: u64,
    pub tokenized_at: String,
    pub updated_at: String,
}

impl From<FarmRecord> for Farm {
    fn from(r: FarmRecord) -> Self {
        Farm {
            token_id: r.token_id,
            name: r.name,
            size: r.size,
            location: r.location,
            image_hash: r.image_hash,
            soil: r.soil,
            state: FarmState::from_stored(r.state),
            owner: Identity::from_stored(r.owner),
            owner_index: r.owner_index,
            global_index: r.global_index,
            tokenized_at: r.tokenized_at,
            updated_at: r.updated_at,
        }
    }
}

/// One entry of a farm's lifecycle history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub sequence: u64,
    pub from: FarmState,
    pub to: FarmState,
    pub caller: Identity,
    pub transitioned_at: String,
}

impl From<TransitionRecord> for StateTransition {
    fn from(r: TransitionRecord) -> Self {
        StateTransition {
            sequence: r.sequence,
            from: FarmState::from_stored(r.from_state),
            to: FarmState::from_stored(r.to_state),
            caller: Identity::from_stored(r.caller),
            transitioned_at: r.transitioned_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_parse_to_named_variants() {
        assert_eq!("Dormant".parse::<FarmState>().unwrap(), FarmState::Dormant);
        assert_eq!(
            "Preparation".parse::<FarmState>().unwrap(),
            FarmState::Preparation
        );
        assert_eq!(
            "Fallow".parse::<FarmState>().unwrap(),
            FarmState::Other("Fallow".to_string())
        );
    }

    #[test]
    fn blank_or_padded_labels_are_rejected() {
        for bad in ["", " Planting", "Planting\n"] {
            let err = bad.parse::<FarmState>().unwrap_err();
            assert_eq!(err.kind(), "invalid_input", "label {:?}", bad);
        }
        assert!(Identity::new("").is_err());
        assert!(Identity::new("0xabc ").is_err());
    }

    #[test]
    fn state_serializes_as_bare_label() {
        let json = serde_json::to_string(&FarmState::Planting).unwrap();
        assert_eq!(json, "\"Planting\"");
        let other: FarmState = serde_json::from_str("\"Fallow\"").unwrap();
        assert_eq!(other.as_str(), "Fallow");
        assert!(serde_json::from_str::<FarmState>("\"\"").is_err());
    }

    #[test]
    fn tokenize_request_requires_name_location_and_image() {
        let mut req = TokenizeRequest {
            name: "Arunga Vineyard".to_string(),
            size: String::new(),
            location: "Lyaduywa, Kenya".to_string(),
            image_hash: "QmUfideC1r5JhMVwgd8vjC7DtVnXw3QGfCSQA7fUVHK789".to_string(),
            soil: String::new(),
            token_id: 1,
        };
        assert!(req.validate().is_ok());
        req.location = "   ".to_string();
        assert!(matches!(
            req.validate(),
            Err(RegistryError::InvalidInput(msg)) if msg.contains("location")
        ));
    }
}
