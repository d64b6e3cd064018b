use std::fmt;

use reap_storage::StorageError;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Token(u64),
    GlobalIndex { index: u64, count: u64 },
    OwnerIndex { owner: String, index: u64, balance: u64 },
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Token(token_id) => write!(f, "farm token {}", token_id),
            Lookup::GlobalIndex { index, count } => {
                write!(f, "farm at index {} (registry holds {})", index, count)
            }
            Lookup::OwnerIndex {
                owner,
                index,
                balance,
            } => write!(
                f,
                "farm at index {} for owner {} (owner holds {})",
                index, owner, balance
            ),
        }
    }
}

/// Errors returned by `FarmRegistry` operations.
///
/// Every error leaves the registry exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The token id has already been tokenized.
    #[error("farm token {token_id} has already been tokenized")]
    DuplicateId { token_id: u64 },

    /// A token id or a 1-based index does not resolve to a farm.
    #[error("{0} not found")]
    NotFound(Lookup),

    /// The caller does not own the farm it tried to mutate.
    #[error("{caller} is not the owner of farm token {token_id}")]
    Unauthorized { token_id: u64, caller: String },

    /// Malformed request field, identity, or state label.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl RegistryError {
    /// Stable machine-readable label for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::DuplicateId { .. } => "duplicate_id",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Unauthorized { .. } => "unauthorized",
            RegistryError::InvalidInput(_) => "invalid_input",
            RegistryError::Internal(_) => "internal",
            RegistryError::Storage(_) => "storage",
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::TokenExists { token_id } => RegistryError::DuplicateId { token_id },
            StorageError::TokenNotFound { token_id } => {
                RegistryError::NotFound(Lookup::Token(token_id))
            }
            StorageError::IndexOutOfRange { index, count } => {
                RegistryError::NotFound(Lookup::GlobalIndex { index, count })
            }
            StorageError::OwnerIndexOutOfRange {
                owner,
                index,
                balance,
            } => RegistryError::NotFound(Lookup::OwnerIndex {
                owner,
                index,
                balance,
            }),
            other => RegistryError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_registry_taxonomy() {
        let dup: RegistryError = StorageError::TokenExists { token_id: 7 }.into();
        assert!(matches!(dup, RegistryError::DuplicateId { token_id: 7 }));

        let missing: RegistryError = StorageError::TokenNotFound { token_id: 2 }.into();
        assert_eq!(missing.kind(), "not_found");
        assert_eq!(missing.to_string(), "farm token 2 not found");

        let out_of_range: RegistryError =
            StorageError::IndexOutOfRange { index: 3, count: 1 }.into();
        assert!(matches!(
            out_of_range,
            RegistryError::NotFound(Lookup::GlobalIndex { index: 3, count: 1 })
        ));

        let backend: RegistryError = StorageError::Backend("disk full".to_string()).into();
        assert_eq!(backend.kind(), "storage");
    }

    #[test]
    fn unauthorized_message_names_caller_and_token() {
        let e = RegistryError::Unauthorized {
            token_id: 293730023,
            caller: "0xbeef".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "0xbeef is not the owner of farm token 293730023"
        );
    }
}
