/// All errors that can be returned by a RegistryStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A farm with this token id has already been inserted.
    #[error("token already exists: {token_id}")]
    TokenExists { token_id: u64 },

    /// No farm with the given token id.
    #[error("token not found: {token_id}")]
    TokenNotFound { token_id: u64 },

    /// Global index outside `1..=farm_count`.
    #[error("global index {index} out of range (farm count {count})")]
    IndexOutOfRange { index: u64, count: u64 },

    /// Per-owner position outside `1..=owner_balance`.
    #[error("owner index {index} out of range for {owner} (balance {balance})")]
    OwnerIndexOutOfRange {
        owner: String,
        index: u64,
        balance: u64,
    },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
