use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{FarmRecord, NewFarmRecord, NewTransitionRecord, TransitionRecord};

/// The storage trait for farm registry backends.
///
/// A `RegistryStorage` implementation provides transactional storage for
/// farm records, their ownership indexes, and their lifecycle transitions.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` -- start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` -- commit and consume the transaction
///    OR `abort_snapshot(snapshot)` -- roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the transaction MUST be
/// rolled back.
///
/// ## Serialized Writers
///
/// At most one snapshot is open at a time: `begin_snapshot` waits until the
/// previous snapshot has been committed, aborted, or dropped. Query methods
/// never observe uncommitted writes.
///
/// ## Indexes
///
/// Global indexes and per-owner indexes are 1-based, assigned monotonically,
/// and never reused. The per-owner *position* used by `owner_farm_at` is the
/// rank of a farm among the owner's current holdings ordered by
/// `owner_index`; without transfers the two coincide.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait RegistryStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations visible.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Farm operations (within snapshot) ────────────────────────────────────

    /// Insert a new farm, assigning its global index and the owner's next index.
    ///
    /// Returns `Err(StorageError::TokenExists)` if the token id is taken.
    async fn insert_farm(
        &self,
        snapshot: &mut Self::Snapshot,
        farm: NewFarmRecord,
    ) -> Result<FarmRecord, StorageError>;

    /// Read a farm as seen by the snapshot, including its own uncommitted writes.
    ///
    /// Returns `Err(StorageError::TokenNotFound)` if the farm does not exist.
    async fn get_farm_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        token_id: u64,
    ) -> Result<FarmRecord, StorageError>;

    /// Set a farm's lifecycle label. Returns the updated record.
    async fn update_farm_state(
        &self,
        snapshot: &mut Self::Snapshot,
        token_id: u64,
        new_state: &str,
        updated_at: &str,
    ) -> Result<FarmRecord, StorageError>;

    /// Move a farm to a new owner, assigning the new owner's next index.
    ///
    /// Moving a farm to its current owner leaves the record untouched.
    async fn update_farm_owner(
        &self,
        snapshot: &mut Self::Snapshot,
        token_id: u64,
        new_owner: &str,
        updated_at: &str,
    ) -> Result<FarmRecord, StorageError>;

    /// Append a transition record for an existing farm.
    async fn insert_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        transition: NewTransitionRecord,
    ) -> Result<TransitionRecord, StorageError>;

    // ── Query operations (committed state) ────────────────────────────────────

    /// Read a farm by token id.
    ///
    /// Returns `Err(StorageError::TokenNotFound)` if the farm does not exist.
    async fn get_farm(&self, token_id: u64) -> Result<FarmRecord, StorageError>;

    async fn farm_exists(&self, token_id: u64) -> Result<bool, StorageError>;

    /// Total number of farms ever inserted.
    async fn farm_count(&self) -> Result<u64, StorageError>;

    /// Number of farms currently held by `owner`.
    async fn owner_balance(&self, owner: &str) -> Result<u64, StorageError>;

    /// Farm at 1-based `index` in global creation order.
    ///
    /// Returns `Err(StorageError::IndexOutOfRange)` for 0 or past the end.
    async fn farm_at(&self, index: u64) -> Result<FarmRecord, StorageError>;

    /// Farm at 1-based `position` among `owner`'s holdings.
    ///
    /// Returns `Err(StorageError::OwnerIndexOutOfRange)` for 0 or past the balance.
    async fn owner_farm_at(&self, owner: &str, position: u64) -> Result<FarmRecord, StorageError>;

    /// All farms currently held by `owner`, ordered by `owner_index`.
    async fn list_owner_farms(&self, owner: &str) -> Result<Vec<FarmRecord>, StorageError>;

    /// Transition history of a farm, oldest first. Empty for unknown tokens.
    async fn list_transitions(&self, token_id: u64) -> Result<Vec<TransitionRecord>, StorageError>;
}
