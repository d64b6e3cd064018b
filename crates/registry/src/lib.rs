//! Reap farm registry -- tokenizes farm records, tracks ownership, and
//! manages each farm's lifecycle state.
//!
//! The registry is generic over a [`RegistryStorage`](reap_storage::RegistryStorage)
//! backend. Every mutation runs in a single storage snapshot: it either
//! commits completely or leaves no trace. The caller identity is an explicit
//! argument to every mutation and is trusted as given.
//!
//! ```ignore
//! use reap_registry::{FarmRegistry, FarmState, Identity, TokenizeRequest};
//! use reap_storage::MemoryStorage;
//!
//! let registry = FarmRegistry::new(MemoryStorage::new());
//! let owner = Identity::new("0xA")?;
//! registry.tokenize(request, &owner).await?;
//! registry.transition_state(293730023, FarmState::Preparation, &owner).await?;
//! ```

pub mod error;
pub mod event;
pub mod registry;
pub mod types;

pub use error::{Lookup, RegistryError};
pub use event::{Receipt, RegistryEvent, TokenizeReceipt};
pub use registry::{FarmRegistry, DEFAULT_EVENT_CAPACITY};
pub use types::{Farm, FarmState, Identity, StateTransition, TokenizeRequest};

/// Registry name exposed as read-only metadata.
pub const NAME: &str = "Reap";

/// Registry symbol exposed as read-only metadata.
pub const SYMBOL: &str = "REA";
