//! Versioned entity store for the Tradelab exchange experiment.
//!
//! Trader and market records carry a version counter and are only ever
//! rewritten through a compare-and-swap on that counter. Session records are
//! plain last-write-wins values with an expiry.
//!
//! # Architecture
//!
//! ```text
//! Handler
//!     |
//!     +-- get / conditional_write --> VersionedStore
//!     |                                 |-- MemoryStore     (in-process)
//!     |                                 +-- DragonflyStore  (Lua CAS)
//!     |
//!     +-- trader_ids_by_market -----> RecipientResolver
//! ```
//!
//! # Modules
//!
//! - [`versioned`] -- [`VersionedStore`] and [`RecipientResolver`] traits
//! - [`key`] -- Entity key scheme
//! - [`memory`] -- In-process implementation
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) implementation
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod key;
pub mod memory;
pub mod versioned;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyStore;
pub use error::StoreError;
pub use key::EntityKey;
pub use memory::MemoryStore;
pub use versioned::{
    MAX_SESSION_TTL_SECS, RecipientResolver, VersionedRecord, VersionedStore, session_ttl_secs,
};
