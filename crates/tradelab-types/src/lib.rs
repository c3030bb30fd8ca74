//! Shared type definitions for the Tradelab exchange experiment.
//!
//! This crate is the single source of truth for the values that flow between
//! the dispatcher, the entity store, and the domain model.
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed entity identifiers
//! - [`enums`] -- Entity kinds and session/exchange formats
//! - [`fields`] -- Event field maps and typed field accessors
//! - [`envelope`] -- The in-flight [`Envelope`] and [`OutgoingMessage`]
//! - [`checkpoint`] -- Records handed to the checkpoint sink

pub mod checkpoint;
pub mod enums;
pub mod envelope;
pub mod fields;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use checkpoint::{Checkpoint, CheckpointKind};
pub use enums::{EntityKind, ExchangeFormat, SessionFormat};
pub use envelope::{Channel, Envelope, OutgoingMessage};
pub use fields::{FieldError, Fields};
pub use ids::{EventId, MarketId, SubsessionId, TraderId};
