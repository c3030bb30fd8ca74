//! Event dispatch and optimistic concurrency for the Tradelab exchange
//! experiment.
//!
//! The [`Dispatcher`] receives an [`Envelope`](tradelab_types::Envelope)
//! tagged with a handler category, loads the addressed entity from a
//! [`VersionedStore`](tradelab_store::VersionedStore), applies the event, and
//! commits the new snapshot with a compare-and-swap. Lost races are retried
//! from a fresh read with jittered backoff until a bounded budget runs out.
//!
//! # Modules
//!
//! - [`category`] -- [`HandlerCategory`] routing tags
//! - [`checkpoint`] -- [`CheckpointSink`] and the JSON-lines writer
//! - [`config`] -- [`ExchangeConfig`] loaded from `tradelab-config.yaml`
//! - [`dispatcher`] -- [`Dispatcher`] and [`DispatchSettings`]
//! - [`error`] -- [`DispatchError`]
//! - [`handlers`] -- One handler per category
//! - [`registry`] -- [`SessionRegistry`] for session mailboxes
//! - [`retry`] -- [`RetryPolicy`] and the compare-and-swap loop
//! - [`setup`] -- Seeding entities from configuration

pub mod category;
pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod retry;
pub mod setup;

// Re-export primary types at crate root for convenience.
pub use category::HandlerCategory;
pub use checkpoint::{
    ChannelCheckpointSink, CheckpointSink, MemoryCheckpointSink, NullCheckpointSink,
    spawn_checkpoint_writer,
};
pub use config::{ConfigError, ExchangeConfig};
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::DispatchError;
pub use registry::{SessionGuard, SessionRegistry};
pub use retry::{Attempt, RetryPolicy};
pub use setup::{SeedSummary, seed};
