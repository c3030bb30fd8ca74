//! Trader, market, and trade session entities for the Tradelab exchange experiment.
//!
//! This crate is the logic layer for the three entity kinds -- everything that
//! decides how an event changes an entity's state, without touching I/O. The
//! dispatcher loads snapshots from the store, rebuilds entities here, calls
//! `receive`, takes the produced messages, and writes the snapshot back.
//!
//! Every entity buffers its outgoing messages internally and hands them over
//! with `take_outgoing`, which leaves the buffer empty.
//!
//! # Modules
//!
//! - [`error`] -- [`DomainError`]
//! - [`order`] -- Resting orders and order tokens
//! - [`role`] -- Trader roles and the [`TraderVariant`] factory
//! - [`trader`] -- [`Trader`], [`SubjectState`] and the stored [`TraderRecord`]
//! - [`market`] -- [`Market`] and its observer-attachment table
//! - [`session`] -- [`TradeSession`] and its server-side [`Mailbox`]

pub mod error;
pub mod market;
pub mod order;
pub mod role;
pub mod session;
pub mod trader;

// Re-export primary types at crate root for convenience.
pub use error::DomainError;
pub use market::{Market, MarketRecord};
pub use order::{Order, Side};
pub use role::{TraderRole, TraderVariant};
pub use session::{ClientHandle, ClientRole, Mailbox, SessionPhase, TradeSession};
pub use trader::{Sensitivities, SubjectState, Trader, TraderRecord};
