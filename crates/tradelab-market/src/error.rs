//! Error types for the domain entities.

use tradelab_types::{ExchangeFormat, FieldError, MarketId, SessionFormat};

/// Errors raised while applying an event to an entity.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// No trader variant is registered for this format pair.
    #[error("no trader variant for session format {session_format} and exchange format {exchange_format}")]
    UnknownTraderVariant {
        /// The configured session format.
        session_format: SessionFormat,
        /// The configured exchange format.
        exchange_format: ExchangeFormat,
    },

    /// The stored role name is not valid for the trader variant.
    #[error("role {role:?} is not available to {variant} traders")]
    UnknownRole {
        /// Name of the trader variant.
        variant: &'static str,
        /// The rejected role name.
        role: String,
    },

    /// The entity does not handle this event type.
    #[error("{entity} does not handle event type {event_type:?}")]
    UnhandledEvent {
        /// Which kind of entity rejected the event.
        entity: &'static str,
        /// The unhandled event type.
        event_type: String,
    },

    /// The event is valid but not allowed for the trader's current role.
    #[error("role {role} cannot process {event_type:?}")]
    RoleRejects {
        /// The trader's role.
        role: String,
        /// The rejected event type.
        event_type: String,
    },

    /// An event field is missing or malformed.
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// An exchange message referred to an order the trader does not hold.
    #[error("unknown order token: {0}")]
    UnknownOrder(String),

    /// A session event named a market that is not part of the session.
    #[error("market {0} is not part of this session")]
    UnknownMarket(MarketId),

    /// An order arrived while the market is not running.
    #[error("market {0} is not running")]
    MarketClosed(MarketId),

    /// An arithmetic overflow in a balance or counter.
    #[error("arithmetic overflow: {context}")]
    Overflow {
        /// What was being computed.
        context: String,
    },
}
