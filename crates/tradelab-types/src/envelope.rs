//! The in-flight unit of work and the messages it accumulates.
//!
//! An [`Envelope`] enters the dispatcher carrying the sender's `message`.
//! Handlers fill in `attachments` (derived fields such as the resolved
//! `market_id` or `player_id`) and append to `outgoing_messages`, which the
//! transport delivers once dispatch returns.

use serde::{Deserialize, Serialize};

use crate::fields::Fields;
use crate::ids::{EventId, MarketId, SubsessionId, TraderId};

/// Where an outgoing message should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Channel {
    /// The browser client of one trader.
    Subject(TraderId),
    /// The matching engine of one market.
    Exchange(MarketId),
    /// Every observer subscribed to one market.
    Observers(MarketId),
    /// Session-level control channel (subprocess management).
    Session(SubsessionId),
}

/// A message produced by a domain entity for delivery outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Delivery target.
    pub channel: Channel,
    /// Message type tag understood by the receiver.
    pub message_type: String,
    /// Message body.
    #[serde(default)]
    pub fields: Fields,
}

impl OutgoingMessage {
    /// Create a message with an empty body.
    pub fn new(channel: Channel, message_type: &str) -> Self {
        Self {
            channel,
            message_type: message_type.to_owned(),
            fields: Fields::new(),
        }
    }

    /// Builder-style field insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key, value);
        self
    }
}

/// An event travelling through the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id.
    #[serde(default)]
    pub id: EventId,
    /// Tag identifying the transition (e.g. `order_entered`, `role_change`).
    pub event_type: String,
    /// Fields supplied by the sender.
    #[serde(default)]
    pub message: Fields,
    /// Fields derived by handlers during processing.
    #[serde(default)]
    pub attachments: Fields,
    /// Messages to deliver once processing completes. Append-only.
    #[serde(default)]
    pub outgoing_messages: Vec<OutgoingMessage>,
}

impl Envelope {
    /// Create a fresh envelope for an inbound event.
    pub fn new(event_type: &str, message: Fields) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.to_owned(),
            message,
            attachments: Fields::new(),
            outgoing_messages: Vec::new(),
        }
    }

    /// The merged field set handed to an entity: `message` overlaid with
    /// `attachments`.
    pub fn fields(&self) -> Fields {
        self.message.merged(&self.attachments)
    }
}
