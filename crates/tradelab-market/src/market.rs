//! Market entity.
//!
//! A market tracks the public state of one order book (fundamental price,
//! best quotes, whether trading is open) and relays noise-trader orders to
//! the matching engine. Its `receive` returns extra attachments for the
//! envelope, and [`Market::attachments_for_observers`] lists fields that are
//! always surfaced to observers for particular event types.

use serde::{Deserialize, Serialize};
use tradelab_types::{Channel, ExchangeFormat, Fields, MarketId, OutgoingMessage, TraderId};

use crate::error::DomainError;
use crate::order::{Side, order_token};

/// Static observer attachments: `(event_type, field, value)`.
const OBSERVER_ATTACHMENTS: &[(&str, &str, &str)] = &[
    ("market_start", "observer_note", "market_open"),
    ("market_end", "observer_note", "market_closed"),
    ("bbo_change", "observer_note", "quote_update"),
    ("fundamental_price_change", "observer_note", "jump"),
];

/// The serializable state of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// The market's id.
    pub id: MarketId,
    /// Matching mechanism of the exchange behind this market.
    pub exchange_format: ExchangeFormat,
    /// Current fundamental price.
    pub fundamental_price: i64,
    /// Best bid on the book, if any.
    #[serde(default)]
    pub best_bid: Option<i64>,
    /// Best offer on the book, if any.
    #[serde(default)]
    pub best_offer: Option<i64>,
    /// Whether the market accepts orders.
    #[serde(default)]
    pub is_running: bool,
    /// Number of noise-trader orders relayed so far.
    #[serde(default)]
    pub noise_orders: u64,
    #[serde(skip)]
    outbox: Vec<OutgoingMessage>,
}

/// The payload stored for a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Market state.
    pub market: Market,
}

impl Market {
    /// A closed market with an empty book.
    pub const fn new(id: MarketId, exchange_format: ExchangeFormat, fundamental_price: i64) -> Self {
        Self {
            id,
            exchange_format,
            fundamental_price,
            best_bid: None,
            best_offer: None,
            is_running: false,
            noise_orders: 0,
            outbox: Vec::new(),
        }
    }

    /// Fields always surfaced to observers for `event_type`, if registered.
    pub fn attachments_for_observers(event_type: &str) -> Option<Fields> {
        let fields: Fields = OBSERVER_ATTACHMENTS
            .iter()
            .filter(|(event, _, _)| *event == event_type)
            .map(|(_, field, value)| ((*field).to_owned(), serde_json::Value::from(*value)))
            .collect();
        if fields.is_empty() { None } else { Some(fields) }
    }

    /// Take every message produced so far, leaving the buffer empty.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply one event, returning attachments to merge into the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] if the event type is unhandled, carries
    /// malformed fields, or is an order for a closed market.
    pub fn receive(&mut self, event_type: &str, fields: &Fields) -> Result<Fields, DomainError> {
        tracing::trace!(market = %self.id, event_type, "market receive");
        match event_type {
            "market_start" => {
                self.is_running = true;
                self.broadcast("market_start");
                Ok(Fields::new())
            }
            "market_end" => {
                self.is_running = false;
                self.broadcast("market_end");
                Ok(Fields::new())
            }
            "noise_trader_arrival" => self.on_noise_trader_arrival(fields),
            "bbo_change" => {
                self.best_bid = fields.integer("best_bid")?;
                self.best_offer = fields.integer("best_offer")?;
                let message = OutgoingMessage::new(Channel::Observers(self.id), "bbo")
                    .with("best_bid", self.best_bid)
                    .with("best_offer", self.best_offer);
                self.outbox.push(message);
                Ok(Fields::new()
                    .with("best_bid", self.best_bid)
                    .with("best_offer", self.best_offer))
            }
            "fundamental_price_change" => {
                self.fundamental_price = fields.require_integer("new_price")?;
                let message = OutgoingMessage::new(Channel::Observers(self.id), "fpc")
                    .with("price", self.fundamental_price);
                self.outbox.push(message);
                Ok(Fields::new().with("new_price", self.fundamental_price))
            }
            _ => Err(DomainError::UnhandledEvent {
                entity: "market",
                event_type: event_type.to_owned(),
            }),
        }
    }

    fn broadcast(&mut self, message_type: &str) {
        let message = OutgoingMessage::new(Channel::Observers(self.id), message_type)
            .with("market_id", self.id.0);
        self.outbox.push(message);
    }

    fn on_noise_trader_arrival(&mut self, fields: &Fields) -> Result<Fields, DomainError> {
        if !self.is_running {
            return Err(DomainError::MarketClosed(self.id));
        }
        let side = Side::parse("buy_sell_indicator", fields.str("buy_sell_indicator"))?;
        let price = fields.require_integer("price")?;
        let time_in_force = fields.require_integer("time_in_force")?;

        self.noise_orders = self.noise_orders.checked_add(1).ok_or_else(|| {
            DomainError::Overflow {
                context: "noise order counter".to_owned(),
            }
        })?;
        let token = order_token("NOISE", self.id.0, side, self.noise_orders);

        let message = OutgoingMessage::new(Channel::Exchange(self.id), "enter")
            .with("order_token", token.as_str())
            .with("buy_sell_indicator", side.indicator())
            .with("price", price)
            .with("time_in_force", time_in_force)
            .with("player_id", TraderId::INVESTOR.0)
            .with("exchange_format", self.exchange_format.as_str());
        self.outbox.push(message);

        Ok(Fields::new()
            .with("player_id", TraderId::INVESTOR.0)
            .with("order_token", token))
    }
}
