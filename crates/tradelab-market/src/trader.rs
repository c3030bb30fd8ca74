//! Trader entity.
//!
//! A [`Trader`] is rebuilt from its stored [`TraderRecord`] for every event,
//! applies the event, and is serialized back. It never outlives one handler
//! attempt, so nothing here needs to be thread-safe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tradelab_types::{Channel, FieldError, Fields, MarketId, OutgoingMessage, TraderId};

use crate::error::DomainError;
use crate::order::{Order, Side, TIME_IN_FORCE_GTC, TIME_IN_FORCE_IOC, order_token};
use crate::role::{TraderRole, TraderVariant};

/// Default maker spread in ticks.
pub const DEFAULT_SPREAD: i64 = 10;

const fn default_spread() -> i64 {
    DEFAULT_SPREAD
}

/// Maker sensitivities set through the browser sliders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensitivities {
    /// Quote skew per unit of inventory.
    pub inventory: i64,
    /// Extra half-spread applied by imbalance-aware makers.
    pub imbalance: i64,
}

/// The serializable state of one trader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectState {
    /// The trader's id.
    pub id: TraderId,
    /// The market the trader participates in.
    pub market_id: MarketId,
    /// Cash balance in ticks.
    #[serde(default)]
    pub cash: i64,
    /// Shares held (negative when short).
    #[serde(default)]
    pub inventory: i64,
    /// Last fundamental price seen.
    #[serde(default)]
    pub fundamental_price: i64,
    /// Best bid on the book, if any.
    #[serde(default)]
    pub best_bid: Option<i64>,
    /// Best offer on the book, if any.
    #[serde(default)]
    pub best_offer: Option<i64>,
    /// Maker quote width in ticks.
    #[serde(default = "default_spread")]
    pub spread: i64,
    /// Whether the trader paid for the fast connection.
    #[serde(default)]
    pub speed_on: bool,
    /// Sequence number of the last order token issued.
    #[serde(default)]
    pub order_seq: u64,
    /// Orders sent and not yet retired, keyed by token.
    #[serde(default)]
    pub orders: BTreeMap<String, Order>,
    /// Slider sensitivities (slider-driven sessions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivities: Option<Sensitivities>,
}

impl SubjectState {
    /// A fresh state for a trader joining `market_id`.
    pub const fn new(id: TraderId, market_id: MarketId, fundamental_price: i64) -> Self {
        Self {
            id,
            market_id,
            cash: 0,
            inventory: 0,
            fundamental_price,
            best_bid: None,
            best_offer: None,
            spread: DEFAULT_SPREAD,
            speed_on: false,
            order_seq: 0,
            orders: BTreeMap::new(),
            sensitivities: None,
        }
    }
}

/// The payload stored for a trader: the role name and the subject state.
///
/// The role is kept as a raw string so a role change can overwrite it
/// before the trader is rebuilt; validation happens in
/// [`TraderVariant::role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderRecord {
    /// Current role name.
    pub role: String,
    /// Trader state.
    pub subject_state: SubjectState,
}

/// A live trader rebuilt from a [`TraderRecord`].
#[derive(Debug)]
pub struct Trader {
    variant: TraderVariant,
    role: TraderRole,
    state: SubjectState,
    outbox: Vec<OutgoingMessage>,
}

impl Trader {
    /// Rebuild a trader of `variant` from a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownRole`] if the record's role is not
    /// offered by the variant.
    pub fn from_record(variant: TraderVariant, record: TraderRecord) -> Result<Self, DomainError> {
        let role = variant.role(&record.role)?;
        let mut state = record.subject_state;
        if variant.has_sliders() && state.sensitivities.is_none() {
            state.sensitivities = Some(Sensitivities::default());
        }
        Ok(Self {
            variant,
            role,
            state,
            outbox: Vec::new(),
        })
    }

    /// The trader's variant.
    pub const fn variant(&self) -> TraderVariant {
        self.variant
    }

    /// The trader's current role.
    pub const fn role(&self) -> TraderRole {
        self.role
    }

    /// The trader's current state.
    pub const fn state(&self) -> &SubjectState {
        &self.state
    }

    /// Snapshot the trader as a storable record.
    pub fn to_record(&self) -> TraderRecord {
        TraderRecord {
            role: self.role.as_str().to_owned(),
            subject_state: self.state.clone(),
        }
    }

    /// Take every message produced so far, leaving the buffer empty.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] if the event is not handled by this trader,
    /// not allowed for its role, or carries malformed fields. On error the
    /// trader must be discarded; partial changes are not rolled back.
    pub fn receive(&mut self, event_type: &str, fields: &Fields) -> Result<(), DomainError> {
        tracing::trace!(trader = %self.state.id, role = %self.role, event_type, "trader receive");
        match event_type {
            "role_change" => self.on_role_change(),
            "order_entered" => self.on_order_entered(event_type, fields),
            "order_accepted" => self.on_order_accepted(fields),
            "order_executed" => self.on_order_executed(fields),
            "order_canceled" => self.on_order_canceled(fields),
            "bbo_change" => self.on_bbo_change(fields),
            "fundamental_price_change" => self.on_fundamental_price_change(fields),
            "speed_change" => self.on_speed_change(fields),
            "slider_change" if self.variant.has_sliders() => self.on_slider_change(fields),
            _ => Err(DomainError::UnhandledEvent {
                entity: "trader",
                event_type: event_type.to_owned(),
            }),
        }
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    fn on_role_change(&mut self) -> Result<(), DomainError> {
        let confirm = self.to_subject("role_confirm").with("role", self.role.as_str());
        self.outbox.push(confirm);
        match self.role {
            role if role.is_maker() => self.requote(),
            TraderRole::Out | TraderRole::Sniper => {
                self.cancel_all();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_order_entered(&mut self, event_type: &str, fields: &Fields) -> Result<(), DomainError> {
        if self.role != TraderRole::Manual {
            return Err(DomainError::RoleRejects {
                role: self.role.to_string(),
                event_type: event_type.to_owned(),
            });
        }
        let side = Side::parse("buy_sell_indicator", fields.str("buy_sell_indicator"))?;
        let price = fields.require_integer("price")?;
        let time_in_force = fields.integer("time_in_force")?.unwrap_or(TIME_IN_FORCE_GTC);
        self.enter(side, price, time_in_force)
    }

    fn on_order_accepted(&mut self, fields: &Fields) -> Result<(), DomainError> {
        let token = required_str(fields, "order_token")?;
        let order = self
            .state
            .orders
            .get_mut(token)
            .ok_or_else(|| DomainError::UnknownOrder(token.to_owned()))?;
        order.accepted = true;
        let (price, side) = (order.price, order.side);
        let message = self
            .to_subject("confirmed")
            .with("order_token", token)
            .with("price", price)
            .with("buy_sell_indicator", side.indicator());
        self.outbox.push(message);
        Ok(())
    }

    fn on_order_executed(&mut self, fields: &Fields) -> Result<(), DomainError> {
        let token = required_str(fields, "order_token")?;
        let order = self
            .state
            .orders
            .remove(token)
            .ok_or_else(|| DomainError::UnknownOrder(token.to_owned()))?;
        let price = fields.integer("execution_price")?.unwrap_or(order.price);

        let (cash, inventory) = match order.side {
            Side::Buy => (
                self.state.cash.checked_sub(price),
                self.state.inventory.checked_add(1),
            ),
            Side::Sell => (
                self.state.cash.checked_add(price),
                self.state.inventory.checked_sub(1),
            ),
        };
        self.state.cash = cash.ok_or_else(|| overflow("cash after execution"))?;
        self.state.inventory = inventory.ok_or_else(|| overflow("inventory after execution"))?;

        let message = self
            .to_subject("executed")
            .with("order_token", token)
            .with("price", price)
            .with("buy_sell_indicator", order.side.indicator())
            .with("cash", self.state.cash)
            .with("inventory", self.state.inventory);
        self.outbox.push(message);

        if self.role.is_maker() {
            let (bid, ask) = self.quotes()?;
            let replenish = match order.side {
                Side::Buy => bid,
                Side::Sell => ask,
            };
            self.enter(order.side, replenish, TIME_IN_FORCE_GTC)?;
        }
        Ok(())
    }

    fn on_order_canceled(&mut self, fields: &Fields) -> Result<(), DomainError> {
        let token = required_str(fields, "order_token")?;
        self.state
            .orders
            .remove(token)
            .ok_or_else(|| DomainError::UnknownOrder(token.to_owned()))?;
        let message = self.to_subject("canceled").with("order_token", token);
        self.outbox.push(message);
        Ok(())
    }

    fn on_bbo_change(&mut self, fields: &Fields) -> Result<(), DomainError> {
        self.state.best_bid = fields.integer("best_bid")?;
        self.state.best_offer = fields.integer("best_offer")?;
        let message = self
            .to_subject("bbo")
            .with("best_bid", self.state.best_bid)
            .with("best_offer", self.state.best_offer);
        self.outbox.push(message);
        if self.role == TraderRole::Sniper {
            self.snipe()?;
        }
        Ok(())
    }

    fn on_fundamental_price_change(&mut self, fields: &Fields) -> Result<(), DomainError> {
        self.state.fundamental_price = fields.require_integer("new_price")?;
        let message = self
            .to_subject("fpc")
            .with("price", self.state.fundamental_price);
        self.outbox.push(message);
        if self.role.is_maker() {
            self.requote()?;
        } else if self.role == TraderRole::Sniper {
            self.snipe()?;
        }
        Ok(())
    }

    fn on_speed_change(&mut self, fields: &Fields) -> Result<(), DomainError> {
        let value = fields
            .get("value")
            .ok_or_else(|| FieldError::Missing("value".to_owned()))?;
        self.state.speed_on = value.as_bool().ok_or_else(|| FieldError::Invalid {
            field: "value".to_owned(),
            expected: "boolean",
            found: value.to_string(),
        })?;
        let message = self
            .to_subject("speed_confirm")
            .with("value", self.state.speed_on);
        self.outbox.push(message);
        Ok(())
    }

    fn on_slider_change(&mut self, fields: &Fields) -> Result<(), DomainError> {
        let sensitivities = Sensitivities {
            inventory: fields.require_integer("a_x")?,
            imbalance: fields.require_integer("a_y")?,
        };
        self.state.sensitivities = Some(sensitivities);
        let message = self
            .to_subject("slider_confirm")
            .with("a_x", sensitivities.inventory)
            .with("a_y", sensitivities.imbalance);
        self.outbox.push(message);
        if self.role.is_maker() {
            self.requote()?;
        }
        Ok(())
    }

    // =========================================================================
    // Order management
    // =========================================================================

    fn to_subject(&self, message_type: &str) -> OutgoingMessage {
        OutgoingMessage::new(Channel::Subject(self.state.id), message_type)
    }

    fn to_exchange(&self, message_type: &str) -> OutgoingMessage {
        OutgoingMessage::new(Channel::Exchange(self.state.market_id), message_type)
            .with("player_id", self.state.id.0)
            .with("exchange_format", self.variant.exchange_format().as_str())
            .with("speed", self.state.speed_on)
    }

    fn next_token(&mut self, side: Side) -> Result<String, DomainError> {
        self.state.order_seq = self
            .state
            .order_seq
            .checked_add(1)
            .ok_or_else(|| overflow("order sequence"))?;
        Ok(order_token("SUB", self.state.id.0, side, self.state.order_seq))
    }

    fn enter(&mut self, side: Side, price: i64, time_in_force: i64) -> Result<(), DomainError> {
        let token = self.next_token(side)?;
        let message = self
            .to_exchange("enter")
            .with("order_token", token.as_str())
            .with("buy_sell_indicator", side.indicator())
            .with("price", price)
            .with("time_in_force", time_in_force);
        self.outbox.push(message);
        self.state.orders.insert(
            token.clone(),
            Order {
                token,
                side,
                price,
                time_in_force,
                accepted: false,
            },
        );
        Ok(())
    }

    fn cancel_all(&mut self) {
        let tokens: Vec<String> = self.state.orders.keys().cloned().collect();
        for token in tokens {
            let message = self.to_exchange("cancel").with("order_token", token);
            self.outbox.push(message);
        }
    }

    /// Bid and ask a maker should currently quote.
    fn quotes(&self) -> Result<(i64, i64), DomainError> {
        let sensitivities = self.state.sensitivities.unwrap_or_default();
        let base_half = (self.state.spread / 2).max(1);
        let half = match self.role {
            TraderRole::Maker2 | TraderRole::Maker3 => base_half
                .checked_add(sensitivities.imbalance.max(0))
                .ok_or_else(|| overflow("maker half spread"))?,
            _ => base_half,
        };
        let skew = if self.role == TraderRole::Maker3 {
            self.state
                .inventory
                .checked_mul(sensitivities.inventory)
                .ok_or_else(|| overflow("inventory skew"))?
        } else {
            0
        };
        let mid = self
            .state
            .fundamental_price
            .checked_sub(skew)
            .ok_or_else(|| overflow("maker mid price"))?;
        let bid = mid.checked_sub(half).ok_or_else(|| overflow("maker bid"))?;
        let ask = mid.checked_add(half).ok_or_else(|| overflow("maker ask"))?;
        Ok((bid, ask))
    }

    /// Move resting quotes to the current bid/ask, or post them if none rest.
    fn requote(&mut self) -> Result<(), DomainError> {
        let (bid, ask) = self.quotes()?;
        if self.state.orders.is_empty() {
            self.enter(Side::Buy, bid, TIME_IN_FORCE_GTC)?;
            return self.enter(Side::Sell, ask, TIME_IN_FORCE_GTC);
        }

        let resting: Vec<Order> = self.state.orders.values().cloned().collect();
        for order in resting {
            let target = match order.side {
                Side::Buy => bid,
                Side::Sell => ask,
            };
            if order.price == target {
                continue;
            }
            let replacement = self.next_token(order.side)?;
            let message = self
                .to_exchange("replace")
                .with("existing_order_token", order.token.as_str())
                .with("replacement_order_token", replacement.as_str())
                .with("price", target)
                .with("time_in_force", order.time_in_force);
            self.outbox.push(message);
            self.state.orders.remove(&order.token);
            self.state.orders.insert(
                replacement.clone(),
                Order {
                    token: replacement,
                    price: target,
                    accepted: false,
                    ..order
                },
            );
        }
        Ok(())
    }

    /// Take any quote that is stale relative to the fundamental price.
    fn snipe(&mut self) -> Result<(), DomainError> {
        // A batch auction clears once per batch; the order must survive one.
        let time_in_force = match self.variant {
            TraderVariant::BcsFba => 1,
            _ => TIME_IN_FORCE_IOC,
        };
        let fundamental = self.state.fundamental_price;
        if let Some(offer) = self.state.best_offer.filter(|&p| p < fundamental) {
            self.enter(Side::Buy, offer, time_in_force)?;
        }
        if let Some(bid) = self.state.best_bid.filter(|&p| p > fundamental) {
            self.enter(Side::Sell, bid, time_in_force)?;
        }
        Ok(())
    }
}

fn required_str<'a>(fields: &'a Fields, key: &str) -> Result<&'a str, FieldError> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(FieldError::Invalid {
            field: key.to_owned(),
            expected: "string",
            found: other.to_string(),
        }),
        None => Err(FieldError::Missing(key.to_owned())),
    }
}

fn overflow(context: &str) -> DomainError {
    DomainError::Overflow {
        context: context.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    fn trader(variant: TraderVariant, role: &str) -> Trader {
        let record = TraderRecord {
            role: role.to_owned(),
            subject_state: SubjectState::new(TraderId(7), MarketId(1), 100),
        };
        Trader::from_record(variant, record).unwrap()
    }

    #[test]
    fn take_outgoing_transfers_and_clears() {
        let mut t = trader(TraderVariant::BcsCda, "manual");
        t.receive("role_change", &Fields::new()).unwrap();
        let first = t.take_outgoing();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message_type, "role_confirm");
        assert!(t.take_outgoing().is_empty());
    }

    #[test]
    fn manual_order_entry_creates_resting_order() {
        let mut t = trader(TraderVariant::BcsCda, "manual");
        let fields = Fields::new()
            .with("buy_sell_indicator", "B")
            .with("price", 95)
            .with("time_in_force", 10);
        t.receive("order_entered", &fields).unwrap();

        let out = t.take_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, Channel::Exchange(MarketId(1)));
        assert_eq!(out[0].fields.get("order_token"), Some(&json!("SUB7A0000001")));
        assert_eq!(t.state().orders.len(), 1);
    }

    #[test]
    fn non_manual_roles_cannot_enter_orders() {
        let mut t = trader(TraderVariant::BcsCda, "out");
        let fields = Fields::new().with("buy_sell_indicator", "B").with("price", 95);
        assert!(matches!(
            t.receive("order_entered", &fields),
            Err(DomainError::RoleRejects { .. })
        ));
    }

    #[test]
    fn maker_quotes_around_fundamental_on_role_change() {
        let mut t = trader(TraderVariant::BcsCda, "maker");
        t.receive("role_change", &Fields::new()).unwrap();
        let prices: Vec<i64> = t.state().orders.values().map(|o| o.price).collect();
        assert_eq!(t.state().orders.len(), 2);
        assert!(prices.contains(&95));
        assert!(prices.contains(&105));
    }

    #[test]
    fn maker_replaces_quotes_on_price_jump() {
        let mut t = trader(TraderVariant::BcsCda, "maker");
        t.receive("role_change", &Fields::new()).unwrap();
        t.take_outgoing();

        t.receive("fundamental_price_change", &Fields::new().with("new_price", 120))
            .unwrap();
        let out = t.take_outgoing();
        let replaces = out.iter().filter(|m| m.message_type == "replace").count();
        assert_eq!(replaces, 2);
        let mut prices: Vec<i64> = t.state().orders.values().map(|o| o.price).collect();
        prices.sort_unstable();
        assert_eq!(prices, vec![115, 125]);
    }

    #[test]
    fn execution_updates_balances() {
        let mut t = trader(TraderVariant::BcsCda, "manual");
        t.receive(
            "order_entered",
            &Fields::new().with("buy_sell_indicator", "S").with("price", 101),
        )
        .unwrap();
        t.take_outgoing();

        t.receive(
            "order_executed",
            &Fields::new()
                .with("order_token", "SUB7B0000001")
                .with("execution_price", 102),
        )
        .unwrap();
        assert_eq!(t.state().cash, 102);
        assert_eq!(t.state().inventory, -1);
        assert!(t.state().orders.is_empty());
    }

    #[test]
    fn unknown_order_token_is_rejected() {
        let mut t = trader(TraderVariant::BcsCda, "manual");
        let result = t.receive("order_canceled", &Fields::new().with("order_token", "nope"));
        assert!(matches!(result, Err(DomainError::UnknownOrder(_))));
    }

    #[test]
    fn sniper_takes_stale_offer() {
        let mut t = trader(TraderVariant::BcsCda, "sniper");
        t.receive(
            "bbo_change",
            &Fields::new().with("best_bid", 90).with("best_offer", 98),
        )
        .unwrap();
        let out = t.take_outgoing();
        let enter = out.iter().find(|m| m.message_type == "enter").unwrap();
        assert_eq!(enter.fields.get("price"), Some(&json!(98)));
        assert_eq!(enter.fields.get("time_in_force"), Some(&json!(0)));
    }

    #[test]
    fn sliders_only_exist_for_slider_sessions() {
        let mut bcs = trader(TraderVariant::BcsCda, "maker");
        let fields = Fields::new().with("a_x", 1).with("a_y", 2);
        assert!(matches!(
            bcs.receive("slider_change", &fields),
            Err(DomainError::UnhandledEvent { .. })
        ));

        let mut elo = trader(TraderVariant::EloCda, "maker_2");
        elo.receive("slider_change", &fields).unwrap();
        assert_eq!(
            elo.state().sensitivities,
            Some(Sensitivities {
                inventory: 1,
                imbalance: 2
            })
        );
        // Imbalance widens the half spread from 5 to 7.
        let mut prices: Vec<i64> = elo.state().orders.values().map(|o| o.price).collect();
        prices.sort_unstable();
        assert_eq!(prices, vec![93, 107]);
    }

    #[test]
    fn record_roundtrip_preserves_state() {
        let mut t = trader(TraderVariant::BcsFba, "manual");
        t.receive("speed_change", &Fields::new().with("value", true)).unwrap();
        let record = t.to_record();
        let json = serde_json::to_value(&record).unwrap();
        let back: TraderRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert!(back.subject_state.speed_on);
    }
}
