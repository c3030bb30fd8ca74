//! Resting orders and order tokens.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Time in force meaning "rest until canceled".
pub const TIME_IN_FORCE_GTC: i64 = 99_999;

/// Time in force meaning "immediate or cancel".
pub const TIME_IN_FORCE_IOC: i64 = 0;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Bid.
    #[serde(rename = "B")]
    Buy,
    /// Offer.
    #[serde(rename = "S")]
    Sell,
}

impl Side {
    /// Wire indicator (`B` or `S`).
    pub const fn indicator(self) -> &'static str {
        match self {
            Self::Buy => "B",
            Self::Sell => "S",
        }
    }

    /// Parse a wire indicator.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Field`] if the indicator is neither `B` nor `S`.
    pub fn parse(field: &str, indicator: Option<&str>) -> Result<Self, DomainError> {
        match indicator {
            Some("B") => Ok(Self::Buy),
            Some("S") => Ok(Self::Sell),
            Some(other) => Err(tradelab_types::FieldError::Invalid {
                field: field.to_owned(),
                expected: "side indicator",
                found: other.to_owned(),
            }
            .into()),
            None => Err(tradelab_types::FieldError::Missing(field.to_owned()).into()),
        }
    }
}

/// An order the trader has sent to the exchange and not yet seen retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-visible token.
    pub token: String,
    /// Bid or offer.
    pub side: Side,
    /// Limit price in ticks.
    pub price: i64,
    /// Time in force.
    pub time_in_force: i64,
    /// Whether the exchange acknowledged the order.
    #[serde(default)]
    pub accepted: bool,
}

/// Build an order token from an owner prefix and a sequence number.
///
/// Tokens look like `SUB3A0000007`: a prefix naming the owner, the owner's
/// id, a side letter, and a zero-padded sequence.
pub fn order_token(prefix: &str, owner: u64, side: Side, seq: u64) -> String {
    let side = match side {
        Side::Buy => 'A',
        Side::Sell => 'B',
    };
    format!("{prefix}{owner}{side}{seq:07}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_encode_owner_side_and_sequence() {
        assert_eq!(order_token("SUB", 3, Side::Buy, 7), "SUB3A0000007");
        assert_eq!(order_token("NOISE", 1, Side::Sell, 12), "NOISE1B0000012");
    }

    #[test]
    fn side_parsing() {
        assert_eq!(Side::parse("buy_sell_indicator", Some("S")).ok(), Some(Side::Sell));
        assert!(Side::parse("buy_sell_indicator", Some("X")).is_err());
        assert!(Side::parse("buy_sell_indicator", None).is_err());
    }
}
