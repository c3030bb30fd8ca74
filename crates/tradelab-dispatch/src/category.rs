//! Handler categories.

use core::fmt;
use core::str::FromStr;

use crate::error::DispatchError;

/// The handler an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerCategory {
    /// One trader, addressed by `player_id`.
    Trader,
    /// One market, addressed by `market_id`.
    Market,
    /// Session lifecycle event.
    TradeSession,
    /// Noise-trader order for a market.
    NoiseTraderArrival,
    /// Every trader in a market.
    MarketwideEvents,
    /// The traders listed in `maker_ids`.
    RoleBasedEvents,
}

impl HandlerCategory {
    /// Every category, in routing-table order.
    pub const ALL: [Self; 6] = [
        Self::Trader,
        Self::Market,
        Self::TradeSession,
        Self::NoiseTraderArrival,
        Self::MarketwideEvents,
        Self::RoleBasedEvents,
    ];

    /// The wire tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trader => "trader",
            Self::Market => "market",
            Self::TradeSession => "trade_session",
            Self::NoiseTraderArrival => "noise_trader_arrival",
            Self::MarketwideEvents => "marketwide_events",
            Self::RoleBasedEvents => "role_based_events",
        }
    }
}

impl fmt::Display for HandlerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerCategory {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownEventCategory(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for category in HandlerCategory::ALL {
            assert_eq!(category.as_str().parse::<HandlerCategory>().unwrap(), category);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            "traders".parse::<HandlerCategory>(),
            Err(DispatchError::UnknownEventCategory(tag)) if tag == "traders"
        ));
    }
}
