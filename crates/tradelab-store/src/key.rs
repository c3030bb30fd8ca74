//! Entity key scheme.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `trader:{id}` | Hash (`version`, `payload`) | Versioned trader record |
//! | `market:{id}` | Hash (`version`, `payload`) | Versioned market record |
//! | `trade_session:{id}` | JSON | Session object, last write wins |
//! | `market:{id}:traders` | Set | Trader ids participating in a market |

use tradelab_types::{EntityKind, MarketId, SubsessionId, TraderId};

/// Identifies one stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// The kind of entity.
    pub kind: EntityKind,
    /// The entity's numeric id within its kind.
    pub id: u64,
}

impl EntityKey {
    /// Key of a trader record.
    pub const fn trader(id: TraderId) -> Self {
        Self {
            kind: EntityKind::Trader,
            id: id.0,
        }
    }

    /// Key of a market record.
    pub const fn market(id: MarketId) -> Self {
        Self {
            kind: EntityKind::Market,
            id: id.0,
        }
    }

    /// Key of a trade session record.
    pub const fn session(id: SubsessionId) -> Self {
        Self {
            kind: EntityKind::TradeSession,
            id: id.0,
        }
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Key of the set holding the traders of a market.
pub fn market_traders_key(market_id: MarketId) -> String {
    format!("market:{market_id}:traders")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_kind() {
        assert_eq!(EntityKey::trader(TraderId(3)).to_string(), "trader:3");
        assert_eq!(EntityKey::market(MarketId(3)).to_string(), "market:3");
        assert_eq!(
            EntityKey::session(SubsessionId(9)).to_string(),
            "trade_session:9"
        );
        assert_ne!(EntityKey::trader(TraderId(3)), EntityKey::market(MarketId(3)));
    }

    #[test]
    fn membership_key() {
        assert_eq!(market_traders_key(MarketId(2)), "market:2:traders");
    }
}
