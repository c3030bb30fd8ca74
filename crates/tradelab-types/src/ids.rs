//! Type-safe identifier wrappers.
//!
//! Traders, markets and subsessions are numbered by the experiment setup, so
//! their identifiers wrap a plain `u64`. Trader id `0` is reserved for the
//! investor (a non-trading observer). Envelopes get a UUID v7 so log lines
//! for one event can be correlated across retries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a numeric entity id.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner numeric value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_numeric_id! {
    /// Identifier of a trader (an experiment participant).
    TraderId
}

define_numeric_id! {
    /// Identifier of a market.
    MarketId
}

define_numeric_id! {
    /// Identifier of a trading subsession.
    SubsessionId
}

impl TraderId {
    /// The reserved id of the investor, which has no trader state.
    pub const INVESTOR: Self = Self(0);

    /// Whether this id denotes the investor rather than a trader.
    pub const fn is_investor(self) -> bool {
        self.0 == 0
    }
}

/// Unique identifier for an envelope, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn investor_id_is_zero() {
        assert!(TraderId::INVESTOR.is_investor());
        assert!(!TraderId(7).is_investor());
    }

    #[test]
    fn numeric_ids_serialize_transparently() {
        let json = serde_json::to_string(&MarketId(3)).ok();
        assert_eq!(json.as_deref(), Some("3"));
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }
}
