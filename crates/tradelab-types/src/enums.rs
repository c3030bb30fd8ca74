//! Enumeration types for the exchange experiment.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// The kind of entity a stored record belongs to.
///
/// Store keys are scoped by kind so that trader `3` and market `3` never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A trader (experiment participant).
    Trader,
    /// A market (one order book).
    Market,
    /// A trading subsession.
    TradeSession,
}

impl EntityKind {
    /// The key prefix used for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trader => "trader",
            Self::Market => "market",
            Self::TradeSession => "trade_session",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session and exchange formats
// ---------------------------------------------------------------------------

/// The experimental design a session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionFormat {
    /// Budish-Cramton-Shim style sessions (manual, maker, sniper, out roles).
    #[serde(rename = "BCS", alias = "bcs")]
    Bcs,
    /// Sessions with algorithmic makers driven by sensitivity sliders.
    #[serde(rename = "ELO", alias = "elo")]
    Elo,
}

impl SessionFormat {
    /// Canonical tag of this format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bcs => "BCS",
            Self::Elo => "ELO",
        }
    }
}

impl core::fmt::Display for SessionFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SessionFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BCS" => Ok(Self::Bcs),
            "ELO" => Ok(Self::Elo),
            _ => Err(format!("unknown session format: {s}")),
        }
    }
}

/// The matching mechanism used by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeFormat {
    /// Continuous double auction.
    Cda,
    /// Frequent batch auction.
    Fba,
}

impl ExchangeFormat {
    /// Canonical tag of this format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cda => "CDA",
            Self::Fba => "FBA",
        }
    }
}

impl core::fmt::Display for ExchangeFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ExchangeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CDA" => Ok(Self::Cda),
            "FBA" => Ok(Self::Fba),
            _ => Err(format!("unknown exchange format: {s}")),
        }
    }
}
