//! Trader roles and the trader variant factory.
//!
//! A trader's behavior depends on the session design, the exchange mechanism
//! and the role the participant currently plays. The variant set is closed:
//! [`TraderVariant::resolve`] maps a `(session_format, exchange_format)` pair
//! to a variant and fails on any pair that is not registered, and
//! [`TraderVariant::role`] rejects role names the variant does not offer.

use serde::{Deserialize, Serialize};
use tradelab_types::{ExchangeFormat, SessionFormat};

use crate::error::DomainError;

/// The role a trader currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderRole {
    /// Not trading.
    Out,
    /// Enters orders by hand from the browser.
    Manual,
    /// Quotes both sides around the fundamental price.
    Maker,
    /// Takes stale quotes after a fundamental price jump.
    Sniper,
    /// Maker quoting a fixed spread (slider-driven sessions).
    MakerBasic,
    /// Maker adjusting its spread to order imbalance.
    #[serde(rename = "maker_2")]
    Maker2,
    /// Maker adjusting its spread to imbalance and inventory.
    #[serde(rename = "maker_3")]
    Maker3,
}

impl TraderRole {
    /// Wire name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::Manual => "manual",
            Self::Maker => "maker",
            Self::Sniper => "sniper",
            Self::MakerBasic => "maker_basic",
            Self::Maker2 => "maker_2",
            Self::Maker3 => "maker_3",
        }
    }

    /// Whether the role posts two-sided quotes automatically.
    pub const fn is_maker(self) -> bool {
        matches!(self, Self::Maker | Self::MakerBasic | Self::Maker2 | Self::Maker3)
    }
}

impl core::fmt::Display for TraderRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registered trader variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraderVariant {
    /// BCS session on a continuous double auction.
    BcsCda,
    /// BCS session on a frequent batch auction.
    BcsFba,
    /// Slider-driven session on a continuous double auction.
    EloCda,
}

const BCS_ROLES: &[TraderRole] = &[
    TraderRole::Out,
    TraderRole::Manual,
    TraderRole::Maker,
    TraderRole::Sniper,
];

const ELO_ROLES: &[TraderRole] = &[
    TraderRole::Out,
    TraderRole::Manual,
    TraderRole::MakerBasic,
    TraderRole::Maker2,
    TraderRole::Maker3,
];

impl TraderVariant {
    /// Look up the variant for a format pair.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownTraderVariant`] for unregistered pairs.
    pub const fn resolve(
        session_format: SessionFormat,
        exchange_format: ExchangeFormat,
    ) -> Result<Self, DomainError> {
        match (session_format, exchange_format) {
            (SessionFormat::Bcs, ExchangeFormat::Cda) => Ok(Self::BcsCda),
            (SessionFormat::Bcs, ExchangeFormat::Fba) => Ok(Self::BcsFba),
            (SessionFormat::Elo, ExchangeFormat::Cda) => Ok(Self::EloCda),
            (SessionFormat::Elo, ExchangeFormat::Fba) => Err(DomainError::UnknownTraderVariant {
                session_format,
                exchange_format,
            }),
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::BcsCda => "BCS/CDA",
            Self::BcsFba => "BCS/FBA",
            Self::EloCda => "ELO/CDA",
        }
    }

    /// The exchange mechanism the variant trades on.
    pub const fn exchange_format(self) -> ExchangeFormat {
        match self {
            Self::BcsCda | Self::EloCda => ExchangeFormat::Cda,
            Self::BcsFba => ExchangeFormat::Fba,
        }
    }

    /// Whether the variant accepts maker sensitivity sliders.
    pub const fn has_sliders(self) -> bool {
        matches!(self, Self::EloCda)
    }

    /// Roles offered by the variant.
    pub const fn roles(self) -> &'static [TraderRole] {
        match self {
            Self::BcsCda | Self::BcsFba => BCS_ROLES,
            Self::EloCda => ELO_ROLES,
        }
    }

    /// Parse a role name, rejecting roles the variant does not offer.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownRole`] if the name is not a role of
    /// this variant.
    pub fn role(self, name: &str) -> Result<TraderRole, DomainError> {
        self.roles()
            .iter()
            .copied()
            .find(|role| role.as_str() == name)
            .ok_or_else(|| DomainError::UnknownRole {
                variant: self.name(),
                role: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_pairs_resolve() {
        assert_eq!(
            TraderVariant::resolve(SessionFormat::Bcs, ExchangeFormat::Fba).ok(),
            Some(TraderVariant::BcsFba)
        );
        assert_eq!(
            TraderVariant::resolve(SessionFormat::Elo, ExchangeFormat::Cda).ok(),
            Some(TraderVariant::EloCda)
        );
    }

    #[test]
    fn unregistered_pair_fails_instead_of_defaulting() {
        let err = TraderVariant::resolve(SessionFormat::Elo, ExchangeFormat::Fba);
        assert!(matches!(err, Err(DomainError::UnknownTraderVariant { .. })));
    }

    #[test]
    fn roles_are_scoped_to_variant() {
        assert_eq!(TraderVariant::BcsCda.role("sniper").ok(), Some(TraderRole::Sniper));
        assert!(TraderVariant::EloCda.role("sniper").is_err());
        assert_eq!(TraderVariant::EloCda.role("maker_2").ok(), Some(TraderRole::Maker2));
        assert!(TraderVariant::BcsCda.role("maker_basic").is_err());
    }
}
