//! Experiment setup: create the entities named in the `setup` config section.

use std::collections::{BTreeMap, BTreeSet};

use tradelab_market::{
    Market, MarketRecord, SubjectState, TradeSession, TraderRecord, TraderVariant,
};
use tradelab_store::{EntityKey, RecipientResolver, StoreError, VersionedStore};
use tradelab_types::{MarketId, SubsessionId, TraderId};

use crate::config::SetupConfig;
use crate::dispatcher::DispatchSettings;
use crate::error::DispatchError;

/// What [`seed`] covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Markets declared.
    pub markets: usize,
    /// Traders declared.
    pub traders: usize,
    /// Sessions declared.
    pub sessions: usize,
    /// Declared entities that were already in the store and were kept as is.
    pub existing: usize,
}

/// Create markets, traders and sessions at version 0.
///
/// Traders start with their market's fundamental price and are registered
/// as participants of their market. Roles are validated against the trader
/// variant for the configured formats.
///
/// Seeding is resumable: an entity that already exists (for example after a
/// restart against the same `Dragonfly`) is left untouched, keeping its
/// version and state, and is counted in [`SeedSummary::existing`].
///
/// # Errors
///
/// - [`DispatchError::UnknownTraderVariant`] / [`DispatchError::UnknownRole`]
///   for traders the configured formats cannot host
/// - [`DispatchError::RecordNotFound`] for a trader or session naming an
///   undeclared market
/// - [`DispatchError::InvalidField`] for a trader with the investor id
/// - [`DispatchError::Store`] if a read or write fails
pub async fn seed<S>(
    store: &S,
    setup: &SetupConfig,
    settings: &DispatchSettings,
) -> Result<SeedSummary, DispatchError>
where
    S: VersionedStore + RecipientResolver,
{
    let mut existing = 0_usize;
    let mut prices: BTreeMap<MarketId, i64> = BTreeMap::new();
    for spec in &setup.markets {
        let market_id = MarketId(spec.id);
        let market = Market::new(market_id, settings.exchange_format, spec.fundamental_price);
        let payload = serde_json::to_value(MarketRecord { market })?;
        if !create_or_keep(store, &EntityKey::market(market_id), &payload).await? {
            existing = existing.saturating_add(1);
        }
        prices.insert(market_id, spec.fundamental_price);
    }

    let variant = if setup.traders.is_empty() {
        None
    } else {
        Some(TraderVariant::resolve(settings.session_format, settings.exchange_format)?)
    };
    for spec in &setup.traders {
        let trader_id = TraderId(spec.id);
        if trader_id.is_investor() {
            return Err(tradelab_types::FieldError::Invalid {
                field: "setup.traders.id".to_owned(),
                expected: "non-investor trader id",
                found: spec.id.to_string(),
            }
            .into());
        }
        let market_id = MarketId(spec.market_id);
        let price = *prices.get(&market_id).ok_or_else(|| DispatchError::RecordNotFound {
            key: EntityKey::market(market_id).to_string(),
        })?;
        if let Some(variant) = variant {
            variant.role(&spec.role)?;
        }

        let record = TraderRecord {
            role: spec.role.clone(),
            subject_state: SubjectState::new(trader_id, market_id, price),
        };
        let payload = serde_json::to_value(&record)?;
        if !create_or_keep(store, &EntityKey::trader(trader_id), &payload).await? {
            existing = existing.saturating_add(1);
        }
        store.add_trader_to_market(market_id, trader_id).await?;
    }

    for spec in &setup.sessions {
        let markets: BTreeSet<MarketId> = spec.markets.iter().copied().map(MarketId).collect();
        if let Some(missing) = markets.iter().find(|m| !prices.contains_key(*m)) {
            return Err(DispatchError::RecordNotFound {
                key: EntityKey::market(*missing).to_string(),
            });
        }
        let subsession_id = SubsessionId(spec.id);
        let key = EntityKey::session(subsession_id);
        if store.get_session(&key).await?.is_some() {
            tracing::info!(%key, "session already seeded, keeping it");
            existing = existing.saturating_add(1);
            continue;
        }
        let session = TradeSession::new(subsession_id, settings.session_format, markets);
        let value = serde_json::to_value(&session)?;
        store.put_session(&key, &value, settings.session_ttl).await?;
    }

    let summary = SeedSummary {
        markets: setup.markets.len(),
        traders: setup.traders.len(),
        sessions: setup.sessions.len(),
        existing,
    };
    tracing::info!(
        markets = summary.markets,
        traders = summary.traders,
        sessions = summary.sessions,
        existing = summary.existing,
        "experiment seeded"
    );
    Ok(summary)
}

/// Create `key` at version 0. Returns `false` if it already existed.
async fn create_or_keep<S>(
    store: &S,
    key: &EntityKey,
    payload: &serde_json::Value,
) -> Result<bool, DispatchError>
where
    S: VersionedStore,
{
    match store.create(key, payload).await {
        Ok(()) => Ok(true),
        Err(StoreError::AlreadyExists(_)) => {
            tracing::info!(%key, "entity already seeded, keeping it");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
