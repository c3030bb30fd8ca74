//! The dispatcher: routes an envelope to the handler for its category.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tradelab_store::{RecipientResolver, VersionedStore};
use tradelab_types::{Envelope, ExchangeFormat, OutgoingMessage, SessionFormat};

use crate::category::HandlerCategory;
use crate::checkpoint::CheckpointSink;
use crate::config::ExchangeConfig;
use crate::error::DispatchError;
use crate::registry::SessionRegistry;
use crate::retry::RetryPolicy;

/// Runtime settings shared by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Session design, half of the trader-variant key.
    pub session_format: SessionFormat,
    /// Matching mechanism, the other half of the trader-variant key.
    pub exchange_format: ExchangeFormat,
    /// Compare-and-swap retry budget.
    pub retry: RetryPolicy,
    /// Expiry applied to session objects on every write.
    pub session_ttl: Duration,
    /// Seed for the fan-out shuffle. `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&ExchangeConfig::default())
    }
}

impl From<&ExchangeConfig> for DispatchSettings {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            session_format: config.session.session_format,
            exchange_format: config.session.exchange_format,
            retry: config.retry.policy(),
            session_ttl: config.store.session_ttl(),
            shuffle_seed: config.fanout.shuffle_seed,
        }
    }
}

/// Routes envelopes to handlers and owns the state they share.
///
/// A dispatcher is `Send + Sync` and meant to be shared behind an [`Arc`]
/// by many concurrent callers. Apart from the session registry and the
/// shuffle RNG it holds no mutable state; entity state lives in the store.
pub struct Dispatcher<S> {
    pub(crate) store: Arc<S>,
    pub(crate) checkpoints: Arc<dyn CheckpointSink>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) settings: DispatchSettings,
    shuffle_rng: Mutex<StdRng>,
}

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Build a dispatcher over `store`, reporting checkpoints to
    /// `checkpoints`.
    pub fn new(
        store: Arc<S>,
        checkpoints: Arc<dyn CheckpointSink>,
        settings: DispatchSettings,
    ) -> Self {
        let rng = settings
            .shuffle_seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            store,
            checkpoints,
            sessions: SessionRegistry::new(),
            settings,
            shuffle_rng: Mutex::new(rng),
        }
    }

    /// The settings the dispatcher was built with.
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// The backing store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The session mailbox registry.
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Route `envelope` to the handler named by `category`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownEventCategory`] for an unknown tag,
    /// or whatever the handler fails with.
    pub async fn dispatch(
        &self,
        category: &str,
        envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        let category: HandlerCategory = category.parse()?;
        self.dispatch_to(category, envelope).await
    }

    /// Route `envelope` to the handler for an already-parsed category.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler fails with.
    pub async fn dispatch_to(
        &self,
        category: HandlerCategory,
        envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        tracing::debug!(
            %category,
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "dispatching"
        );
        let result = match category {
            HandlerCategory::Trader => self.handle_trader(envelope).await,
            HandlerCategory::Market => self.handle_market(envelope).await,
            HandlerCategory::TradeSession => self.handle_session_event(envelope).await,
            HandlerCategory::NoiseTraderArrival => self.handle_noise_trader_arrival(envelope).await,
            HandlerCategory::MarketwideEvents => self.handle_marketwide_events(envelope).await,
            HandlerCategory::RoleBasedEvents => self.handle_role_based_events(envelope).await,
        };
        if let Err(e) = &result {
            tracing::warn!(%category, error = %e, "dispatch failed");
        }
        result
    }

    /// Shuffle messages in place. The RNG lock is never held across an
    /// await point.
    pub(crate) fn shuffle(&self, messages: &mut [OutgoingMessage]) {
        let mut rng = self
            .shuffle_rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        messages.shuffle(&mut *rng);
    }
}
