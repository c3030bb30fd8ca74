//! Fan-out handlers: one event applied to several traders.
//!
//! Recipients are processed one after another against the same envelope, so
//! each trader sees the attachments and messages accumulated so far. Once
//! every recipient has committed, the outgoing messages are shuffled so no
//! trader systematically hears about the event first.

use tradelab_store::{RecipientResolver, VersionedStore};
use tradelab_types::{Envelope, MarketId, TraderId};

use super::{MARKET_ID, PLAYER_ID, required_id};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// Field listing the recipients of a role-based event.
const MAKER_IDS: &str = "maker_ids";

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Apply an event to every trader registered in `message.market_id`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingIdentifier`] if the message has no
    /// `market_id`, [`DispatchError::Store`] if the recipients cannot be
    /// resolved, or the first error from a recipient's trader handler.
    pub async fn handle_marketwide_events(
        &self,
        envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        let market_id = MarketId(required_id(MARKET_ID, &envelope.event_type, &envelope.message)?);
        let recipients = self.store.trader_ids_by_market(market_id).await?;
        self.fan_out(envelope, market_id, recipients).await
    }

    /// Apply an event to the traders listed in `message.maker_ids`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingIdentifier`] if the message has no
    /// `market_id` or `maker_ids`, [`DispatchError::InvalidField`] if
    /// `maker_ids` is not a list of ids, or the first error from a
    /// recipient's trader handler.
    pub async fn handle_role_based_events(
        &self,
        envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        let market_id = MarketId(required_id(MARKET_ID, &envelope.event_type, &envelope.message)?);
        let recipients = envelope
            .message
            .id_list(MAKER_IDS)
            .map_err(|e| DispatchError::identifier(MAKER_IDS, &envelope.event_type, e))?
            .into_iter()
            .map(TraderId)
            .collect();
        self.fan_out(envelope, market_id, recipients).await
    }

    async fn fan_out(
        &self,
        mut envelope: Envelope,
        market_id: MarketId,
        recipients: Vec<TraderId>,
    ) -> Result<Envelope, DispatchError> {
        tracing::debug!(
            %market_id,
            event_type = %envelope.event_type,
            recipients = recipients.len(),
            "fan-out"
        );
        envelope.attachments.insert(MARKET_ID, market_id.0);
        for trader_id in recipients {
            envelope.attachments.insert(PLAYER_ID, trader_id.0);
            envelope = self.handle_trader(envelope).await?;
        }
        self.shuffle(&mut envelope.outgoing_messages);
        Ok(envelope)
    }
}
