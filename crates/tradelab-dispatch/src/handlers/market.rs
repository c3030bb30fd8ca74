//! Market handler.

use tradelab_market::{Market, MarketRecord};
use tradelab_store::{EntityKey, RecipientResolver, VersionedStore};
use tradelab_types::{Envelope, Fields, MarketId, OutgoingMessage};

use super::{MARKET_ID, decode, load, resolve_id, write_if_unchanged};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::retry::Attempt;

#[derive(Debug)]
struct MarketCommit {
    attachments: Fields,
    messages: Vec<OutgoingMessage>,
}

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Apply an event to one market.
    ///
    /// The market is named by `market_id` in the message or, failing that,
    /// in the attachments. Attachments returned by the market are merged
    /// into the envelope, followed by the static observer attachments for
    /// the event type. Market commits are not checkpointed.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::handle_trader`], minus the trader factory
    /// failures.
    pub async fn handle_market(&self, mut envelope: Envelope) -> Result<Envelope, DispatchError> {
        let market_id = MarketId(resolve_id(
            MARKET_ID,
            &envelope.event_type,
            [&envelope.message, &envelope.attachments],
        )?);

        let key = EntityKey::market(market_id);
        let commit = {
            let key = &key;
            let event = &envelope;
            self.settings
                .retry
                .run(key, move || self.market_attempt(key, event))
                .await?
        };

        merge_attachments(&mut envelope, &commit.attachments);
        tracing::debug!(
            %market_id,
            event_type = %envelope.event_type,
            messages = commit.messages.len(),
            "market committed"
        );
        envelope.outgoing_messages.extend(commit.messages);
        Ok(envelope)
    }

    async fn market_attempt(
        &self,
        key: &EntityKey,
        envelope: &Envelope,
    ) -> Result<Attempt<MarketCommit>, DispatchError> {
        let record = load(self.store.as_ref(), key).await?;
        let MarketRecord { mut market } = decode(key, record.payload)?;

        let attachments = market.receive(&envelope.event_type, &envelope.fields())?;
        let messages = market.take_outgoing();
        let payload = serde_json::to_value(MarketRecord { market })?;

        Ok(write_if_unchanged(self.store.as_ref(), key, &payload, record.version)
            .await?
            .map(|_| MarketCommit {
                attachments,
                messages,
            }))
    }
}

/// Merge market attachments into `envelope`, then the static observer
/// attachments for its event type, which win on key collision.
fn merge_attachments(envelope: &mut Envelope, returned: &Fields) {
    envelope.attachments.merge(returned);
    if let Some(observed) = Market::attachments_for_observers(&envelope.event_type) {
        envelope.attachments.merge(&observed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_attachments_win_on_collision() {
        let mut envelope = Envelope::new("bbo_change", Fields::new());
        envelope.attachments.insert("observer_note", "stale");
        let returned = Fields::new()
            .with("observer_note", "from_market")
            .with("best_bid", 99);

        merge_attachments(&mut envelope, &returned);

        assert_eq!(envelope.attachments.str("observer_note"), Some("quote_update"));
        assert_eq!(envelope.attachments.integer("best_bid").ok().flatten(), Some(99));
    }

    #[test]
    fn returned_attachments_override_without_observer_entry() {
        let mut envelope = Envelope::new("order_entered", Fields::new());
        envelope.attachments.insert("observer_note", "caller");

        merge_attachments(&mut envelope, &Fields::new().with("observer_note", "market"));

        assert_eq!(envelope.attachments.str("observer_note"), Some("market"));
    }
}
