//! Single-trader handler.
//!
//! A trader event is applied as a read-modify-write against the trader's
//! versioned record. Every attempt rebuilds the trader from the record it
//! just read, so an attempt that loses the compare-and-swap leaves nothing
//! behind: its messages and state are dropped with it.

use tradelab_market::{Trader, TraderRecord, TraderVariant};
use tradelab_store::{EntityKey, RecipientResolver, VersionedStore};
use tradelab_types::{Checkpoint, Envelope, FieldError, OutgoingMessage, TraderId};

use super::{PLAYER_ID, decode, load, resolve_id, write_if_unchanged};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::retry::Attempt;

/// Event type whose `state` field replaces the stored role.
const ROLE_CHANGE: &str = "role_change";

/// What a committed attempt produced.
#[derive(Debug)]
struct TraderCommit {
    version: u64,
    state: serde_json::Value,
    messages: Vec<OutgoingMessage>,
}

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Apply an event to one trader.
    ///
    /// The trader is named by `player_id` in the attachments or, failing
    /// that, in the message. Id 0 is the investor, which has no record: the
    /// envelope is tagged with `note = "investor"` and checkpointed without
    /// touching the store.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingIdentifier`] if no `player_id` is present
    /// - [`DispatchError::RecordNotFound`] if the trader does not exist
    /// - [`DispatchError::UnknownTraderVariant`] / [`DispatchError::UnknownRole`]
    ///   if the trader cannot be rebuilt
    /// - [`DispatchError::Domain`] if the trader rejects the event
    /// - [`DispatchError::RetriesExhausted`] if every attempt conflicted
    pub async fn handle_trader(&self, mut envelope: Envelope) -> Result<Envelope, DispatchError> {
        let trader_id = TraderId(resolve_id(
            PLAYER_ID,
            &envelope.event_type,
            [&envelope.attachments, &envelope.message],
        )?);

        if trader_id.is_investor() {
            envelope.attachments.insert("note", "investor");
            tracing::debug!(event_id = %envelope.id, event_type = %envelope.event_type, "investor event");
            self.checkpoints.submit(Checkpoint::investor(envelope.clone()));
            return Ok(envelope);
        }

        let key = EntityKey::trader(trader_id);
        let commit = {
            let key = &key;
            let event = &envelope;
            self.settings
                .retry
                .run(key, move || self.trader_attempt(key, event))
                .await?
        };

        tracing::debug!(
            %trader_id,
            version = commit.version,
            messages = commit.messages.len(),
            event_type = %envelope.event_type,
            "trader committed"
        );
        envelope.outgoing_messages.extend(commit.messages);
        self.checkpoints.submit(Checkpoint::trader(
            trader_id,
            commit.version,
            commit.state,
            envelope.clone(),
        ));
        Ok(envelope)
    }

    async fn trader_attempt(
        &self,
        key: &EntityKey,
        envelope: &Envelope,
    ) -> Result<Attempt<TraderCommit>, DispatchError> {
        let record = load(self.store.as_ref(), key).await?;
        let mut stored: TraderRecord = decode(key, record.payload)?;

        if envelope.event_type == ROLE_CHANGE {
            let role = match envelope.message.get("state") {
                None | Some(serde_json::Value::Null) => {
                    return Err(FieldError::Missing("state".to_owned()).into());
                }
                Some(serde_json::Value::String(role)) => role,
                Some(other) => {
                    return Err(FieldError::Invalid {
                        field: "state".to_owned(),
                        expected: "role name",
                        found: other.to_string(),
                    }
                    .into());
                }
            };
            stored.role.clone_from(role);
        }

        let variant =
            TraderVariant::resolve(self.settings.session_format, self.settings.exchange_format)?;
        let mut trader = Trader::from_record(variant, stored)?;
        trader.receive(&envelope.event_type, &envelope.fields())?;
        let messages = trader.take_outgoing();

        let committed = trader.to_record();
        let state = serde_json::to_value(&committed.subject_state)?;
        let payload = serde_json::to_value(&committed)?;

        Ok(write_if_unchanged(self.store.as_ref(), key, &payload, record.version)
            .await?
            .map(|version| TraderCommit {
                version,
                state,
                messages,
            }))
    }
}
