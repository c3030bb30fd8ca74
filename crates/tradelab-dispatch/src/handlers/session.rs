//! Session lifecycle handler.
//!
//! Session objects are unversioned and written last-write-wins. Serializing
//! session events through the registry guard is what keeps them consistent,
//! so the guard is taken before the first read and released after the write.

use tradelab_market::TradeSession;
use tradelab_store::{EntityKey, RecipientResolver, VersionedStore};
use tradelab_types::{Envelope, MarketId, SubsessionId};

use super::{MARKET_ID, SUBSESSION_ID, decode, required_id};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Apply a lifecycle event to a trade session.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingIdentifier`] if the message lacks
    ///   `subsession_id` or `market_id`
    /// - [`DispatchError::RecordNotFound`] if the session does not exist
    /// - [`DispatchError::Domain`] if the session rejects the event
    /// - [`DispatchError::Store`] if the read or write fails
    pub async fn handle_session_event(
        &self,
        mut envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        let mut guard = self.sessions.lock().await;

        let subsession_id = SubsessionId(required_id(
            SUBSESSION_ID,
            &envelope.event_type,
            &envelope.message,
        )?);
        let market_id = MarketId(required_id(MARKET_ID, &envelope.event_type, &envelope.message)?);

        let key = EntityKey::session(subsession_id);
        let value = self
            .store
            .get_session(&key)
            .await?
            .ok_or_else(|| DispatchError::RecordNotFound {
                key: key.to_string(),
            })?;
        let mut session: TradeSession = decode(&key, value)?;

        session.attach_mailbox(guard.check_out(subsession_id));
        let applied = session.receive(&envelope.event_type, market_id);
        guard.check_in(subsession_id, session.detach_mailbox());
        applied?;

        let messages = session.take_outgoing();
        tracing::info!(
            %subsession_id,
            %market_id,
            event_type = %envelope.event_type,
            phase = ?session.phase,
            messages = messages.len(),
            "session event applied"
        );
        envelope.outgoing_messages.extend(messages);

        let value = serde_json::to_value(&session)?;
        self.store
            .put_session(&key, &value, self.settings.session_ttl)
            .await?;
        drop(guard);
        Ok(envelope)
    }
}
