//! Noise-trader arrival handler.

use tradelab_store::{RecipientResolver, VersionedStore};
use tradelab_types::Envelope;

use super::{MARKET_ID, required_id};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

impl<S> Dispatcher<S>
where
    S: VersionedStore + RecipientResolver,
{
    /// Relay a noise-trader order through its market.
    ///
    /// Noise orders arrive with loosely typed fields: `price` and
    /// `time_in_force` are coerced to integers and the market id is copied
    /// into the attachments (as a string) before the market handler runs.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingIdentifier`] without a `market_id`,
    /// [`DispatchError::InvalidField`] if a field cannot be coerced, or
    /// anything [`Dispatcher::handle_market`] returns.
    pub async fn handle_noise_trader_arrival(
        &self,
        mut envelope: Envelope,
    ) -> Result<Envelope, DispatchError> {
        let market_id = required_id(MARKET_ID, &envelope.event_type, &envelope.message)?;
        envelope.attachments.insert(MARKET_ID, market_id.to_string());
        envelope.message.coerce_integer("price")?;
        envelope.message.coerce_integer("time_in_force")?;
        self.handle_market(envelope).await
    }
}
