//! Event handlers, one per category.
//!
//! Every handler is a method on [`crate::Dispatcher`] that takes an envelope
//! by value and returns it with attachments and outgoing messages added.
//!
//! - [`trader`] -- single-trader transitions under optimistic concurrency
//! - [`market`] -- market transitions and observer attachments
//! - [`session`] -- session lifecycle under the registry guard
//! - [`fanout`] -- one event applied to many traders
//! - [`noise`] -- noise-trader orders routed through the market

pub mod fanout;
pub mod market;
pub mod noise;
pub mod session;
pub mod trader;

use serde::de::DeserializeOwned;
use tradelab_store::{EntityKey, StoreError, VersionedRecord, VersionedStore};
use tradelab_types::Fields;

use crate::error::DispatchError;
use crate::retry::Attempt;

/// Field naming the trader an event is for.
pub(crate) const PLAYER_ID: &str = "player_id";
/// Field naming the market an event is for.
pub(crate) const MARKET_ID: &str = "market_id";
/// Field naming the subsession an event is for.
pub(crate) const SUBSESSION_ID: &str = "subsession_id";

/// The first source that carries `field`.
///
/// # Errors
///
/// [`DispatchError::MissingIdentifier`] if no source has it, or
/// [`DispatchError::InvalidField`] if the first one that does holds a
/// malformed id.
pub(crate) fn resolve_id(
    field: &'static str,
    event_type: &str,
    sources: [&Fields; 2],
) -> Result<u64, DispatchError> {
    for fields in sources {
        if let Some(id) = fields.id(field)? {
            return Ok(id);
        }
    }
    Err(DispatchError::missing(field, event_type))
}

/// A required id taken from a single field map.
pub(crate) fn required_id(
    field: &'static str,
    event_type: &str,
    fields: &Fields,
) -> Result<u64, DispatchError> {
    fields
        .id(field)?
        .ok_or_else(|| DispatchError::missing(field, event_type))
}

/// Read a versioned record that must exist.
pub(crate) async fn load<S: VersionedStore>(
    store: &S,
    key: &EntityKey,
) -> Result<VersionedRecord, DispatchError> {
    store
        .get(key)
        .await?
        .ok_or_else(|| DispatchError::RecordNotFound {
            key: key.to_string(),
        })
}

/// Decode a stored payload into its entity type.
pub(crate) fn decode<T: DeserializeOwned>(
    key: &EntityKey,
    payload: serde_json::Value,
) -> Result<T, DispatchError> {
    serde_json::from_value(payload).map_err(|e| DispatchError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Conditional write that reports a lost race as [`Attempt::Conflict`].
pub(crate) async fn write_if_unchanged<S: VersionedStore>(
    store: &S,
    key: &EntityKey,
    payload: &serde_json::Value,
    read_version: u64,
) -> Result<Attempt<u64>, DispatchError> {
    match store.conditional_write(key, payload, read_version).await {
        Ok(version) => Ok(Attempt::Committed(version)),
        Err(StoreError::VersionConflict { found, .. }) => {
            tracing::debug!(%key, read_version, found, "lost compare-and-swap");
            Ok(Attempt::Conflict { found })
        }
        Err(e) => Err(e.into()),
    }
}
