//! Store contracts consumed by the dispatcher.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradelab_types::{MarketId, TraderId};

use crate::error::StoreError;
use crate::key::EntityKey;

/// Longest accepted session expiry in seconds: the range of the `EX` option
/// `Dragonfly` takes.
pub const MAX_SESSION_TTL_SECS: u64 = i64::MAX.unsigned_abs();

/// Whole seconds of a session expiry.
///
/// Both backends go through this check so they agree on what is accepted.
///
/// # Errors
///
/// Returns [`StoreError::Config`] if `ttl` is shorter than one second or
/// longer than [`MAX_SESSION_TTL_SECS`].
pub fn session_ttl_secs(ttl: Duration) -> Result<i64, StoreError> {
    let secs = ttl.as_secs();
    if secs == 0 {
        return Err(StoreError::Config(format!(
            "session ttl must be at least 1s, got {ttl:?}"
        )));
    }
    i64::try_from(secs).map_err(|_| {
        StoreError::Config(format!(
            "session ttl exceeds {MAX_SESSION_TTL_SECS}s, got {ttl:?}"
        ))
    })
}

/// A record read from the store: a payload and the version it was written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    /// Number of successful writes since creation (creation is version 0).
    pub version: u64,
    /// Entity-kind-specific snapshot.
    pub payload: serde_json::Value,
}

/// A key-value store whose values carry a version counter.
///
/// Conditional writes succeed only when the caller's expected version equals
/// the stored one, and bump the version by exactly one. A rejected write
/// leaves the record untouched.
pub trait VersionedStore: Send + Sync {
    /// Read the record at `key`, or `None` if absent.
    fn get(
        &self,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Option<VersionedRecord>, StoreError>> + Send;

    /// Replace the payload at `key` if its version is still
    /// `expected_version`. Returns the new version.
    ///
    /// Fails with [`StoreError::VersionConflict`] if the version moved and
    /// [`StoreError::KeyNotFound`] if there is no record.
    fn conditional_write(
        &self,
        key: &EntityKey,
        payload: &serde_json::Value,
        expected_version: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Create a record at version 0. Used by experiment setup only.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a record is present.
    fn create(
        &self,
        key: &EntityKey,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read an unversioned (last-write-wins) session object.
    fn get_session(
        &self,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, StoreError>> + Send;

    /// Write a session object unconditionally, expiring after `ttl`.
    ///
    /// Fails with [`StoreError::Config`] if `ttl` is outside the range
    /// accepted by [`session_ttl_secs`].
    fn put_session(
        &self,
        key: &EntityKey,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Resolves the traders participating in a market.
pub trait RecipientResolver: Send + Sync {
    /// All trader ids registered in `market_id`, in ascending order.
    fn trader_ids_by_market(
        &self,
        market_id: MarketId,
    ) -> impl Future<Output = Result<Vec<TraderId>, StoreError>> + Send;

    /// Register `trader_id` as a participant of `market_id`. Used by
    /// experiment setup only.
    fn add_trader_to_market(
        &self,
        market_id: MarketId,
        trader_id: TraderId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ttl_bounds() {
        assert!(matches!(session_ttl_secs(Duration::from_secs(3600)), Ok(3600)));
        assert!(matches!(
            session_ttl_secs(Duration::ZERO),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            session_ttl_secs(Duration::from_millis(500)),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            session_ttl_secs(Duration::from_secs(MAX_SESSION_TTL_SECS)),
            Ok(i64::MAX)
        ));
        assert!(matches!(
            session_ttl_secs(Duration::from_secs(u64::MAX)),
            Err(StoreError::Config(_))
        ));
    }
}
