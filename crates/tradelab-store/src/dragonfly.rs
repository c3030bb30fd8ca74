//! `Dragonfly` (Redis-compatible) implementation of the store contracts.
//!
//! Versioned records are hashes with a `version` and a JSON `payload` field.
//! The compare-and-swap runs as a Lua script so the version check and the
//! write are a single atomic step on the server. Session objects are plain
//! JSON strings written with `SET .. EX`.

use std::time::Duration;

use fred::prelude::*;
use fred::types::Expiration;
use tradelab_types::{MarketId, TraderId};

use crate::error::StoreError;
use crate::key::{EntityKey, market_traders_key};
use crate::versioned::{RecipientResolver, VersionedRecord, VersionedStore, session_ttl_secs};

/// Compare-and-swap on the `version` field.
///
/// `KEYS[1]` record key, `ARGV[1]` expected version, `ARGV[2]` payload JSON.
/// Replies `{1, new_version}`, `{0, current_version}` or `{-1, 0}` when the
/// key is missing.
const CAS_SCRIPT: &str = r"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
  return {-1, 0}
end
if current ~= ARGV[1] then
  return {0, tonumber(current)}
end
local next_version = tonumber(current) + 1
redis.call('HSET', KEYS[1], 'version', tostring(next_version), 'payload', ARGV[2])
return {1, next_version}
";

/// Create a record at version 0 unless the key exists. Replies 1 or 0.
const CREATE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'version', '0', 'payload', ARGV[1])
return 1
";

/// Connection handle to a `Dragonfly` instance serving entity records.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

fn corrupt(key: &EntityKey, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn to_version(key: &EntityKey, raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| corrupt(key, format!("negative version {raw}")))
}

impl VersionedStore for DragonflyStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<VersionedRecord>, StoreError> {
        let fields: Vec<Option<String>> = self
            .client
            .hmget(key.to_string(), vec!["version", "payload"])
            .await?;

        match fields.as_slice() {
            [Some(version), Some(payload)] => {
                let version = version
                    .parse::<u64>()
                    .map_err(|e| corrupt(key, format!("bad version field: {e}")))?;
                let payload = serde_json::from_str(payload)?;
                Ok(Some(VersionedRecord { version, payload }))
            }
            [None, None] => Ok(None),
            _ => Err(corrupt(key, "record hash is missing a field")),
        }
    }

    async fn conditional_write(
        &self,
        key: &EntityKey,
        payload: &serde_json::Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let json = serde_json::to_string(payload)?;
        let reply: Vec<i64> = self
            .client
            .eval(
                CAS_SCRIPT,
                vec![key.to_string()],
                vec![expected_version.to_string(), json],
            )
            .await?;

        match reply.as_slice() {
            [1, next] => to_version(key, *next),
            [0, found] => Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                found: to_version(key, *found)?,
            }),
            [-1, _] => Err(StoreError::KeyNotFound(key.to_string())),
            other => Err(corrupt(key, format!("unexpected CAS reply {other:?}"))),
        }
    }

    async fn create(&self, key: &EntityKey, payload: &serde_json::Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(payload)?;
        let created: i64 = self
            .client
            .eval(CREATE_SCRIPT, vec![key.to_string()], vec![json])
            .await?;
        if created == 1 {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(key.to_string()))
        }
    }

    async fn get_session(&self, key: &EntityKey) -> Result<Option<serde_json::Value>, StoreError> {
        let value: Option<String> = self.client.get(key.to_string()).await?;
        value
            .map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn put_session(
        &self,
        key: &EntityKey,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let seconds = session_ttl_secs(ttl)?;
        let _: () = self
            .client
            .set(
                key.to_string(),
                json.as_str(),
                Some(Expiration::EX(seconds)),
                None,
                false,
            )
            .await?;
        Ok(())
    }
}

impl RecipientResolver for DragonflyStore {
    async fn trader_ids_by_market(&self, market_id: MarketId) -> Result<Vec<TraderId>, StoreError> {
        let key = market_traders_key(market_id);
        let members: Vec<String> = self.client.smembers(&key).await?;
        let mut ids = Vec::with_capacity(members.len());
        for m in &members {
            let id = m.parse::<u64>().map_err(|e| StoreError::Corrupt {
                key: key.clone(),
                reason: format!("invalid trader id {m:?}: {e}"),
            })?;
            ids.push(TraderId(id));
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn add_trader_to_market(
        &self,
        market_id: MarketId,
        trader_id: TraderId,
    ) -> Result<(), StoreError> {
        let _: u32 = self
            .client
            .sadd(market_traders_key(market_id), trader_id.to_string())
            .await?;
        Ok(())
    }
}
