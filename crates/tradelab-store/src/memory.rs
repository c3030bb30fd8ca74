//! In-process implementation of the store contracts.
//!
//! [`MemoryStore`] keeps every record behind a [`tokio::sync::RwLock`]. The
//! compare-and-swap happens under the write lock, so it gives the same
//! per-key ordering guarantee as the `Dragonfly` Lua script. It also counts
//! reads and writes, which lets callers assert that a code path never
//! touched the store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tradelab_types::{MarketId, TraderId};

use crate::error::StoreError;
use crate::key::EntityKey;
use crate::versioned::{RecipientResolver, VersionedRecord, VersionedStore, session_ttl_secs};

/// Session object with its expiry deadline.
#[derive(Debug, Clone)]
struct SessionEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// An in-process versioned store and recipient resolver.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<EntityKey, VersionedRecord>>,
    sessions: RwLock<HashMap<EntityKey, SessionEntry>>,
    market_traders: RwLock<BTreeMap<MarketId, BTreeSet<TraderId>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record and session reads served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of write attempts (successful or not) served so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Current version of the record at `key`, if any.
    pub async fn version_of(&self, key: &EntityKey) -> Option<u64> {
        self.records.read().await.get(key).map(|r| r.version)
    }
}

impl VersionedStore for MemoryStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<VersionedRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn conditional_write(
        &self,
        key: &EntityKey,
        payload: &serde_json::Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;

        if record.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                found: record.version,
            });
        }

        let next = record.version.checked_add(1).ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: "version counter overflow".to_owned(),
        })?;
        record.version = next;
        record.payload = payload.clone();
        Ok(next)
    }

    async fn create(&self, key: &EntityKey, payload: &serde_json::Value) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.write().await;
        if records.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        records.insert(
            *key,
            VersionedRecord {
                version: 0,
                payload: payload.clone(),
            },
        );
        Ok(())
    }

    async fn get_session(&self, key: &EntityKey) -> Result<Option<serde_json::Value>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn put_session(
        &self,
        key: &EntityKey,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        session_ttl_secs(ttl)?;
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| {
                StoreError::Config(format!("session ttl overflows the clock: {ttl:?}"))
            })?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().await.insert(
            *key,
            SessionEntry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }
}

impl RecipientResolver for MemoryStore {
    async fn trader_ids_by_market(&self, market_id: MarketId) -> Result<Vec<TraderId>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .market_traders
            .read()
            .await
            .get(&market_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn add_trader_to_market(
        &self,
        market_id: MarketId,
        trader_id: TraderId,
    ) -> Result<(), StoreError> {
        self.market_traders
            .write()
            .await
            .entry(market_id)
            .or_default()
            .insert(trader_id);
        Ok(())
    }
}
