//! Shared fixtures for the dispatch integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tradelab_dispatch::{
    DispatchSettings, Dispatcher, ExchangeConfig, MemoryCheckpointSink, RetryPolicy, seed,
};
use tradelab_store::{
    EntityKey, MemoryStore, RecipientResolver, StoreError, VersionedRecord, VersionedStore,
};
use tradelab_types::{Envelope, Fields, MarketId, OutgoingMessage, TraderId};

/// Market 1 (fundamental 100) with a maker (1), an out trader (2) and a
/// sniper (3); market 2 with one out trader (4); session 7 over market 1.
pub const SETUP: &str = r"
setup:
  markets:
    - id: 1
      fundamental_price: 100
    - id: 2
      fundamental_price: 50
  traders:
    - id: 1
      market_id: 1
      role: maker
    - id: 2
      market_id: 1
      role: out
    - id: 3
      market_id: 1
      role: sniper
    - id: 4
      market_id: 2
      role: out
  sessions:
    - id: 7
      markets: [1]
";

/// How [`ScriptedStore`] interferes with conditional writes.
#[derive(Debug)]
pub enum Contention {
    /// Plain pass-through.
    None,
    /// Yield to the scheduler between read and write.
    Yield,
    /// Before each of the next N conditional writes, commit a rival write
    /// to the same key so the caller's write conflicts.
    Rivals(AtomicU32),
    /// Every conditional write conflicts.
    Always,
}

/// A [`MemoryStore`] wrapper that can manufacture version conflicts.
#[derive(Debug)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    pub contention: Contention,
    pub write_attempts: AtomicU32,
}

impl ScriptedStore {
    pub fn new(contention: Contention) -> Self {
        Self {
            inner: MemoryStore::new(),
            contention,
            write_attempts: AtomicU32::new(0),
        }
    }

    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub async fn version(&self, key: &EntityKey) -> Option<u64> {
        self.inner.version_of(key).await
    }
}

impl VersionedStore for ScriptedStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<VersionedRecord>, StoreError> {
        let record = self.inner.get(key).await;
        if matches!(self.contention, Contention::Yield) {
            tokio::task::yield_now().await;
        }
        record
    }

    async fn conditional_write(
        &self,
        key: &EntityKey,
        payload: &serde_json::Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        match &self.contention {
            Contention::Always => {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: expected_version,
                    found: expected_version.saturating_add(1),
                });
            }
            Contention::Rivals(remaining) => {
                let rival = remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if rival {
                    if let Some(current) = self.inner.get(key).await? {
                        self.inner
                            .conditional_write(key, &current.payload, current.version)
                            .await?;
                    }
                }
            }
            Contention::None | Contention::Yield => {}
        }
        self.inner
            .conditional_write(key, payload, expected_version)
            .await
    }

    async fn create(&self, key: &EntityKey, payload: &serde_json::Value) -> Result<(), StoreError> {
        self.inner.create(key, payload).await
    }

    async fn get_session(&self, key: &EntityKey) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get_session(key).await
    }

    async fn put_session(
        &self,
        key: &EntityKey,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.inner.put_session(key, value, ttl).await
    }
}

impl RecipientResolver for ScriptedStore {
    async fn trader_ids_by_market(&self, market_id: MarketId) -> Result<Vec<TraderId>, StoreError> {
        self.inner.trader_ids_by_market(market_id).await
    }

    async fn add_trader_to_market(
        &self,
        market_id: MarketId,
        trader_id: TraderId,
    ) -> Result<(), StoreError> {
        self.inner.add_trader_to_market(market_id, trader_id).await
    }
}

/// A dispatcher over a seeded store, plus the checkpoint sink it reports to.
pub struct Fixture<S> {
    pub dispatcher: Arc<Dispatcher<S>>,
    pub checkpoints: Arc<MemoryCheckpointSink>,
}

impl<S> Fixture<S>
where
    S: VersionedStore + RecipientResolver,
{
    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }
}

pub fn settings() -> DispatchSettings {
    DispatchSettings {
        retry: RetryPolicy::immediate(64),
        shuffle_seed: Some(42),
        ..DispatchSettings::default()
    }
}

pub async fn fixture_with<S>(store: S, settings: DispatchSettings) -> Fixture<S>
where
    S: VersionedStore + RecipientResolver,
{
    let config = ExchangeConfig::parse(SETUP).unwrap();
    seed(&store, &config.setup, &settings).await.unwrap();
    let checkpoints = Arc::new(MemoryCheckpointSink::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(store),
        Arc::clone(&checkpoints) as Arc<dyn tradelab_dispatch::CheckpointSink>,
        settings,
    ));
    Fixture {
        dispatcher,
        checkpoints,
    }
}

pub async fn fixture() -> Fixture<MemoryStore> {
    fixture_with(MemoryStore::new(), settings()).await
}

/// Envelope addressed to a trader through the message.
pub fn trader_event(event_type: &str, trader_id: u64, fields: Fields) -> Envelope {
    Envelope::new(event_type, fields.with("player_id", trader_id))
}

/// Order-insensitive view of a message list.
pub fn multiset(messages: &[OutgoingMessage]) -> Vec<String> {
    let mut encoded: Vec<String> = messages
        .iter()
        .map(|m| serde_json::to_string(m).unwrap())
        .collect();
    encoded.sort();
    encoded
}

/// Current stored payload of `key`.
pub async fn payload<S: VersionedStore>(store: &S, key: &EntityKey) -> serde_json::Value {
    store.get(key).await.unwrap().unwrap().payload
}
