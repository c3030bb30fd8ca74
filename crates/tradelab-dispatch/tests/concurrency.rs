//! Optimistic-concurrency tests: racing dispatches, forced conflicts and the
//! bounded retry budget.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use common::{Contention, ScriptedStore, fixture_with, settings, trader_event};
use tradelab_dispatch::{DispatchError, DispatchSettings, RetryPolicy};
use tradelab_store::EntityKey;
use tradelab_types::{CheckpointKind, Fields, TraderId};

const RACERS: u64 = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_commit_consecutive_versions() {
    let fx = fixture_with(ScriptedStore::new(Contention::Yield), settings()).await;
    let key = EntityKey::trader(TraderId(2));

    let tasks: Vec<_> = (0..RACERS)
        .map(|i| {
            let dispatcher = Arc::clone(&fx.dispatcher);
            let bid = i64::try_from(i).unwrap() + 90;
            tokio::spawn(async move {
                let fields = Fields::new().with("best_bid", bid).with("best_offer", 110);
                dispatcher
                    .dispatch("trader", trader_event("bbo_change", 2, fields))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(fx.store().version(&key).await, Some(RACERS));

    let mut versions: Vec<u64> = fx
        .checkpoints
        .records()
        .into_iter()
        .map(|c| match c.kind {
            CheckpointKind::Trader { version, .. } => version,
            CheckpointKind::Investor => 0,
        })
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=RACERS).collect::<Vec<_>>());
}

#[tokio::test]
async fn lost_races_discard_their_messages() {
    let rivals = 3;
    let store = ScriptedStore::new(Contention::Rivals(AtomicU32::new(rivals)));
    let fx = fixture_with(store, settings()).await;
    let key = EntityKey::trader(TraderId(1));

    let envelope = trader_event(
        "fundamental_price_change",
        1,
        Fields::new().with("new_price", 120),
    );
    let out = fx.dispatcher.dispatch("trader", envelope).await.unwrap();

    // One fundamental-price notice plus a fresh two-sided quote, from the
    // winning attempt only.
    assert_eq!(out.outgoing_messages.len(), 3);
    assert_eq!(fx.store().write_attempts(), rivals + 1);
    // Each rival commit bumped the version once before ours landed.
    assert_eq!(fx.store().version(&key).await, Some(u64::from(rivals) + 1));

    let records = fx.checkpoints.records();
    assert_eq!(records.len(), 1);
    assert!(matches!(
        records[0].kind,
        CheckpointKind::Trader { version, .. } if version == u64::from(rivals) + 1
    ));
}

#[tokio::test]
async fn permanently_contended_key_exhausts_the_budget() {
    let settings = DispatchSettings {
        retry: RetryPolicy::immediate(8),
        ..settings()
    };
    let fx = fixture_with(ScriptedStore::new(Contention::Always), settings).await;
    let key = EntityKey::trader(TraderId(2));

    let envelope = trader_event("speed_change", 2, Fields::new().with("value", true));
    let err = fx.dispatcher.dispatch("trader", envelope).await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::RetriesExhausted { ref key, attempts: 8 } if key == "trader:2"
    ));
    assert_eq!(fx.store().write_attempts(), 8);
    assert_eq!(fx.store().version(&key).await, Some(0));
    assert!(fx.checkpoints.is_empty());
}

#[tokio::test(start_paused = true)]
async fn default_policy_backs_off_between_attempts() {
    let settings = DispatchSettings {
        retry: RetryPolicy {
            max_attempts: 4,
            ..RetryPolicy::default()
        },
        ..settings()
    };
    let fx = fixture_with(ScriptedStore::new(Contention::Always), settings).await;

    let started = tokio::time::Instant::now();
    let err = fx
        .dispatcher
        .dispatch("trader", trader_event("speed_change", 2, Fields::new().with("value", true)))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::RetriesExhausted { attempts: 4, .. }));
    // Three sleeps, each at most min(50, 2^n) ms.
    assert!(started.elapsed() <= std::time::Duration::from_millis(2 + 4 + 8));
}
