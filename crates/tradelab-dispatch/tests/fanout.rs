//! Fan-out handler tests: market-wide and role-based events.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use common::{fixture, fixture_with, multiset, settings, trader_event};
use tradelab_dispatch::{DispatchError, DispatchSettings};
use tradelab_store::{EntityKey, MemoryStore};
use tradelab_types::{Envelope, Fields, OutgoingMessage, TraderId};

fn price_jump(market_id: u64, price: i64) -> Envelope {
    Envelope::new(
        "fundamental_price_change",
        Fields::new()
            .with("market_id", market_id)
            .with("new_price", price),
    )
}

/// Messages each trader of market 1 produces for the same jump when
/// dispatched on its own, concatenated.
async fn individual_outputs(price: i64) -> Vec<OutgoingMessage> {
    let fx = fixture().await;
    let mut all = Vec::new();
    for trader_id in [1, 2, 3] {
        let mut envelope = trader_event(
            "fundamental_price_change",
            trader_id,
            Fields::new().with("new_price", price),
        );
        envelope.attachments.insert("market_id", 1);
        let out = fx.dispatcher.dispatch("trader", envelope).await.unwrap();
        all.extend(out.outgoing_messages);
    }
    all
}

#[tokio::test]
async fn marketwide_output_is_a_permutation_of_individual_outputs() {
    let expected = multiset(&individual_outputs(125).await);

    for seed in [1, 7, 42, 1_000] {
        let settings = DispatchSettings {
            shuffle_seed: Some(seed),
            ..settings()
        };
        let fx = fixture_with(MemoryStore::new(), settings).await;
        let out = fx
            .dispatcher
            .dispatch("marketwide_events", price_jump(1, 125))
            .await
            .unwrap();

        assert_eq!(multiset(&out.outgoing_messages), expected, "seed {seed}");
        assert_eq!(out.attachments.id("market_id").unwrap(), Some(1));
        for trader_id in [1, 2, 3] {
            let key = EntityKey::trader(TraderId(trader_id));
            assert_eq!(fx.store().version_of(&key).await, Some(1), "trader {trader_id}");
        }
        // Market 2's trader is not a recipient.
        let other = EntityKey::trader(TraderId(4));
        assert_eq!(fx.store().version_of(&other).await, Some(0));
    }
}

#[tokio::test]
async fn same_seed_gives_same_order() {
    let mut orders = Vec::new();
    for _ in 0..2 {
        let fx = fixture().await;
        let out = fx
            .dispatcher
            .dispatch("marketwide_events", price_jump(1, 90))
            .await
            .unwrap();
        orders.push(out.outgoing_messages);
    }
    assert_eq!(orders[0], orders[1]);
}

#[tokio::test]
async fn marketwide_event_for_empty_market_is_a_no_op() {
    let fx = fixture().await;
    let out = fx
        .dispatcher
        .dispatch("marketwide_events", price_jump(9, 90))
        .await
        .unwrap();
    assert!(out.outgoing_messages.is_empty());
    assert!(fx.checkpoints.is_empty());
}

#[tokio::test]
async fn role_based_event_reaches_only_listed_makers() {
    let fx = fixture().await;
    let envelope = Envelope::new(
        "fundamental_price_change",
        Fields::new()
            .with("market_id", 1)
            .with("maker_ids", vec![1_u64])
            .with("new_price", 104),
    );
    let out = fx
        .dispatcher
        .dispatch("role_based_events", envelope)
        .await
        .unwrap();

    assert_eq!(out.outgoing_messages.len(), 3);
    assert_eq!(out.attachments.id("player_id").unwrap(), Some(1));
    assert_eq!(
        fx.store().version_of(&EntityKey::trader(TraderId(1))).await,
        Some(1)
    );
    for untouched in [2, 3, 4] {
        let key = EntityKey::trader(TraderId(untouched));
        assert_eq!(fx.store().version_of(&key).await, Some(0));
    }
}

#[tokio::test]
async fn role_based_event_requires_maker_ids() {
    let fx = fixture().await;
    let err = fx
        .dispatcher
        .dispatch("role_based_events", price_jump(1, 104))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::MissingIdentifier {
            field: "maker_ids",
            ..
        }
    ));
}

#[tokio::test]
async fn failing_recipient_aborts_the_fan_out() {
    let fx = fixture().await;
    let envelope = Envelope::new(
        "speed_change",
        Fields::new()
            .with("market_id", 1)
            .with("maker_ids", vec![1_u64, 99])
            .with("value", true),
    );
    let err = fx
        .dispatcher
        .dispatch("role_based_events", envelope)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::RecordNotFound { ref key } if key == "trader:99"));
    // Earlier recipients keep their commits.
    assert_eq!(
        fx.store().version_of(&EntityKey::trader(TraderId(1))).await,
        Some(1)
    );
}
