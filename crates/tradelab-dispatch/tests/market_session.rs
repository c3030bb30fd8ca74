//! Market, noise-arrival and session handler tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use common::{fixture, payload};
use serde_json::json;
use tradelab_dispatch::DispatchError;
use tradelab_store::{EntityKey, VersionedStore};
use tradelab_types::{Channel, Envelope, Fields, MarketId, SubsessionId};

fn market_event(event_type: &str, fields: Fields) -> Envelope {
    Envelope::new(event_type, fields.with("market_id", 1))
}

fn session_event(event_type: &str, subsession_id: u64, market_id: u64) -> Envelope {
    Envelope::new(
        event_type,
        Fields::new()
            .with("subsession_id", subsession_id)
            .with("market_id", market_id),
    )
}

// =============================================================================
// Market
// =============================================================================

#[tokio::test]
async fn market_commit_merges_dynamic_and_observer_attachments() {
    let fx = fixture().await;
    let fields = Fields::new().with("best_bid", 98).with("best_offer", 103);
    let out = fx
        .dispatcher
        .dispatch("market", market_event("bbo_change", fields))
        .await
        .unwrap();

    assert_eq!(out.attachments.integer("best_bid").unwrap(), Some(98));
    assert_eq!(out.attachments.integer("best_offer").unwrap(), Some(103));
    assert_eq!(out.attachments.str("observer_note"), Some("quote_update"));
    assert_eq!(out.outgoing_messages.len(), 1);
    assert_eq!(out.outgoing_messages[0].channel, Channel::Observers(MarketId(1)));

    let key = EntityKey::market(MarketId(1));
    let stored = payload(fx.store(), &key).await;
    assert_eq!(stored["market"]["best_bid"], json!(98));
    assert_eq!(fx.store().version_of(&key).await, Some(1));
    // Markets are not checkpointed.
    assert!(fx.checkpoints.is_empty());
}

#[tokio::test]
async fn observer_attachment_replaces_an_inbound_one() {
    let fx = fixture().await;
    let mut envelope = market_event("fundamental_price_change", Fields::new().with("new_price", 104));
    envelope.attachments.insert("observer_note", "stale");

    let out = fx.dispatcher.dispatch("market", envelope).await.unwrap();

    assert_eq!(out.attachments.str("observer_note"), Some("jump"));
}

#[tokio::test]
async fn market_id_falls_back_to_attachments() {
    let fx = fixture().await;
    let mut envelope = Envelope::new("market_start", Fields::new());
    envelope.attachments.insert("market_id", 2);

    let out = fx.dispatcher.dispatch("market", envelope).await.unwrap();

    assert_eq!(out.attachments.str("observer_note"), Some("market_open"));
    let key = EntityKey::market(MarketId(2));
    assert_eq!(payload(fx.store(), &key).await["market"]["is_running"], json!(true));
}

#[tokio::test]
async fn unknown_market_is_record_not_found() {
    let fx = fixture().await;
    let mut envelope = Envelope::new("market_start", Fields::new());
    envelope.message.insert("market_id", 12);
    let err = fx.dispatcher.dispatch("market", envelope).await.unwrap_err();
    assert!(matches!(err, DispatchError::RecordNotFound { ref key } if key == "market:12"));
}

// =============================================================================
// Noise-trader arrival
// =============================================================================

fn noise_order(price: &str) -> Envelope {
    Envelope::new(
        "noise_trader_arrival",
        Fields::new()
            .with("market_id", 1)
            .with("buy_sell_indicator", "S")
            .with("price", price)
            .with("time_in_force", "5"),
    )
}

#[tokio::test]
async fn noise_arrival_coerces_fields_and_relays_to_exchange() {
    let fx = fixture().await;
    fx.dispatcher
        .dispatch("market", market_event("market_start", Fields::new()))
        .await
        .unwrap();

    let out = fx
        .dispatcher
        .dispatch("noise_trader_arrival", noise_order("101.7"))
        .await
        .unwrap();

    assert_eq!(out.message.get("price"), Some(&json!(101)));
    assert_eq!(out.message.get("time_in_force"), Some(&json!(5)));
    assert_eq!(out.attachments.str("market_id"), Some("1"));
    assert_eq!(out.attachments.str("order_token"), Some("NOISE1B0000001"));

    let enter = &out.outgoing_messages[0];
    assert_eq!(enter.channel, Channel::Exchange(MarketId(1)));
    assert_eq!(enter.message_type, "enter");
    assert_eq!(enter.fields.integer("price").unwrap(), Some(101));
}

#[tokio::test]
async fn noise_arrival_with_garbage_price_is_rejected() {
    let fx = fixture().await;
    let err = fx
        .dispatcher
        .dispatch("noise_trader_arrival", noise_order("cheap"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidField(_)));
    assert_eq!(
        fx.store().version_of(&EntityKey::market(MarketId(1))).await,
        Some(0)
    );
}

#[tokio::test]
async fn noise_arrival_on_closed_market_is_a_domain_error() {
    let fx = fixture().await;
    let err = fx
        .dispatcher
        .dispatch("noise_trader_arrival", noise_order("100"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Domain(_)));
}

// =============================================================================
// Trade session
// =============================================================================

#[tokio::test]
async fn session_start_keeps_clients_out_of_the_store() {
    let fx = fixture().await;
    let out = fx
        .dispatcher
        .dispatch("trade_session", session_event("market_ready_to_start", 7, 1))
        .await
        .unwrap();

    assert!(out
        .outgoing_messages
        .iter()
        .any(|m| m.message_type == "session_start"));

    let mailbox = fx.dispatcher.sessions().mailbox(SubsessionId(7)).await.unwrap();
    assert_eq!(mailbox.len(), 2);
    assert!(mailbox.client("exchange:1").is_some());
    assert!(mailbox.client("noise_trader:1").is_some());

    let stored = fx
        .store()
        .get_session(&EntityKey::session(SubsessionId(7)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["phase"], json!("running"));
    assert!(stored.get("clients").is_none());
}

#[tokio::test]
async fn session_end_stops_the_clients_it_started() {
    let fx = fixture().await;
    fx.dispatcher
        .dispatch("trade_session", session_event("market_ready_to_start", 7, 1))
        .await
        .unwrap();
    let out = fx
        .dispatcher
        .dispatch("trade_session", session_event("market_ready_to_end", 7, 1))
        .await
        .unwrap();

    let stopped = out
        .outgoing_messages
        .iter()
        .filter(|m| m.message_type == "stop_client")
        .count();
    assert_eq!(stopped, 2);
    let mailbox = fx.dispatcher.sessions().mailbox(SubsessionId(7)).await.unwrap();
    assert!(mailbox.is_empty());
}

#[tokio::test]
async fn missing_session_is_record_not_found() {
    let fx = fixture().await;
    let err = fx
        .dispatcher
        .dispatch("trade_session", session_event("market_ready_to_start", 8, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::RecordNotFound { ref key } if key == "trade_session:8"));
}

#[tokio::test]
async fn session_event_requires_subsession_id() {
    let fx = fixture().await;
    let envelope = Envelope::new("market_ready_to_start", Fields::new().with("market_id", 1));
    let err = fx
        .dispatcher
        .dispatch("trade_session", envelope)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::MissingIdentifier {
            field: "subsession_id",
            ..
        }
    ));
}
