//! Trade session entity and its server-side mailbox.
//!
//! A [`TradeSession`] coordinates the start and end of trading across the
//! markets of one subsession. The connection bookkeeping for the auxiliary
//! clients it starts (matching engines, noise traders, the investor feed)
//! lives in a [`Mailbox`] that is attached to the session only while an
//! event is being applied. The mailbox is never serialized with the session.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tradelab_types::{Channel, MarketId, OutgoingMessage, SessionFormat, SubsessionId};

use crate::error::DomainError;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for every market to report ready.
    #[default]
    Pending,
    /// Trading.
    Running,
    /// Every market has ended.
    Ended,
}

/// What an auxiliary client does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Matching engine for one market.
    Exchange,
    /// Background noise trader for one market.
    NoiseTrader,
    /// Investor order feed (slider-driven sessions).
    Investor,
}

impl ClientRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::NoiseTrader => "noise_trader",
            Self::Investor => "investor",
        }
    }
}

/// Bookkeeping for one running auxiliary client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    /// Market the client serves.
    pub market_id: MarketId,
    /// What the client does.
    pub role: ClientRole,
    /// When the session started it.
    pub started_at: DateTime<Utc>,
}

/// Live, server-side connection state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    clients: BTreeMap<String, ClientHandle>,
}

impl Mailbox {
    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Look up a client by name (e.g. `exchange:1`).
    pub fn client(&self, name: &str) -> Option<&ClientHandle> {
        self.clients.get(name)
    }

    fn register(&mut self, market_id: MarketId, role: ClientRole) -> String {
        let name = format!("{}:{market_id}", role.as_str());
        self.clients.insert(
            name.clone(),
            ClientHandle {
                market_id,
                role,
                started_at: Utc::now(),
            },
        );
        name
    }

    fn remove_market(&mut self, market_id: MarketId) -> Vec<String> {
        let names: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, handle)| handle.market_id == market_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.clients.remove(name);
        }
        names
    }
}

/// The serializable state of one trading subsession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSession {
    /// The subsession id.
    pub id: SubsessionId,
    /// Session design.
    pub format: SessionFormat,
    /// Markets taking part.
    pub markets: BTreeSet<MarketId>,
    /// Markets that reported ready to start.
    #[serde(default)]
    pub ready_to_start: BTreeSet<MarketId>,
    /// Markets that reported ready to end.
    #[serde(default)]
    pub ready_to_end: BTreeSet<MarketId>,
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: SessionPhase,
    #[serde(skip)]
    clients: Mailbox,
    #[serde(skip)]
    outbox: Vec<OutgoingMessage>,
}

impl TradeSession {
    /// A pending session over `markets`.
    pub fn new(id: SubsessionId, format: SessionFormat, markets: BTreeSet<MarketId>) -> Self {
        Self {
            id,
            format,
            markets,
            ready_to_start: BTreeSet::new(),
            ready_to_end: BTreeSet::new(),
            phase: SessionPhase::Pending,
            clients: Mailbox::default(),
            outbox: Vec::new(),
        }
    }

    /// Hand the session its live mailbox before applying an event.
    pub fn attach_mailbox(&mut self, mailbox: Mailbox) {
        self.clients = mailbox;
    }

    /// Take the live mailbox back, leaving an empty one in the session.
    pub fn detach_mailbox(&mut self) -> Mailbox {
        std::mem::take(&mut self.clients)
    }

    /// Take every message produced so far, leaving the buffer empty.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply a lifecycle event reported by `market_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownMarket`] if the market is not part of
    /// the session, or [`DomainError::UnhandledEvent`] for other event types.
    pub fn receive(&mut self, event_type: &str, market_id: MarketId) -> Result<(), DomainError> {
        tracing::trace!(session = %self.id, event_type, %market_id, "session receive");
        if !self.markets.contains(&market_id) {
            return Err(DomainError::UnknownMarket(market_id));
        }
        match event_type {
            "market_ready_to_start" => {
                self.ready_to_start.insert(market_id);
                if self.phase == SessionPhase::Pending && self.ready_to_start == self.markets {
                    self.start();
                }
                Ok(())
            }
            "market_ready_to_end" => {
                self.ready_to_end.insert(market_id);
                if self.phase == SessionPhase::Running && self.ready_to_end == self.markets {
                    self.end();
                }
                Ok(())
            }
            _ => Err(DomainError::UnhandledEvent {
                entity: "trade_session",
                event_type: event_type.to_owned(),
            }),
        }
    }

    fn start(&mut self) {
        self.phase = SessionPhase::Running;
        let markets: Vec<MarketId> = self.markets.iter().copied().collect();
        for market_id in markets {
            let mut roles = vec![ClientRole::Exchange, ClientRole::NoiseTrader];
            if self.format == SessionFormat::Elo {
                roles.push(ClientRole::Investor);
            }
            for role in roles {
                let name = self.clients.register(market_id, role);
                let message = OutgoingMessage::new(Channel::Session(self.id), "start_client")
                    .with("client", name)
                    .with("market_id", market_id.0);
                self.outbox.push(message);
            }
            self.outbox.push(
                OutgoingMessage::new(Channel::Exchange(market_id), "market_start")
                    .with("market_id", market_id.0),
            );
        }
        self.outbox
            .push(OutgoingMessage::new(Channel::Session(self.id), "session_start"));
    }

    fn end(&mut self) {
        self.phase = SessionPhase::Ended;
        let markets: Vec<MarketId> = self.markets.iter().copied().collect();
        for market_id in markets {
            for name in self.clients.remove_market(market_id) {
                let message = OutgoingMessage::new(Channel::Session(self.id), "stop_client")
                    .with("client", name);
                self.outbox.push(message);
            }
        }
        self.outbox
            .push(OutgoingMessage::new(Channel::Session(self.id), "session_end"));
    }
}
