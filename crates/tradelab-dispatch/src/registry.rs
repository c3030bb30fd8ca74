//! Process-wide registry of session mailboxes.
//!
//! Mailboxes hold live connection bookkeeping and never go to the store. The
//! registry guards them with one async mutex. The session handler takes the
//! guard for its whole run, so at most one session event is applied at a
//! time across the process.

use std::collections::BTreeMap;

use tokio::sync::{Mutex, MutexGuard};
use tradelab_market::Mailbox;
use tradelab_types::SubsessionId;

/// Owner of every session's [`Mailbox`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    mailboxes: Mutex<BTreeMap<SubsessionId, Mailbox>>,
}

/// Exclusive access to the registry, held for the duration of one session
/// event.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    mailboxes: MutexGuard<'a, BTreeMap<SubsessionId, Mailbox>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            mailboxes: self.mailboxes.lock().await,
        }
    }

    /// A copy of the mailbox for `id`, if one was ever checked in.
    pub async fn mailbox(&self, id: SubsessionId) -> Option<Mailbox> {
        self.mailboxes.lock().await.get(&id).cloned()
    }
}

impl SessionGuard<'_> {
    /// Take the mailbox for `id` out of the registry, creating an empty one
    /// on first use.
    pub fn check_out(&mut self, id: SubsessionId) -> Mailbox {
        self.mailboxes.remove(&id).unwrap_or_default()
    }

    /// Put a mailbox back.
    pub fn check_in(&mut self, id: SubsessionId, mailbox: Mailbox) {
        self.mailboxes.insert(id, mailbox);
    }
}
