//! JSON-lines event driver.
//!
//! Each input line is a [`Request`] naming a handler category and carrying
//! an envelope. Every request is dispatched on its own task, so events for
//! different entities proceed concurrently and events for the same entity
//! race through the optimistic retry loop. One [`Reply`] line is written per
//! request, in completion order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::mpsc;
use tradelab_dispatch::Dispatcher;
use tradelab_store::{RecipientResolver, VersionedStore};
use tradelab_types::{Envelope, EventId, Fields, OutgoingMessage};

use crate::error::ServerError;

/// One inbound event.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Handler category tag, e.g. `trader` or `marketwide_events`.
    pub category: String,
    /// The event itself.
    pub envelope: Envelope,
}

/// One outbound line.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// The event was applied.
    Ok {
        /// Correlation id of the envelope.
        event_id: EventId,
        /// Event type tag.
        event_type: String,
        /// Attachments accumulated by the handlers.
        attachments: Fields,
        /// Messages to deliver.
        outgoing_messages: Vec<OutgoingMessage>,
    },
    /// The handler failed; nothing was committed for the failing entity.
    Error {
        /// Correlation id of the envelope.
        event_id: EventId,
        /// Category the event was sent to.
        category: String,
        /// Rendered error.
        error: String,
    },
    /// The line could not be decoded as a request.
    Rejected {
        /// 1-based input line number.
        line: u64,
        /// Rendered decode error.
        error: String,
    },
}

impl Reply {
    const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Totals for one run of [`serve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Replies with status `ok`.
    pub applied: u64,
    /// Replies with status `error` or `rejected`.
    pub failed: u64,
}

/// Read requests from `input` until EOF, dispatch them concurrently and
/// write one reply per request to `output`.
///
/// Returns once every dispatched request has been answered.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if reading or writing fails, or
/// [`ServerError::Encode`] if a reply cannot be encoded.
pub async fn serve<S, R, W>(
    dispatcher: Arc<Dispatcher<S>>,
    input: R,
    mut output: W,
) -> Result<ServeSummary, ServerError>
where
    S: VersionedStore + RecipientResolver + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Reply>();

    let reader = async move {
        let mut lines = input.lines();
        let mut line_no: u64 = 0;
        while let Some(line) = lines.next_line().await? {
            line_no = line_no.saturating_add(1);
            if line.trim().is_empty() {
                continue;
            }
            let request = match serde_json::from_str::<Request>(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "undecodable request");
                    send(&tx, Reply::Rejected {
                        line: line_no,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let dispatcher = Arc::clone(&dispatcher);
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = apply(&dispatcher, request).await;
                send(&tx, reply);
            });
        }
        tracing::debug!(lines = line_no, "input closed");
        Ok::<(), ServerError>(())
    };

    let writer = async {
        let mut summary = ServeSummary::default();
        while let Some(reply) = rx.recv().await {
            if reply.is_ok() {
                summary.applied = summary.applied.saturating_add(1);
            } else {
                summary.failed = summary.failed.saturating_add(1);
            }
            let mut line = serde_json::to_vec(&reply)?;
            line.push(b'\n');
            output.write_all(&line).await?;
        }
        output.flush().await?;
        Ok::<ServeSummary, ServerError>(summary)
    };

    let (read, written) = tokio::join!(reader, writer);
    read?;
    written
}

async fn apply<S>(dispatcher: &Dispatcher<S>, request: Request) -> Reply
where
    S: VersionedStore + RecipientResolver,
{
    let Request { category, envelope } = request;
    let event_id = envelope.id;
    match dispatcher.dispatch(&category, envelope).await {
        Ok(envelope) => Reply::Ok {
            event_id,
            event_type: envelope.event_type,
            attachments: envelope.attachments,
            outgoing_messages: envelope.outgoing_messages,
        },
        Err(e) => Reply::Error {
            event_id,
            category,
            error: e.to_string(),
        },
    }
}

fn send(tx: &mpsc::UnboundedSender<Reply>, reply: Reply) {
    if tx.send(reply).is_err() {
        tracing::warn!("output closed, dropping reply");
    }
}
