//! Records handed to the checkpoint sink.
//!
//! A checkpoint is a best-effort copy of a committed trader transition (or
//! of an investor event, which has no trader state). Checkpoints are written
//! for offline analysis and never feed back into dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::ids::TraderId;

/// What a checkpoint records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointKind {
    /// A committed trader transition.
    Trader {
        /// The trader whose record was committed.
        trader_id: TraderId,
        /// The version the commit produced.
        version: u64,
        /// The serialized post-transition subject state.
        state: serde_json::Value,
    },
    /// An event addressed to the investor.
    Investor,
}

/// A checkpoint together with the event that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The recorded transition.
    #[serde(flatten)]
    pub kind: CheckpointKind,
    /// The envelope as it stood at commit time.
    pub event: Envelope,
    /// When the checkpoint was produced.
    pub recorded_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint of a committed trader transition.
    pub fn trader(
        trader_id: TraderId,
        version: u64,
        state: serde_json::Value,
        event: Envelope,
    ) -> Self {
        Self {
            kind: CheckpointKind::Trader {
                trader_id,
                version,
                state,
            },
            event,
            recorded_at: Utc::now(),
        }
    }

    /// Checkpoint of an investor event.
    pub fn investor(event: Envelope) -> Self {
        Self {
            kind: CheckpointKind::Investor,
            event,
            recorded_at: Utc::now(),
        }
    }
}
