//! Checkpoint sinks.
//!
//! Handlers hand a [`Checkpoint`] to a [`CheckpointSink`] after a trader
//! commit (or for an investor event) and move on. Submission is synchronous
//! and never blocks; whatever the sink does afterwards cannot fail the
//! dispatch.
//!
//! The production sink is [`ChannelCheckpointSink`], which feeds an unbounded
//! channel drained by [`spawn_checkpoint_writer`] into a JSON-lines file.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tokio::io::AsyncWriteExt as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tradelab_types::Checkpoint;

/// Fire-and-forget receiver of checkpoints.
pub trait CheckpointSink: Send + Sync {
    /// Accept a checkpoint. Must not block and must not fail the caller.
    fn submit(&self, checkpoint: Checkpoint);
}

/// Discards every checkpoint. Used when checkpoints are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCheckpointSink;

impl CheckpointSink for NullCheckpointSink {
    fn submit(&self, _checkpoint: Checkpoint) {}
}

/// Keeps checkpoints in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryCheckpointSink {
    records: Mutex<Vec<Checkpoint>>,
}

impl MemoryCheckpointSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every checkpoint submitted so far, in submission order.
    pub fn records(&self) -> Vec<Checkpoint> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of checkpoints submitted so far.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been submitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointSink for MemoryCheckpointSink {
    fn submit(&self, checkpoint: Checkpoint) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(checkpoint);
    }
}

/// Forwards checkpoints to a background writer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelCheckpointSink {
    tx: mpsc::UnboundedSender<Checkpoint>,
}

impl ChannelCheckpointSink {
    /// Create a sink and the receiving end for the writer task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Checkpoint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CheckpointSink for ChannelCheckpointSink {
    fn submit(&self, checkpoint: Checkpoint) {
        if let Err(e) = self.tx.send(checkpoint) {
            tracing::warn!(error = %e, "checkpoint writer is gone, dropping checkpoint");
        }
    }
}

/// Spawn the task that appends checkpoints to `path` as JSON lines.
///
/// The task ends when every [`ChannelCheckpointSink`] clone has been dropped
/// and the channel is drained. Serialization and I/O failures are logged and
/// the offending checkpoint is skipped.
pub fn spawn_checkpoint_writer(
    mut rx: mpsc::UnboundedReceiver<Checkpoint>,
    path: PathBuf,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot open checkpoint file, checkpoints will be dropped"
                );
                None
            }
        };

        let mut written: u64 = 0;
        while let Some(checkpoint) = rx.recv().await {
            let Some(out) = file.as_mut() else {
                continue;
            };
            let mut line = match serde_json::to_vec(&checkpoint) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, event_id = %checkpoint.event.id, "failed to encode checkpoint");
                    continue;
                }
            };
            line.push(b'\n');
            match out.write_all(&line).await {
                Ok(()) => written = written.saturating_add(1),
                Err(e) => {
                    tracing::warn!(error = %e, event_id = %checkpoint.event.id, "failed to write checkpoint");
                }
            }
        }

        if let Some(mut out) = file {
            if let Err(e) = out.flush().await {
                tracing::warn!(error = %e, "failed to flush checkpoint file");
            }
        }
        tracing::info!(path = %path.display(), written, "checkpoint writer stopped");
        written
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use tradelab_types::{Envelope, Fields, TraderId};

    use super::*;

    fn trader_checkpoint(version: u64) -> Checkpoint {
        Checkpoint::trader(
            TraderId(1),
            version,
            serde_json::json!({"cash": 0}),
            Envelope::new("bbo_change", Fields::new()),
        )
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryCheckpointSink::new();
        sink.submit(trader_checkpoint(1));
        sink.submit(Checkpoint::investor(Envelope::new("order_entered", Fields::new())));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, trader_checkpoint(1).kind);
    }

    #[tokio::test]
    async fn writer_appends_json_lines() {
        let path = std::env::temp_dir().join(format!(
            "tradelab-checkpoints-{}.jsonl",
            tradelab_types::EventId::new()
        ));
        let (sink, rx) = ChannelCheckpointSink::new();
        let writer = spawn_checkpoint_writer(rx, path.clone());

        sink.submit(trader_checkpoint(1));
        sink.submit(trader_checkpoint(2));
        drop(sink);

        assert_eq!(writer.await.unwrap(), 2);
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<Checkpoint> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[1].kind, tradelab_types::CheckpointKind::Trader { version: 2, .. }));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn submit_after_writer_exit_does_not_panic() {
        let (sink, rx) = ChannelCheckpointSink::new();
        drop(rx);
        sink.submit(trader_checkpoint(1));
    }
}
