//! Block-at-a-time driver for the notification stream.
//!
//! The emitter writes every message of a block, then `COMMIT`. The driver
//! buffers messages until the marker and applies the whole block in one SQL
//! transaction that also advances `tracking.last_commit_height`, so a crash
//! leaves the mirror at a block boundary.
//!
//! Replaying a stream is safe: a `NEW_BLOCK` at or below the tracked height
//! marks its block as already applied, and everything up to its `COMMIT` is
//! skipped.

use crate::notification::{decode_line, Message};
use crate::{Dispatcher, FlushResult, MessageKind, Notification};
use mirror_database::queries;
use rusqlite::Connection;
use serde::Serialize;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Counters for one run over a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub blocks_committed: usize,
    pub blocks_skipped: usize,
    pub messages_applied: usize,
    /// Messages never persisted: partial blocks cut short by a repeated
    /// `NEW_BLOCK`, and whatever followed the last `COMMIT`.
    pub discarded: usize,
    pub last_commit_height: Option<i64>,
}

/// A complete block, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub height: i64,
    pub messages: Vec<Notification>,
}

/// What feeding one message produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The message was buffered or dropped; nothing to do yet.
    Pending,
    /// A `COMMIT` closed a block that must be applied.
    Ready(Block),
    /// A `COMMIT` closed a block that was already applied.
    Skipped { height: i64 },
}

/// Groups decoded messages into blocks and decides which ones to skip.
///
/// Holds no connection, so the same logic serves the synchronous
/// [`Flusher::run`] and the async binary loop.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    last_commit_height: Option<i64>,
    pending: Vec<Notification>,
    skipping: bool,
    dropped: usize,
}

impl BlockAssembler {
    /// Start from the height the store last committed.
    pub fn new(last_commit_height: Option<i64>) -> Self {
        Self {
            last_commit_height,
            pending: Vec::new(),
            skipping: false,
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: Message) -> Step {
        match message {
            Message::Commit { height } => {
                if std::mem::take(&mut self.skipping) {
                    debug!(height, "Skipped already committed block");
                    return Step::Skipped { height };
                }
                if self.last_commit_height.is_some_and(|last| height <= last) {
                    warn!(
                        height,
                        last_commit_height = self.last_commit_height,
                        messages = self.pending.len(),
                        "COMMIT at or below tracked height; block skipped"
                    );
                    self.pending.clear();
                    return Step::Skipped { height };
                }
                Step::Ready(Block {
                    height,
                    messages: std::mem::take(&mut self.pending),
                })
            }
            Message::Notify(notification) => {
                if self.skipping {
                    return Step::Pending;
                }
                if notification.kind == MessageKind::NewBlock {
                    if self.already_committed(&notification) {
                        self.skipping = true;
                        self.pending.clear();
                        return Step::Pending;
                    }
                    self.drop_partial_block(&notification);
                }
                self.pending.push(notification);
                Step::Pending
            }
        }
    }

    /// A `NEW_BLOCK` while another block is still open means the open one
    /// was cut short upstream. Everything from its `NEW_BLOCK` on is dropped;
    /// messages buffered before it stay.
    fn drop_partial_block(&mut self, next: &Notification) {
        let Some(start) = self
            .pending
            .iter()
            .position(|n| n.kind == MessageKind::NewBlock)
        else {
            return;
        };

        let stale = self.pending.split_off(start);
        warn!(
            stale_height = stale[0].height(),
            next_height = next.height(),
            dropped = stale.len(),
            "NEW_BLOCK inside an open block; dropping partial block"
        );
        self.dropped += stale.len();
    }

    /// Messages dropped from partial blocks so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Record that the block at `height` is now durable.
    pub fn mark_committed(&mut self, height: i64) {
        self.last_commit_height = Some(height);
    }

    pub fn last_commit_height(&self) -> Option<i64> {
        self.last_commit_height
    }

    /// Messages buffered since the last `COMMIT`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// End of input: hand back whatever never reached a `COMMIT`.
    pub fn finish(self) -> Vec<Notification> {
        self.pending
    }

    fn already_committed(&self, block: &Notification) -> bool {
        match (block.height(), self.last_commit_height) {
            (Some(height), Some(last)) => height <= last,
            _ => false,
        }
    }
}

/// Applies blocks of notifications through a [`Dispatcher`].
pub struct Flusher {
    dispatcher: Dispatcher,
}

impl Flusher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Apply one block and record `commit_height`, all in one transaction.
    ///
    /// On any error the transaction is rolled back and the error returned.
    pub fn apply_block(
        &self,
        conn: &mut Connection,
        messages: &[Notification],
        commit_height: i64,
    ) -> FlushResult<usize> {
        let tx = conn.transaction()?;

        for (index, notification) in messages.iter().enumerate() {
            if let Err(e) = self.dispatcher.dispatch(&tx, notification.clone()) {
                warn!(
                    height = commit_height,
                    index,
                    kind = %notification.kind,
                    error = %e,
                    "Block rolled back"
                );
                return Err(e);
            }
        }

        queries::record_commit(&tx, commit_height)?;
        tx.commit()?;

        info!(
            height = commit_height,
            messages = messages.len(),
            "Committed block"
        );
        Ok(messages.len())
    }

    /// Drive a whole stream, committing at every `COMMIT`.
    ///
    /// Stops at the first error; blocks committed before it stay committed.
    pub fn run<R: BufRead>(&self, conn: &mut Connection, reader: R) -> FlushResult<FlushSummary> {
        let mut assembler = BlockAssembler::new(queries::last_commit_height(conn)?);
        let mut summary = FlushSummary {
            last_commit_height: assembler.last_commit_height(),
            ..Default::default()
        };

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let Some(message) = decode_line(index + 1, &line)? else {
                continue;
            };

            match assembler.push(message) {
                Step::Pending => {}
                Step::Skipped { .. } => summary.blocks_skipped += 1,
                Step::Ready(block) => {
                    summary.messages_applied +=
                        self.apply_block(conn, &block.messages, block.height)?;
                    summary.blocks_committed += 1;
                    summary.last_commit_height = Some(block.height);
                    assembler.mark_committed(block.height);
                }
            }
        }

        let dropped = assembler.dropped();
        let trailing = assembler.finish().len();
        summary.discarded = dropped + trailing;
        if trailing > 0 {
            warn!(
                discarded = trailing,
                "Input ended inside a block; trailing messages not applied"
            );
        }

        Ok(summary)
    }
}
