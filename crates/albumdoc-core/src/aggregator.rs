//! Album (media group) aggregation
//!
//! Clients send an album as a burst of independent messages that share a
//! group id, with no marker on the last one. The aggregator buffers grouped
//! messages per group id and infers completion from silence: once the group's
//! deadline passes without being extended, the buffered messages are handed to
//! the [`BatchHandler`] as a single [`Batch`]. Ungrouped messages bypass the
//! buffer and are handed over immediately as a batch of one.
//!
//! Per group id the lifecycle is `ABSENT -> BUFFERING -> ABSENT`: the entry is
//! created by the first message, removed atomically when the deadline passes
//! and only then passed downstream, so a failing handler can never leave a
//! stale entry behind for a reused group id.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// When a buffered group is considered complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPolicy {
    /// Deadline is fixed at first arrival plus the quiescence latency.
    /// Slow albums that outlast the window are split into several batches.
    #[default]
    ArmOnce,
    /// Every arrival pushes the deadline to that arrival plus the latency
    ResetOnArrival,
}

/// A single message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent<M> {
    /// Sender (user) id
    pub sender_id: i64,
    /// Conversation the reply should go to
    pub chat_id: i64,
    /// Media group id, if the message is part of an album
    pub group_id: Option<String>,
    /// Transport-specific content
    pub payload: M,
}

impl<M> InboundEvent<M> {
    /// Event that is not part of any album
    pub const fn single(sender_id: i64, chat_id: i64, payload: M) -> Self {
        Self {
            sender_id,
            chat_id,
            group_id: None,
            payload,
        }
    }

    /// Event that belongs to the album `group_id`
    pub fn grouped(sender_id: i64, chat_id: i64, group_id: impl Into<String>, payload: M) -> Self {
        Self {
            sender_id,
            chat_id,
            group_id: Some(group_id.into()),
            payload,
        }
    }
}

/// One or more messages presented to downstream logic as a single unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<M> {
    /// Sender of the first message
    pub sender_id: i64,
    /// Chat of the first message
    pub chat_id: i64,
    /// Group id shared by the items, `None` for a single message
    pub group_id: Option<String>,
    /// Payloads in arrival order, never empty
    pub items: Vec<M>,
}

impl<M> Batch<M> {
    fn single(event: InboundEvent<M>) -> Self {
        Self {
            sender_id: event.sender_id,
            chat_id: event.chat_id,
            group_id: None,
            items: vec![event.payload],
        }
    }

    /// Number of items in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false` for batches produced by the aggregator
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Buffered album awaiting its deadline
#[derive(Debug)]
struct PendingGroup<M> {
    sender_id: i64,
    chat_id: i64,
    first_seen: Instant,
    last_seen: Instant,
    items: Vec<M>,
}

impl<M> PendingGroup<M> {
    fn new(event: InboundEvent<M>) -> Self {
        let now = Instant::now();
        Self {
            sender_id: event.sender_id,
            chat_id: event.chat_id,
            first_seen: now,
            last_seen: now,
            items: vec![event.payload],
        }
    }

    fn push(&mut self, payload: M) {
        self.last_seen = Instant::now();
        self.items.push(payload);
    }

    fn deadline(&self, policy: TimerPolicy, quiescence: Duration) -> Instant {
        match policy {
            TimerPolicy::ArmOnce => self.first_seen + quiescence,
            TimerPolicy::ResetOnArrival => self.last_seen + quiescence,
        }
    }

    fn into_batch(self, group_id: String) -> Batch<M> {
        Batch {
            sender_id: self.sender_id,
            chat_id: self.chat_id,
            group_id: Some(group_id),
            items: self.items,
        }
    }
}

/// Downstream consumer of aggregated batches
#[async_trait]
pub trait BatchHandler<M>: Send + Sync {
    /// Handle one batch. Called exactly once per single message or album.
    async fn handle(&self, batch: Batch<M>) -> anyhow::Result<()>;
}

/// What happened to a submitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the handler immediately as a batch of one
    Emitted,
    /// Opened a new album; it will be emitted once its deadline passes
    Buffered,
    /// Appended to an album that is already buffering
    Appended,
}

struct Inner<M> {
    pending: DashMap<String, PendingGroup<M>>,
    quiescence: Duration,
    policy: TimerPolicy,
    handler: Arc<dyn BatchHandler<M>>,
    shutdown: CancellationToken,
}

/// Buffers grouped messages and emits one batch per album
pub struct AlbumAggregator<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for AlbumAggregator<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + Sync + 'static> AlbumAggregator<M> {
    /// Create an aggregator that hands batches to `handler`
    #[must_use]
    pub fn new(
        quiescence: Duration,
        policy: TimerPolicy,
        handler: Arc<dyn BatchHandler<M>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                quiescence,
                policy,
                handler,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Submit one inbound message.
    ///
    /// Ungrouped messages are handled inline. Grouped messages only touch the
    /// buffer; the first one of an album arms a deferred task, so the caller
    /// is never suspended for the quiescence window.
    ///
    /// # Errors
    ///
    /// Returns the handler's error for ungrouped messages. Errors for albums
    /// surface in the deferred task and are logged there.
    pub async fn submit(&self, event: InboundEvent<M>) -> anyhow::Result<Submission> {
        let Some(group_id) = event.group_id.clone() else {
            self.inner.handler.handle(Batch::single(event)).await?;
            return Ok(Submission::Emitted);
        };

        let opened = match self.inner.pending.entry(group_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(event.payload);
                debug!(group_id = %group_id, size = entry.get().items.len(), "Album grew");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingGroup::new(event));
                debug!(group_id = %group_id, "Album opened");
                true
            }
        };

        if !opened {
            return Ok(Submission::Appended);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Some(batch) = inner.await_quiescence(&group_id).await else {
                return;
            };
            let size = batch.len();
            if let Err(e) = inner.handler.handle(batch).await {
                error!(group_id = %group_id, size, "Album handler failed: {e:#}");
            }
        });
        Ok(Submission::Buffered)
    }

    /// Number of albums currently buffering
    #[must_use]
    pub fn pending_groups(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop all armed timers. Buffered albums are discarded, not emitted.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl<M> Inner<M> {
    /// Wait for the group's deadline and take it out of the table.
    ///
    /// Returns `None` if the aggregator shut down first.
    async fn await_quiescence(&self, group_id: &str) -> Option<Batch<M>> {
        loop {
            let deadline = self
                .pending
                .get(group_id)?
                .deadline(self.policy, self.quiescence);

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    if let Some((_, group)) = self.pending.remove(group_id) {
                        let size = group.items.len();
                        warn!(group_id, size, "Discarding buffered album on shutdown");
                    }
                    return None;
                }
                () = tokio::time::sleep_until(deadline) => {}
            }

            // The deadline may have moved while sleeping (ResetOnArrival)
            let (policy, quiescence) = (self.policy, self.quiescence);
            if let Some((group_id, group)) = self.pending.remove_if(group_id, |_, group| {
                group.deadline(policy, quiescence) <= Instant::now()
            }) {
                debug!(group_id = %group_id, size = group.items.len(), "Album complete");
                return Some(group.into_batch(group_id));
            }
        }
    }
}
