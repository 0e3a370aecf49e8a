// ── Inbound message FIFO ──
//
// Shared between the dispatch slot (push, inside `read`) and the proxy
// (pop, from caller code). Bounded; a full queue evicts according to its
// `Overflow` policy and counts what it dropped.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use nsdnet_api::FrameBody;
use tracing::{debug, warn};

use super::{HandleFrame, Handled};
use crate::config::{Overflow, QueuePolicy};

/// A message delivered from another peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client id of the sender.
    pub source: String,
    pub payload: Bytes,
    /// Arrival order on this proxy, starting at 0. Gaps mean evictions.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[derive(Debug)]
pub(crate) struct MessageQueue {
    policy: QueuePolicy,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    next_sequence: u64,
    dropped: u64,
}

impl MessageQueue {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Push at the tail, evicting per policy when full.
    pub(crate) fn push(&self, source: String, payload: Bytes) {
        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let message = Message {
            source,
            payload,
            sequence,
            received_at: Utc::now(),
        };

        if state.messages.len() >= self.policy.capacity {
            state.dropped += 1;
            let evicted = match self.policy.overflow {
                Overflow::DropOldest => {
                    let oldest = state.messages.pop_front();
                    state.messages.push_back(message);
                    oldest.map(|m| m.sequence)
                }
                Overflow::DropNewest => Some(sequence),
            };
            if state.dropped == 1 {
                warn!(
                    capacity = self.policy.capacity,
                    policy = %self.policy.overflow,
                    "message queue full, dropping messages"
                );
            }
            debug!(sequence = ?evicted, dropped = state.dropped, "message evicted");
            return;
        }

        state.messages.push_back(message);
    }

    pub(crate) fn pop(&self) -> Option<Message> {
        self.lock().messages.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the queue consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Appends delivered messages to the proxy's queue.
#[derive(Debug)]
pub struct MessageQueueCell {
    queue: Arc<MessageQueue>,
}

impl MessageQueueCell {
    pub(crate) fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }
}

impl HandleFrame for MessageQueueCell {
    fn handle_frame(&self, body: FrameBody) -> Handled {
        match body {
            FrameBody::Message { source, payload } => {
                self.queue.push(source, payload);
                Handled::Applied
            }
            other => Handled::Declined(other),
        }
    }
}
