use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use crate::networking::message::InboundMessage;
use crate::zfx_id::NodeId;

struct Inner {
    messages: VecDeque<InboundMessage>,
    per_node: HashMap<NodeId, usize>,
    closed: bool,
}

/// FIFO of messages waiting for a dispatcher, with a count of each node's messages.
///
/// A queue has a single consumer: the dispatcher loop calling `pop`.
pub struct MessageQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

impl Default for MessageQueue {
    fn default() -> Self {
        MessageQueue {
            inner: Mutex::new(Inner { messages: VecDeque::new(), per_node: HashMap::new(), closed: false }),
            available: Notify::new(),
        }
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, dropping the message, once the queue is shut down.
    pub fn push(&self, msg: InboundMessage) -> bool {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.closed {
                return false;
            }
            *inner.per_node.entry(msg.node_id).or_insert(0) += 1;
            inner.messages.push_back(msg);
        }
        self.available.notify_one();
        true
    }

    /// Waits for the next message. Returns `None` once the queue is shut down.
    pub async fn pop(&self) -> Option<InboundMessage> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.closed {
                    return None;
                }
                if let Some(msg) = inner.messages.pop_front() {
                    let emptied = match inner.per_node.get_mut(&msg.node_id) {
                        Some(count) => {
                            *count -= 1;
                            *count == 0
                        }
                        None => false,
                    };
                    if emptied {
                        inner.per_node.remove(&msg.node_id);
                    }
                    return Some(msg);
                }
            }
            self.available.notified().await;
        }
    }

    /// Wakes the consumer and discards whatever is still queued.
    pub fn shutdown(&self) {
        let discarded = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.closed = true;
            inner.per_node.clear();
            std::mem::take(&mut inner.messages)
        };
        drop(discarded);
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_len(&self, node_id: &NodeId) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).per_node.get(node_id).cloned().unwrap_or(0)
    }
}
