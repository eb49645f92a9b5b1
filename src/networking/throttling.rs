//! Inbound message throttling.
//!
//! Both throttlers block the reading side of a peer connection, so a node that floods us only
//! slows down its own messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::tracker::{ResourceTracker, Targeter};
use crate::zfx_id::NodeId;

/// Holds back a node while its processing usage is above its target.
pub struct SystemThrottler {
    max_recheck_delay: Duration,
    tracker: Arc<ResourceTracker>,
    targeter: Arc<Targeter>,
}

impl SystemThrottler {
    pub fn new(max_recheck_delay: Duration, tracker: Arc<ResourceTracker>, targeter: Arc<Targeter>) -> Self {
        SystemThrottler { max_recheck_delay, tracker, targeter }
    }

    /// Returns once `node_id` is at or below its target usage, or as soon as `token` is
    /// cancelled.
    pub async fn acquire(&self, token: &CancellationToken, node_id: &NodeId) {
        loop {
            let now = Instant::now();
            let target = self.targeter.target_usage(node_id, now);
            if self.tracker.usage(node_id, now) <= target {
                return;
            }
            let wait = self
                .tracker
                .time_until_usage(node_id, now, target)
                .map_or(self.max_recheck_delay, |d| d.min(self.max_recheck_delay));
            debug!("[{}] holding back {} for {:?}", "throttler".cyan(), node_id, wait);
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

/// Caps the number of messages of each node that have been read but not yet processed.
#[derive(Debug)]
pub struct BufferThrottler {
    max_processing: usize,
    processing: Mutex<HashMap<NodeId, usize>>,
    released: Notify,
}

impl BufferThrottler {
    pub fn new(max_processing: usize) -> Arc<Self> {
        Arc::new(BufferThrottler { max_processing, processing: Mutex::new(HashMap::new()), released: Notify::new() })
    }

    /// Waits for a free slot for `node_id`. Returns `None` if `token` is cancelled first.
    pub async fn acquire(self: &Arc<Self>, token: &CancellationToken, node_id: NodeId) -> Option<BufferPermit> {
        loop {
            // Registered before checking so a release in between is not missed
            let released = self.released.notified();
            {
                let mut processing = self.processing.lock().unwrap_or_else(PoisonError::into_inner);
                let count = processing.entry(node_id).or_insert(0);
                if *count < self.max_processing {
                    *count += 1;
                    return Some(BufferPermit { throttler: self.clone(), node_id });
                }
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = released => {}
            }
        }
    }

    pub fn release(&self, node_id: &NodeId) {
        let mut processing = self.processing.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = processing.get_mut(node_id) {
            *count -= 1;
            if *count == 0 {
                processing.remove(node_id);
            }
        }
        drop(processing);
        self.released.notify_waiters();
    }

    pub fn processing(&self, node_id: &NodeId) -> usize {
        self.processing.lock().unwrap_or_else(PoisonError::into_inner).get(node_id).cloned().unwrap_or(0)
    }
}

/// A slot in a `BufferThrottler`, released on drop.
#[derive(Debug)]
pub struct BufferPermit {
    throttler: Arc<BufferThrottler>,
    node_id: NodeId,
}

impl Drop for BufferPermit {
    fn drop(&mut self) {
        self.throttler.release(&self.node_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::validators;
    use crate::zfx_id::Id;
    use crate::networking::tracker::TargeterConfig;

    #[actix_rt::test]
    async fn test_buffer_throttler() {
        let throttler = BufferThrottler::new(2);
        let token = CancellationToken::new();
        let node = Id::one();
        let first = throttler.acquire(&token, node).await.unwrap();
        let _second = throttler.acquire(&token, node).await.unwrap();
        assert_eq!(throttler.processing(&node), 2);
        // Other nodes are unaffected
        let _other = throttler.acquire(&token, Id::two()).await.unwrap();

        let waiter = {
            let (throttler, token) = (throttler.clone(), token.clone());
            tokio::spawn(async move { throttler.acquire(&token, node).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap());
        assert_eq!(throttler.processing(&node), 2);
    }

    #[actix_rt::test]
    async fn test_buffer_throttler_cancellation() {
        let throttler = BufferThrottler::new(1);
        let token = CancellationToken::new();
        let _held = throttler.acquire(&token, Id::one()).await.unwrap();
        token.cancel();
        assert!(throttler.acquire(&token, Id::one()).await.is_none());
    }

    #[actix_rt::test]
    async fn test_system_throttler_returns_on_cancel() {
        let tracker = Arc::new(ResourceTracker::new(Duration::from_millis(10)));
        let config = TargeterConfig { validator_alloc: 0.0, max_non_validator_usage: 0.0, max_non_validator_node_usage: 0.0 };
        let targeter = Arc::new(Targeter::new(config, Arc::new(validators::Manager::new()), Id::zero(), tracker.clone()));
        let throttler = SystemThrottler::new(Duration::from_millis(10), tracker.clone(), targeter);

        let node = Id::one();
        let token = CancellationToken::new();
        // Idle nodes pass straight through
        throttler.acquire(&token, &node).await;

        tracker.start_processing(node, Instant::now());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), throttler.acquire(&token, &node)).await;
        assert!(blocked.is_err());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), throttler.acquire(&token, &node)).await.unwrap();
    }
}
