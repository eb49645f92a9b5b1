//! Adaptive request timeouts.
//!
//! The timeout follows the observed round trip latency: it is the smoothed latency times a
//! coefficient, kept within `[minimum, maximum]`. A request that times out counts as a round
//! trip of the full timeout, so silent peers push the timeout up.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use colored::Colorize;
use priority_queue::PriorityQueue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::message::Op;
use crate::util::meter::Averager;
use crate::zfx_id::{Id, NodeId};

/// Identifies an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub node_id: NodeId,
    pub chain_id: Id,
    pub request_id: u32,
    /// Kind of the request, not of the expected response.
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub initial: Duration,
    pub minimum: Duration,
    pub maximum: Duration,
    pub coefficient: f64,
    pub half_life: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            initial: Duration::from_secs(5),
            minimum: Duration::from_millis(500),
            maximum: Duration::from_secs(10),
            coefficient: 2.0,
            half_life: Duration::from_secs(300),
        }
    }
}

type Callback = Box<dyn FnOnce() + Send>;

struct Pending {
    registered: Instant,
    on_timeout: Callback,
}

struct Inner {
    current: Duration,
    latency: Averager,
    deadlines: PriorityQueue<RequestKey, Reverse<Instant>>,
    pending: HashMap<RequestKey, Pending>,
}

impl Inner {
    fn observe(&mut self, config: &TimeoutConfig, latency: Duration, now: Instant) {
        self.latency.observe(latency.as_secs_f64(), now);
        let timeout = Duration::from_secs_f64((self.latency.read() * config.coefficient).max(0.0));
        self.current = timeout.max(config.minimum).min(config.maximum);
    }
}

pub struct Manager {
    config: TimeoutConfig,
    inner: Mutex<Inner>,
    changed: Notify,
    stopped: CancellationToken,
}

impl Manager {
    pub fn new(config: TimeoutConfig) -> Self {
        let now = Instant::now();
        let initial = config.initial.max(config.minimum).min(config.maximum);
        let latency = Averager::new(initial.as_secs_f64() / config.coefficient.max(f64::EPSILON), config.half_life, now);
        Manager {
            inner: Mutex::new(Inner {
                current: initial,
                latency,
                deadlines: PriorityQueue::new(),
                pending: HashMap::new(),
            }),
            config,
            changed: Notify::new(),
            stopped: CancellationToken::new(),
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).current
    }

    /// Calls `on_timeout` unless `key` is removed within the current timeout. Registering a key
    /// again replaces the earlier registration.
    pub fn put<F>(&self, key: RequestKey, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let deadline = now + inner.current;
            inner.deadlines.push(key, Reverse(deadline));
            inner.pending.insert(key, Pending { registered: now, on_timeout: Box::new(on_timeout) });
        }
        self.changed.notify_one();
    }

    /// The request was answered: forgets it and records its latency. Returns `false` if it
    /// was not outstanding.
    pub fn remove(&self, key: &RequestKey) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.deadlines.remove(key);
        match inner.pending.remove(key) {
            Some(pending) => {
                inner.observe(&self.config, now.saturating_duration_since(pending.registered), now);
                true
            }
            None => false,
        }
    }

    /// Forgets a request without treating it as a round trip.
    pub fn cancel(&self, key: &RequestKey) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.deadlines.remove(key);
        inner.pending.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_expired(&self, now: Instant) -> (Vec<(RequestKey, Callback)>, Option<Instant>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut expired = vec![];
        let next = loop {
            let deadline = match inner.deadlines.peek() {
                Some((_, Reverse(deadline))) => *deadline,
                None => break None,
            };
            if deadline > now {
                break Some(deadline);
            }
            if let Some((key, _)) = inner.deadlines.pop() {
                if let Some(pending) = inner.pending.remove(&key) {
                    let timeout = inner.current;
                    inner.observe(&self.config, timeout, now);
                    expired.push((key, pending.on_timeout));
                }
            }
        };
        (expired, next)
    }

    /// Fires the callbacks of expired requests until `stop` is called.
    pub async fn dispatch(&self) {
        loop {
            let (expired, next) = self.take_expired(Instant::now());
            for (key, on_timeout) in expired {
                debug!("[{}] {:?} {} to {} timed out", "timeout".cyan(), key.op, key.request_id, key.node_id);
                on_timeout();
            }
            let sleep = match next {
                Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)),
                None => tokio::time::sleep(self.config.maximum),
            };
            tokio::select! {
                _ = self.stopped.cancelled() => return,
                _ = self.changed.notified() => {}
                _ = sleep => {}
            }
        }
    }

    pub fn stop(&self) {
        self.stopped.cancel();
    }
}
