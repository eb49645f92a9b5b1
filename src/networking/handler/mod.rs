//! The per-chain message dispatcher.
//!
//! Three loops feed one chain's engines:
//! * the sync loop runs consensus messages, one at a time, under the engine lock;
//! * the async loop hands application messages to a bounded pool of workers that never take
//!   the engine lock;
//! * the chan loop turns VM notifications, the gossip ticker and fired engine timeouts into
//!   internal messages run under the engine lock.
//!
//! The first engine error stops the chain. Once all three loops have exited the current
//! engine is shut down and the closed signal fires.

mod engines;
mod queue;

pub use engines::EngineManager;
pub use queue::MessageQueue;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument;

use super::message::{InboundMessage, Message};
use super::tracker::ResourceTracker;
use super::{Error, Result};
use crate::engine::{self, common::AppHandler, common::ChainContext};
use crate::util::Latch;
use crate::vm::VmMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub gossip_frequency: Duration,
    /// Application messages handled at the same time.
    pub async_workers: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig { gossip_frequency: Duration::from_secs(10), async_workers: 8 }
    }
}

const LOOPS: usize = 3;

pub struct Handler {
    ctx: Arc<ChainContext>,
    config: HandlerConfig,
    // The engine lock
    engines: Mutex<Option<EngineManager>>,
    app: Arc<dyn AppHandler>,
    tracker: Arc<ResourceTracker>,

    sync_queue: MessageQueue,
    async_queue: MessageQueue,
    vm_messages: Mutex<Option<mpsc::UnboundedReceiver<VmMessage>>>,
    timeouts: Mutex<Option<mpsc::UnboundedReceiver<Duration>>>,

    started: AtomicBool,
    stopping: CancellationToken,
    running: AtomicUsize,
    expired: AtomicU64,
    closed: Latch,
}

impl Handler {
    /// `vm_messages` are the notifications of the chain's VM and `timeouts` the receiving end
    /// of the chain context's timeout requests.
    pub fn new(
        ctx: Arc<ChainContext>,
        config: HandlerConfig,
        app: Arc<dyn AppHandler>,
        tracker: Arc<ResourceTracker>,
        vm_messages: mpsc::UnboundedReceiver<VmMessage>,
        timeouts: mpsc::UnboundedReceiver<Duration>,
    ) -> Arc<Self> {
        Arc::new(Handler {
            ctx,
            config,
            engines: Mutex::new(None),
            app,
            tracker,
            sync_queue: MessageQueue::new(),
            async_queue: MessageQueue::new(),
            vm_messages: Mutex::new(Some(vm_messages)),
            timeouts: Mutex::new(Some(timeouts)),
            started: AtomicBool::new(false),
            stopping: CancellationToken::new(),
            running: AtomicUsize::new(0),
            expired: AtomicU64::new(0),
            closed: Latch::new(),
        })
    }

    pub fn context(&self) -> &Arc<ChainContext> {
        &self.ctx
    }

    pub fn set_engines(&self, engines: EngineManager) {
        *self.engines.lock().unwrap_or_else(PoisonError::into_inner) = Some(engines);
    }

    /// Starts the engines and the dispatcher loops.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(Error::AlreadyStarted);
        }
        let vm_messages = self.vm_messages.lock().unwrap_or_else(PoisonError::into_inner).take();
        let timeouts = self.timeouts.lock().unwrap_or_else(PoisonError::into_inner).take();
        let (vm_messages, timeouts) = match (vm_messages, timeouts) {
            (Some(vm_messages), Some(timeouts)) => (vm_messages, timeouts),
            _ => return Err(Error::AlreadyStarted),
        };
        {
            let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
            let engines = engines.as_mut().ok_or(Error::NoEngines)?;
            if let Err(err) = engines.start() {
                error!("[{}] chain {} failed to start: {}", "handler".magenta(), self.ctx.chain_id, err);
                self.closed.fire();
                return Err(err.into());
            }
        }

        self.running.store(LOOPS, Ordering::Release);
        self.started.store(true, Ordering::Release);
        let span = info_span!("chain", id = %self.ctx.chain_id);
        tokio::spawn(self.clone().dispatch_sync().instrument(span.clone()));
        tokio::spawn(self.clone().dispatch_async().instrument(span.clone()));
        tokio::spawn(self.clone().dispatch_chan(vm_messages, timeouts).instrument(span));
        info!("[{}] chain {} started", "handler".magenta(), self.ctx.chain_id);
        Ok(())
    }

    /// Queues a message for the chain's engines.
    pub fn push(&self, msg: InboundMessage) {
        let op = msg.op();
        let queued = if op.is_async() { self.async_queue.push(msg) } else { self.sync_queue.push(msg) };
        if !queued {
            debug!("[{}] chain {} is stopping, dropping {:?}", "handler".magenta(), self.ctx.chain_id, op);
        }
    }

    /// Messages waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.sync_queue.len() + self.async_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages dropped because nobody was waiting for them anymore.
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if self.stopping.is_cancelled() {
            return;
        }
        info!("[{}] stopping chain {}", "handler".magenta(), self.ctx.chain_id);
        self.stopping.cancel();
        self.sync_queue.shutdown();
        self.async_queue.shutdown();
        // Taking the engine lock here could wait on a long bootstrap step
        self.ctx.halt();
        if !self.started.load(Ordering::Acquire) {
            self.closed.fire();
        }
    }

    pub fn stop_with_error(&self, err: engine::Error) {
        error!("[{}] chain {} failed: {}", "handler".magenta(), self.ctx.chain_id, err);
        self.stop();
    }

    /// Resolves once the chain is shut down.
    pub async fn closed(&self) {
        self.closed.wait().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }

    fn drop_expired(&self, msg: &InboundMessage) -> bool {
        if !msg.is_expired(Instant::now()) {
            return false;
        }
        self.expired.fetch_add(1, Ordering::AcqRel);
        debug!("[{}] dropping expired {:?} from {}", "handler".magenta(), msg.op(), msg.node_id);
        true
    }

    fn handle_sync(&self, msg: InboundMessage) -> engine::Result<()> {
        let (node_id, op) = (msg.node_id, msg.op());
        let tracked = !op.is_internal();
        let start = Instant::now();
        if tracked {
            self.tracker.start_processing(node_id, start);
        }
        let result = {
            let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
            match engines.as_mut() {
                Some(engines) => engines.dispatch(msg),
                None => Ok(()),
            }
        };
        let end = Instant::now();
        if tracked {
            self.tracker.stop_processing(node_id, end);
        }
        debug!("[{}] {:?} from {} took {:?}", "handler".magenta(), op, node_id, end - start);
        result
    }

    fn handle_async(&self, msg: InboundMessage) -> engine::Result<()> {
        let node_id = msg.node_id;
        match msg.message {
            Message::AppRequest { request_id, bytes } => {
                let deadline = msg.expiration.unwrap_or_else(Instant::now);
                self.app.app_request(node_id, request_id, deadline, bytes)
            }
            Message::AppResponse { request_id, bytes } => self.app.app_response(node_id, request_id, bytes),
            Message::AppRequestFailed { request_id } => self.app.app_request_failed(node_id, request_id),
            Message::AppGossip { bytes } => self.app.app_gossip(node_id, bytes),
            other => {
                debug!("[{}] {:?} is not an application message", "handler".magenta(), other.op());
                Ok(())
            }
        }
    }

    async fn dispatch_sync(self: Arc<Self>) {
        while let Some(msg) = self.sync_queue.pop().await {
            if self.drop_expired(&msg) {
                continue;
            }
            if let Err(err) = self.handle_sync(msg) {
                self.stop_with_error(err);
            }
        }
        self.loop_exited();
    }

    async fn dispatch_async(self: Arc<Self>) {
        let workers = self.config.async_workers.max(1);
        let pool = Arc::new(Semaphore::new(workers));
        while let Some(msg) = self.async_queue.pop().await {
            if self.drop_expired(&msg) {
                continue;
            }
            let permit = match pool.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let handler = self.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = handler.handle_async(msg) {
                        handler.stop_with_error(err);
                    }
                    drop(permit);
                }
                .in_current_span(),
            );
        }
        // Wait for the workers still running
        let _ = pool.acquire_many(workers as u32).await;
        self.loop_exited();
    }

    async fn dispatch_chan(
        self: Arc<Self>,
        mut vm_messages: mpsc::UnboundedReceiver<VmMessage>,
        mut timeouts: mpsc::UnboundedReceiver<Duration>,
    ) {
        let mut gossip = tokio::time::interval(self.config.gossip_frequency);
        // The first tick completes immediately
        gossip.tick().await;
        let (fired_tx, mut fired) = mpsc::unbounded_channel();
        loop {
            let message = tokio::select! {
                _ = self.stopping.cancelled() => break,
                Some(vm_message) = vm_messages.recv() => Message::Notify(vm_message),
                _ = gossip.tick() => Message::GossipRequest,
                Some(after) = timeouts.recv() => {
                    let fired_tx = fired_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = fired_tx.send(());
                    });
                    continue;
                }
                Some(()) = fired.recv() => Message::Timeout,
            };
            let msg = InboundMessage::new(self.ctx.node_id, self.ctx.chain_id, message);
            if let Err(err) = self.handle_sync(msg) {
                self.stop_with_error(err);
            }
        }
        self.loop_exited();
    }

    fn loop_exited(&self) {
        if self.running.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        {
            let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(engines) = engines.as_mut() {
                if let Err(err) = engines.shutdown() {
                    error!("[{}] chain {} failed to shut down: {}", "handler".magenta(), self.ctx.chain_id, err);
                }
            }
        }
        info!("[{}] chain {} closed", "handler".magenta(), self.ctx.chain_id);
        self.closed.fire();
    }
}
