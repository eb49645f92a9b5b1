use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, info, warn};

use super::handler::Handler;
use super::message::{InboundMessage, Message, Op};
use super::timeout::{self, RequestKey};
use crate::zfx_id::{Id, NodeId};

pub use crate::engine::common::GOSSIP_REQUEST_ID;

/// Routes inbound messages to the handlers of the chains they are for.
///
/// Responses are only forwarded if the matching request is outstanding: a late or unrequested
/// response is dropped. A request that is not answered in time turns into its failure message,
/// so every request registered here gets exactly one answer.
pub struct ChainRouter {
    node_id: NodeId,
    timeouts: Arc<timeout::Manager>,
    chains: RwLock<HashMap<Id, Arc<Handler>>>,
    peers: Mutex<HashSet<NodeId>>,
    // (node, chain, request id) -> kind of request
    outstanding: Mutex<HashMap<(NodeId, Id, u32), Op>>,
}

impl ChainRouter {
    pub fn new(node_id: NodeId, timeouts: Arc<timeout::Manager>) -> Arc<Self> {
        Arc::new(ChainRouter {
            node_id,
            timeouts,
            chains: RwLock::new(HashMap::new()),
            peers: Mutex::new(HashSet::new()),
            outstanding: Mutex::new(HashMap::new()),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn timeouts(&self) -> &Arc<timeout::Manager> {
        &self.timeouts
    }

    /// Adds a chain. The chain learns about this node and every connected peer.
    pub fn add_chain(&self, handler: Arc<Handler>) {
        let chain_id = handler.context().chain_id;
        handler.push(InboundMessage::new(self.node_id, chain_id, Message::Connected));
        for peer in self.peers.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            handler.push(InboundMessage::new(*peer, chain_id, Message::Connected));
        }
        info!("[{}] added chain {}", "router".cyan(), chain_id);
        self.chains.write().unwrap_or_else(PoisonError::into_inner).insert(chain_id, handler);
    }

    pub fn chain(&self, chain_id: &Id) -> Option<Arc<Handler>> {
        self.chains.read().unwrap_or_else(PoisonError::into_inner).get(chain_id).cloned()
    }

    /// Expects an answer from `node_id` to the request `request_id` of kind `op`.
    pub fn register_request(self: &Arc<Self>, node_id: NodeId, chain_id: Id, request_id: u32, op: Op) {
        if op.failure().is_none() {
            warn!("[{}] {:?} is not a request", "router".cyan(), op);
            return;
        }
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((node_id, chain_id, request_id), op);
        let key = RequestKey { node_id, chain_id, request_id, op };
        let router = Arc::downgrade(self);
        self.timeouts.put(key, move || {
            if let Some(router) = router.upgrade() {
                router.request_timed_out(key);
            }
        });
    }

    fn request_timed_out(&self, key: RequestKey) {
        {
            let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
            match outstanding.get(&(key.node_id, key.chain_id, key.request_id)) {
                Some(op) if *op == key.op => {
                    outstanding.remove(&(key.node_id, key.chain_id, key.request_id));
                }
                // Already answered
                _ => return,
            }
        }
        if let (Some(handler), Some(failure)) = (self.chain(&key.chain_id), Message::failure(key.op, key.request_id)) {
            handler.push(InboundMessage::new(key.node_id, key.chain_id, failure));
        }
    }

    /// Clears the outstanding request `msg` answers. Returns `false` if there is none.
    fn take_request(&self, msg: &InboundMessage) -> bool {
        let op = msg.op();
        let request_id = match msg.message.request_id() {
            Some(request_id) => request_id,
            None => return false,
        };
        if op == Op::Put && request_id == GOSSIP_REQUEST_ID {
            return true;
        }
        let index = (msg.node_id, msg.chain_id, request_id);
        let request_op = {
            let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
            match outstanding.get(&index) {
                Some(request_op) if request_op.response() == Some(op) || request_op.failure() == Some(op) => {
                    let request_op = *request_op;
                    outstanding.remove(&index);
                    request_op
                }
                _ => return false,
            }
        };
        let key = RequestKey { node_id: msg.node_id, chain_id: msg.chain_id, request_id, op: request_op };
        if op.is_internal() {
            self.timeouts.cancel(&key);
        } else {
            self.timeouts.remove(&key);
        }
        true
    }

    pub fn handle_inbound(&self, msg: InboundMessage) {
        let handler = match self.chain(&msg.chain_id) {
            Some(handler) => handler,
            None => {
                debug!("[{}] dropping {:?} for unknown chain {}", "router".cyan(), msg.op(), msg.chain_id);
                return;
            }
        };
        if msg.op().is_response() && !self.take_request(&msg) {
            debug!(
                "[{}] dropping unrequested {:?} {:?} from {}",
                "router".cyan(),
                msg.op(),
                msg.message.request_id(),
                msg.node_id
            );
            return;
        }
        handler.push(msg);
    }

    pub fn connected(&self, node_id: NodeId) {
        if !self.peers.lock().unwrap_or_else(PoisonError::into_inner).insert(node_id) {
            return;
        }
        for (chain_id, handler) in self.chains.read().unwrap_or_else(PoisonError::into_inner).iter() {
            handler.push(InboundMessage::new(node_id, *chain_id, Message::Connected));
        }
    }

    pub fn disconnected(&self, node_id: NodeId) {
        if !self.peers.lock().unwrap_or_else(PoisonError::into_inner).remove(&node_id) {
            return;
        }
        for (chain_id, handler) in self.chains.read().unwrap_or_else(PoisonError::into_inner).iter() {
            handler.push(InboundMessage::new(node_id, *chain_id, Message::Disconnected));
        }
    }

    /// Stops every chain, waiting up to `grace` for each to close.
    pub async fn shutdown(&self, grace: Duration) {
        let handlers: Vec<Arc<Handler>> =
            self.chains.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        for handler in handlers.iter() {
            handler.stop();
        }
        for handler in handlers.iter() {
            if tokio::time::timeout(grace, handler.closed()).await.is_err() {
                warn!("[{}] chain {} did not close in time", "router".cyan(), handler.context().chain_id);
            }
        }
        self.timeouts.stop();
    }
}
