use std::collections::HashSet;
use std::sync::Arc;

use colored::Colorize;
use tracing::debug;

use super::message::{Envelope, InboundMessage, Message};
use super::router::{ChainRouter, GOSSIP_REQUEST_ID};
use crate::engine::common::{self, ChainContext};
use crate::zfx_id::{Id, NodeId};

/// The transport to other nodes. Delivery is best effort.
pub trait ExternalSender: Send + Sync {
    /// Sends `envelope` to `node_ids` and returns the nodes it was handed to.
    fn send(
        &self,
        envelope: Envelope,
        node_ids: HashSet<NodeId>,
        allychain_id: Id,
        validator_only: bool,
    ) -> HashSet<NodeId>;

    /// Sends `envelope` to a random selection of validators, non-validators and peers of
    /// either kind. Returns the nodes it was handed to.
    fn gossip(
        &self,
        envelope: Envelope,
        allychain_id: Id,
        validator_only: bool,
        num_validators: usize,
        num_non_validators: usize,
        num_peers: usize,
    ) -> HashSet<NodeId>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipConfig {
    pub accepted_frontier_validator_size: usize,
    pub accepted_frontier_non_validator_size: usize,
    pub accepted_frontier_peer_size: usize,
    pub app_gossip_validator_size: usize,
    pub app_gossip_non_validator_size: usize,
    pub app_gossip_peer_size: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            accepted_frontier_validator_size: 0,
            accepted_frontier_non_validator_size: 0,
            accepted_frontier_peer_size: 15,
            app_gossip_validator_size: 10,
            app_gossip_non_validator_size: 0,
            app_gossip_peer_size: 0,
        }
    }
}

/// The engine side sender of one chain.
///
/// Every request is registered with the router before it leaves, once per node. Nodes the
/// request could not be handed to answer with the failure message straight away, and messages
/// for this node go back through the router.
pub struct Sender {
    ctx: Arc<ChainContext>,
    external: Arc<dyn ExternalSender>,
    router: Arc<ChainRouter>,
    gossip: GossipConfig,
}

impl Sender {
    pub fn new(
        ctx: Arc<ChainContext>,
        external: Arc<dyn ExternalSender>,
        router: Arc<ChainRouter>,
        gossip: GossipConfig,
    ) -> Self {
        Sender { ctx, external, router, gossip }
    }

    fn send_request(&self, mut node_ids: HashSet<NodeId>, request_id: u32, message: Message) {
        let (chain_id, op) = (self.ctx.chain_id, message.op());
        let deadline = self.router.timeouts().timeout_duration();
        for node_id in node_ids.iter() {
            self.router.register_request(*node_id, chain_id, request_id, op);
        }

        if node_ids.remove(&self.ctx.node_id) {
            let envelope = Envelope::with_deadline(chain_id, deadline, message.clone());
            self.router.handle_inbound(InboundMessage::from_envelope(self.ctx.node_id, envelope));
        }
        if node_ids.is_empty() {
            return;
        }

        let envelope = Envelope::with_deadline(chain_id, deadline, message);
        let sent = self.external.send(envelope, node_ids.clone(), self.ctx.allychain_id(), false);
        for node_id in node_ids.difference(&sent) {
            debug!("[{}] could not send {:?} {} to {}", "sender".cyan(), op, request_id, node_id);
            if let Some(failure) = Message::failure(op, request_id) {
                self.router.handle_inbound(InboundMessage::new(*node_id, chain_id, failure));
            }
        }
    }

    fn send_response(&self, node_id: NodeId, message: Message) {
        let chain_id = self.ctx.chain_id;
        if node_id == self.ctx.node_id {
            self.router.handle_inbound(InboundMessage::new(node_id, chain_id, message));
            return;
        }
        let op = message.op();
        let node_ids = std::iter::once(node_id).collect();
        if self.external.send(Envelope::new(chain_id, message), node_ids, self.ctx.allychain_id(), false).is_empty() {
            debug!("[{}] could not send {:?} to {}", "sender".cyan(), op, node_id);
        }
    }

    fn send_gossip_message(&self, message: Message, validators: usize, non_validators: usize, peers: usize) {
        let envelope = Envelope::new(self.ctx.chain_id, message);
        let sent = self.external.gossip(envelope, self.ctx.allychain_id(), false, validators, non_validators, peers);
        debug!("[{}] gossiped to {} nodes", "sender".cyan(), sent.len());
    }
}

impl common::Sender for Sender {
    fn send_get_accepted_frontier(&self, node_ids: HashSet<NodeId>, request_id: u32) {
        self.send_request(node_ids, request_id, Message::GetAcceptedFrontier { request_id });
    }

    fn send_accepted_frontier(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send_response(node_id, Message::AcceptedFrontier { request_id, container_ids });
    }

    fn send_get_accepted(&self, node_ids: HashSet<NodeId>, request_id: u32, container_ids: Vec<Id>) {
        self.send_request(node_ids, request_id, Message::GetAccepted { request_id, container_ids });
    }

    fn send_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send_response(node_id, Message::Accepted { request_id, container_ids });
    }

    fn send_get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        let node_ids = std::iter::once(node_id).collect();
        self.send_request(node_ids, request_id, Message::GetAncestors { request_id, container_id });
    }

    fn send_ancestors(&self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>) {
        self.send_response(node_id, Message::Ancestors { request_id, containers });
    }

    fn send_get(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        let node_ids = std::iter::once(node_id).collect();
        self.send_request(node_ids, request_id, Message::Get { request_id, container_id });
    }

    fn send_put(&self, node_id: NodeId, request_id: u32, container: Vec<u8>) {
        self.send_response(node_id, Message::Put { request_id, container });
    }

    fn send_push_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container: Vec<u8>) {
        self.send_request(node_ids, request_id, Message::PushQuery { request_id, container });
    }

    fn send_pull_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container_id: Id) {
        self.send_request(node_ids, request_id, Message::PullQuery { request_id, container_id });
    }

    fn send_chits(&self, node_id: NodeId, request_id: u32, votes: Vec<Id>) {
        self.send_response(node_id, Message::Chits { request_id, votes });
    }

    fn send_gossip(&self, container: Vec<u8>) {
        let g = &self.gossip;
        self.send_gossip_message(
            Message::Put { request_id: GOSSIP_REQUEST_ID, container },
            g.accepted_frontier_validator_size,
            g.accepted_frontier_non_validator_size,
            g.accepted_frontier_peer_size,
        );
    }

    fn send_app_request(&self, node_ids: HashSet<NodeId>, request_id: u32, bytes: Vec<u8>) {
        self.send_request(node_ids, request_id, Message::AppRequest { request_id, bytes });
    }

    fn send_app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) {
        self.send_response(node_id, Message::AppResponse { request_id, bytes });
    }

    fn send_app_gossip(&self, bytes: Vec<u8>) {
        let g = &self.gossip;
        self.send_gossip_message(
            Message::AppGossip { bytes },
            g.app_gossip_validator_size,
            g.app_gossip_non_validator_size,
            g.app_gossip_peer_size,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allychains::Allychain;
    use crate::engine::common::testing::{Call, TestApp, TestEngine};
    use crate::engine::common::{EngineState, Sender as _};
    use crate::networking::handler::{EngineManager, Handler, HandlerConfig};
    use crate::networking::testing::TestExternalSender;
    use crate::networking::timeout::{self, TimeoutConfig};
    use crate::networking::tracker::ResourceTracker;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Calls = Arc<Mutex<Vec<(&'static str, Call)>>>;

    fn setup(external: Arc<TestExternalSender>) -> (Sender, Calls) {
        let timeouts = Arc::new(timeout::Manager::new(TimeoutConfig {
            initial: Duration::from_secs(10),
            ..TimeoutConfig::default()
        }));
        let router = ChainRouter::new(Id::zero(), timeouts);
        let (ctx, timeout_rx) =
            ChainContext::new(1, Arc::new(Allychain::new(Id::zero())), Id::one(), Id::zero(), EngineState::NormalOp);
        let calls: Calls = Arc::new(Mutex::new(vec![]));
        let (_vm_tx, vm_rx) = mpsc::unbounded_channel();
        let handler = Handler::new(
            ctx.clone(),
            HandlerConfig::default(),
            Arc::new(TestApp::default()),
            Arc::new(ResourceTracker::new(Duration::from_secs(1))),
            vm_rx,
            timeout_rx,
        );
        handler.set_engines(EngineManager::new(
            ctx.clone(),
            None,
            Box::new(TestEngine::new(ctx.clone(), "bootstrap", calls.clone())),
            Box::new(TestEngine::new(ctx.clone(), "consensus", calls.clone())),
        ));
        handler.start().unwrap();
        router.add_chain(handler);
        (Sender::new(ctx, external, router, GossipConfig::default()), calls)
    }

    #[actix_rt::test]
    async fn test_unreachable_nodes_fail_at_once() {
        let (reachable, unreachable) = (Id::two(), Id::generate());
        let external = Arc::new(TestExternalSender::new(vec![reachable]));
        let (sender, calls) = setup(external.clone());

        sender.send_pull_query(vec![reachable, unreachable].into_iter().collect(), 3, Id::one());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = external.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].0.message, Message::PullQuery { request_id: 3, .. }));
        assert!(sent[0].0.deadline.is_some());
        let calls = calls.lock().unwrap().clone();
        assert!(calls.contains(&("consensus", Call::QueryFailed(unreachable, 3))));
        assert!(!calls.contains(&("consensus", Call::QueryFailed(reachable, 3))));
    }

    #[actix_rt::test]
    async fn test_requests_to_self_loop_back() {
        let external = Arc::new(TestExternalSender::new(vec![]));
        let (sender, calls) = setup(external.clone());

        sender.send_pull_query(std::iter::once(Id::zero()).collect(), 4, Id::one());
        sender.send_chits(Id::zero(), 4, vec![Id::one()]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(external.sent().is_empty());
        let calls = calls.lock().unwrap().clone();
        assert!(calls.contains(&("consensus", Call::PullQuery(Id::zero(), 4, Id::one()))));
        assert!(calls.contains(&("consensus", Call::Chits(Id::zero(), 4, vec![Id::one()]))));
    }

    #[actix_rt::test]
    async fn test_gossip_put_uses_the_gossip_request_id() {
        let external = Arc::new(TestExternalSender::new(vec![Id::two()]));
        let (sender, _calls) = setup(external.clone());
        sender.send_gossip(vec![1, 2, 3]);
        let gossiped = external.gossiped();
        assert_eq!(gossiped.len(), 1);
        assert_eq!(gossiped[0].message, Message::Put { request_id: GOSSIP_REQUEST_ID, container: vec![1, 2, 3] });
    }
}
