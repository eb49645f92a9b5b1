use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use actix::{Actor, Addr};
use colored::Colorize;
use ed25519_dalek::Keypair;
use rand::seq::SliceRandom;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::{self, Channel};
use super::handshake::{self, Frame, Version};
use super::peer::{Deliver, Disconnect, Peer};
use super::{Error, PeerInfo, Result};

/// Pause after a failed accept, so that running out of file descriptors does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
use crate::networking::throttling::{BufferThrottler, SystemThrottler};
use crate::networking::{ChainRouter, Envelope, ExternalSender, InboundMessage};
use crate::validators;
use crate::zfx_id::{Id, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network_id: u32,
    /// The address other nodes connect to.
    pub listener: SocketAddr,
    pub max_clock_difference: Duration,
    /// Messages of one node that may be read but not yet processed.
    pub max_processing: usize,
}

impl NetworkConfig {
    pub fn new(network_id: u32, listener: SocketAddr) -> Self {
        NetworkConfig { network_id, listener, max_clock_difference: Duration::from_secs(60), max_processing: 1024 }
    }
}

/// The connections of this node.
pub struct Network {
    config: NetworkConfig,
    keypair: Arc<Keypair>,
    node_id: NodeId,
    router: Arc<ChainRouter>,
    validators: Arc<validators::Manager>,
    throttler: SystemThrottler,
    buffer: Arc<BufferThrottler>,
    peers: RwLock<HashMap<NodeId, Addr<Peer>>>,
    closing: CancellationToken,
}

impl Network {
    pub fn new(
        config: NetworkConfig,
        keypair: Arc<Keypair>,
        router: Arc<ChainRouter>,
        validators: Arc<validators::Manager>,
        throttler: SystemThrottler,
    ) -> Arc<Self> {
        let node_id = handshake::node_id(&keypair.public);
        let buffer = BufferThrottler::new(config.max_processing);
        Arc::new(Network {
            config,
            keypair,
            node_id,
            router,
            validators,
            throttler,
            buffer,
            peers: RwLock::new(HashMap::new()),
            closing: CancellationToken::new(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The address other nodes connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.config.listener
    }

    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    pub fn is_connected(&self, node_id: &NodeId) -> bool {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).get(node_id).map_or(false, |addr| addr.connected())
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Accepts connections until `shutdown` is called.
    pub async fn listen(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("[{}] {} listening on {}", "network".yellow(), self.node_id, self.config.listener);
        loop {
            let accepted = tokio::select! {
                _ = self.closing.cancelled() => return Ok(()),
                accepted = Channel::<Frame, Frame>::accept(&listener) => accepted,
            };
            let channel = match accepted {
                Ok(channel) => channel,
                Err(err) => {
                    warn!("[{}] failed to accept a connection: {}", "network".yellow(), err);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let network = self.clone();
            actix::spawn(async move {
                let address = channel.peer_addr();
                if let Err(err) = network.upgrade(channel, None).await {
                    debug!("[{}] rejected connection from {}: {}", "network".yellow(), address, err);
                }
            });
        }
    }

    /// Connects to `peer`. Fails if the node answering is not the one expected.
    pub async fn dial(self: &Arc<Self>, peer: PeerInfo) -> Result<NodeId> {
        let channel = Channel::<Frame, Frame>::connect(&peer.ip).await?;
        self.upgrade(channel, peer.id).await
    }

    async fn upgrade(self: &Arc<Self>, channel: Channel<Frame, Frame>, expected: Option<NodeId>) -> Result<NodeId> {
        let (mut sender, mut receiver) = channel.split();
        let version = Version::new(&self.keypair, self.config.network_id, self.config.listener)?;
        let (node_id, _) =
            handshake::handshake(&mut sender, &mut receiver, version, self.config.max_clock_difference).await?;
        if expected.map_or(false, |expected| expected != node_id) {
            return Err(Error::UnexpectedPeer);
        }
        if node_id == self.node_id {
            return Err(Error::SelfConnection);
        }
        let addr = {
            let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
            // The connection already in place wins
            if peers.get(&node_id).map_or(false, |addr| addr.connected()) {
                return Err(Error::AlreadyConnected);
            }
            let addr = Peer::new(node_id, sender).start();
            peers.insert(node_id, addr.clone());
            addr
        };
        info!("[{}] connected to {}", "network".yellow(), node_id);
        self.router.connected(node_id);
        actix::spawn(self.clone().read_loop(node_id, addr, receiver));
        Ok(node_id)
    }

    async fn read_loop(
        self: Arc<Self>,
        node_id: NodeId,
        addr: Addr<Peer>,
        mut receiver: channel::Receiver<Frame, Frame>,
    ) {
        loop {
            let frame = tokio::select! {
                _ = self.closing.cancelled() => break,
                frame = receiver.recv() => frame,
            };
            let envelope = match frame {
                Ok(Some(Frame::Message(envelope))) => envelope,
                Ok(Some(frame)) => {
                    warn!("[{}] unexpected {:?} from {}", "network".yellow(), frame, node_id);
                    break;
                }
                Ok(None) => break,
                Err(err) => {
                    debug!("[{}] failed to read from {}: {}", "network".yellow(), node_id, err);
                    break;
                }
            };
            if envelope.message.op().is_internal() {
                warn!("[{}] dropping {:?} from {}", "network".yellow(), envelope.message.op(), node_id);
                continue;
            }
            self.throttler.acquire(&self.closing, &node_id).await;
            let permit = match self.buffer.acquire(&self.closing, node_id).await {
                Some(permit) => permit,
                None => break,
            };
            self.router.handle_inbound(InboundMessage::from_envelope(node_id, envelope).with_permit(permit));
        }
        self.remove_peer(&node_id, Some(&addr));
    }

    /// Drops the connection to `node_id`. With `connection` given, only if that is still the
    /// connection in place.
    fn remove_peer(&self, node_id: &NodeId, connection: Option<&Addr<Peer>>) {
        let removed = {
            let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
            match (peers.get(node_id), connection) {
                (Some(current), Some(connection)) if current != connection => None,
                _ => peers.remove(node_id),
            }
        };
        if let Some(addr) = removed {
            addr.do_send(Disconnect);
            info!("[{}] disconnected from {}", "network".yellow(), node_id);
            self.router.disconnected(*node_id);
        }
    }

    /// Stops accepting connections and closes the open ones.
    pub fn shutdown(&self) {
        self.closing.cancel();
        for node_id in self.connected_peers() {
            self.remove_peer(&node_id, None);
        }
    }

    fn is_validator(&self, allychain_id: &Id, node_id: &NodeId) -> bool {
        self.validators.contains(allychain_id, node_id)
    }
}

impl ExternalSender for Network {
    fn send(
        &self,
        envelope: Envelope,
        node_ids: HashSet<NodeId>,
        allychain_id: Id,
        validator_only: bool,
    ) -> HashSet<NodeId> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let mut sent = HashSet::new();
        for node_id in node_ids {
            if validator_only && !self.is_validator(&allychain_id, &node_id) {
                continue;
            }
            if let Some(addr) = peers.get(&node_id).filter(|addr| addr.connected()) {
                addr.do_send(Deliver(envelope.clone()));
                sent.insert(node_id);
            }
        }
        sent
    }

    fn gossip(
        &self,
        envelope: Envelope,
        allychain_id: Id,
        validator_only: bool,
        num_validators: usize,
        num_non_validators: usize,
        num_peers: usize,
    ) -> HashSet<NodeId> {
        let (validators, non_validators): (Vec<NodeId>, Vec<NodeId>) =
            self.connected_peers().into_iter().partition(|node_id| self.is_validator(&allychain_id, node_id));
        let mut rng = rand::thread_rng();

        let mut targets: HashSet<NodeId> = validators.choose_multiple(&mut rng, num_validators).cloned().collect();
        if !validator_only {
            targets.extend(non_validators.choose_multiple(&mut rng, num_non_validators).cloned());
        }
        let rest: Vec<NodeId> = validators
            .iter()
            .chain(non_validators.iter().filter(|_| !validator_only))
            .filter(|node_id| !targets.contains(*node_id))
            .cloned()
            .collect();
        targets.extend(rest.choose_multiple(&mut rng, num_peers).cloned());

        self.send(envelope, targets, allychain_id, validator_only)
    }
}
