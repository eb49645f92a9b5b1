//! Wires a node: one network, one allychain and one Snowman chain running the block store VM.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use ed25519_dalek::Keypair;
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::Settings;
use crate::allychains::Allychain;
use crate::codec;
use crate::engine::common::{AppHandler, ChainContext, EngineState};
use crate::engine::snowman::{self, Bootstrapper, Transitive};
use crate::network::{handshake, Network, NetworkConfig, PeerInfo};
use crate::networking::throttling::SystemThrottler;
use crate::networking::timeout;
use crate::networking::tracker::{ResourceTracker, Targeter};
use crate::networking::{ChainRouter, EngineManager, GossipConfig, Handler, Sender};
use crate::validators;
use crate::vm::blockstore::BlockStoreVm;
use crate::vm::ChainVm;
use crate::zfx_id::{Id, NodeId};
use crate::Result;

/// Stake given to every node known at startup.
const STAKE: u64 = 1000;

const REDIAL_DELAY: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Reads the hex encoded keypair at `path`, generating and storing a new one if there is none.
pub fn read_or_generate_keypair(path: &Path) -> Result<Keypair> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let bytes = hex::decode(contents.trim())?;
            Ok(Keypair::from_bytes(&bytes)?)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let keypair = Keypair::generate(&mut OsRng {});
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(path, hex::encode(keypair.to_bytes()))?;
            info!("[{}] generated a new keypair in {}", "node".blue(), path.display());
            Ok(keypair)
        }
        Err(err) => Err(err.into()),
    }
}

/// A running node.
pub struct Node {
    node_id: NodeId,
    chain_id: Id,
    listener: SocketAddr,
    network: Arc<Network>,
    router: Arc<ChainRouter>,
    vm: Arc<BlockStoreVm>,
}

impl Node {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    /// The address the node accepts connections on.
    pub fn listener(&self) -> SocketAddr {
        self.listener
    }

    pub fn vm(&self) -> &Arc<BlockStoreVm> {
        &self.vm
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Closes every connection and stops the chain.
    pub async fn shutdown(&self) -> Result<()> {
        info!("[{}] {} shutting down", "node".blue(), self.node_id);
        self.network.shutdown();
        self.router.shutdown(SHUTDOWN_GRACE).await;
        self.vm.shutdown()?;
        Ok(())
    }
}

/// Starts a node. Must be called from within an actix system.
pub async fn run(settings: Settings) -> Result<Node> {
    let data_dir = settings.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let keypair = Arc::new(read_or_generate_keypair(&settings.keypair_path())?);
    let node_id = handshake::node_id(&keypair.public);
    let bootstrap_peers = settings
        .bootstrap_peers
        .iter()
        .map(|peer| PeerInfo::from_id_and_ip(peer))
        .collect::<std::result::Result<Vec<PeerInfo>, _>>()?;
    info!("[{}] {} is starting", "node".blue(), node_id);

    // The node and every bootstrap peer with a known id validate the primary allychain
    let allychain_id = Id::zero();
    let beacons: Vec<(NodeId, u64)> =
        bootstrap_peers.iter().filter_map(|peer| peer.id).filter(|id| *id != node_id).map(|id| (id, STAKE)).collect();
    let validators = Arc::new(validators::Manager::new());
    let mut stakers = beacons.clone();
    stakers.push((node_id, STAKE));
    validators.set(allychain_id, &stakers)?;
    let beacon_set = Arc::new(validators::Set::new());
    beacon_set.set(&beacons)?;

    let tracker = Arc::new(ResourceTracker::new(Duration::from_millis(settings.cpu_half_life_ms)));
    let targeter = Arc::new(Targeter::new(settings.targeter_config(), validators.clone(), allychain_id, tracker.clone()));
    let throttler =
        SystemThrottler::new(Duration::from_millis(settings.max_recheck_delay_ms), tracker.clone(), targeter);

    let timeouts = Arc::new(timeout::Manager::new(settings.timeout_config()));
    {
        let timeouts = timeouts.clone();
        tokio::spawn(async move { timeouts.dispatch().await });
    }
    let router = ChainRouter::new(node_id, timeouts);

    let listener = TcpListener::bind(&settings.listener_ip).await?;
    let local_addr = listener.local_addr()?;
    let mut network_config = NetworkConfig::new(settings.network_id, local_addr);
    network_config.max_clock_difference = Duration::from_secs(settings.max_clock_difference_secs);
    network_config.max_processing = settings.max_processing_per_node;
    let network = Network::new(network_config, keypair, router.clone(), validators.clone(), throttler);

    let db = sled::open(data_dir.join("chain.sled"))?;
    let (vm, vm_messages) = BlockStoreVm::new(&db, codec::Manager::default(), settings.genesis.as_bytes())?;
    let vm = Arc::new(vm);

    let chain_id = Id::new(settings.genesis.as_bytes());
    let allychain = Arc::new(Allychain::new(allychain_id));
    allychain.add_chain(chain_id);
    let (ctx, engine_timeouts) =
        ChainContext::new(settings.network_id, allychain, chain_id, node_id, EngineState::Bootstrapping);
    let sender = Arc::new(Sender::new(ctx.clone(), network.clone(), router.clone(), GossipConfig::default()));
    let params = settings.parameters();
    params.verify()?;
    let config = snowman::Config {
        ctx: ctx.clone(),
        vm: vm.clone(),
        sender,
        validators: validators.get_or_create(allychain_id),
        beacons: beacon_set,
        params,
        getter: settings.getter_config(),
    };

    let app: Arc<dyn AppHandler> = vm.clone();
    let handler = Handler::new(ctx.clone(), settings.handler_config(), app, tracker, vm_messages, engine_timeouts);
    handler.set_engines(EngineManager::new(
        ctx,
        None,
        Box::new(Bootstrapper::new(config.clone())),
        Box::new(Transitive::new(config)?),
    ));
    handler.start()?;
    router.add_chain(handler);

    actix::spawn({
        let network = network.clone();
        async move {
            if let Err(err) = network.listen(listener).await {
                warn!("[{}] stopped listening: {}", "node".blue(), err);
            }
        }
    });
    for peer in bootstrap_peers {
        actix::spawn(dial(network.clone(), peer));
    }

    Ok(Node { node_id, chain_id, listener: local_addr, network, router, vm })
}

/// Dials `peer` until a connection is established or the network shuts down.
async fn dial(network: Arc<Network>, peer: PeerInfo) {
    while !network.is_closing() {
        match network.dial(peer).await {
            Ok(node_id) => {
                debug!("[{}] bootstrap peer {} at {} connected", "node".blue(), node_id, peer.ip);
                return;
            }
            Err(crate::network::Error::AlreadyConnected) => return,
            Err(err) => {
                debug!("[{}] failed to dial {}: {}", "node".blue(), peer.ip, err);
                tokio::time::sleep(REDIAL_DELAY).await;
            }
        }
    }
}
