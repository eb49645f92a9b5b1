use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::Keypair;
use rand::rngs::OsRng;
use tokio::net::TcpListener;

use super::test_utils::*;
use crate::engine::common::testing::Call;
use crate::engine::common::Sender as _;
use crate::network::{handshake, Network, NetworkConfig, PeerInfo};
use crate::networking::throttling::SystemThrottler;
use crate::networking::tracker::{ResourceTracker, Targeter, TargeterConfig};
use crate::networking::{ChainRouter, GossipConfig, Sender};
use crate::server::{node, Settings};
use crate::validators;
use crate::vm::ChainVm;
use crate::zfx_id::Id;

async fn network(router: Arc<ChainRouter>, keypair: Arc<Keypair>) -> Arc<Network> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let validators = Arc::new(validators::Manager::new());
    let tracker = Arc::new(ResourceTracker::new(Duration::from_secs(1)));
    let targeter = Arc::new(Targeter::new(TargeterConfig::default(), validators.clone(), Id::zero(), tracker.clone()));
    let throttler = SystemThrottler::new(Duration::from_millis(100), tracker, targeter);
    let network = Network::new(NetworkConfig::new(1, address), keypair, router, validators, throttler);
    actix::spawn(network.clone().listen(listener));
    network
}

#[actix_rt::test]
async fn test_unanswered_query_over_the_network_fails() {
    let (keypair_a, keypair_b) = (Arc::new(Keypair::generate(&mut OsRng {})), Arc::new(Keypair::generate(&mut OsRng {})));
    let (a, b) = (handshake::node_id(&keypair_a.public), handshake::node_id(&keypair_b.public));

    let router_a = router(a, Duration::from_millis(200));
    let (ctx_a, _handler_a, calls_a) = add_test_chain(&router_a);
    let network_a = network(router_a.clone(), keypair_a).await;

    let router_b = router(b, Duration::from_millis(200));
    let (_ctx_b, _handler_b, calls_b) = add_test_chain(&router_b);
    let network_b = network(router_b, keypair_b).await;
    let address_b = network_b.local_addr();

    network_a.dial(PeerInfo { id: Some(b), ip: address_b }).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || calls_b.lock().unwrap().contains(&("consensus", Call::Connected(a)))).await);
    assert!(calls_a.lock().unwrap().contains(&("consensus", Call::Connected(b))));

    // B receives the query but has nothing to answer with
    let sender = Sender::new(ctx_a, network_a.clone(), router_a, GossipConfig::default());
    let missing = Id::generate();
    sender.send_pull_query(std::iter::once(b).collect(), 7, missing);

    assert!(eventually(Duration::from_secs(2), || calls_b.lock().unwrap().contains(&("consensus", Call::PullQuery(a, 7, missing)))).await);
    assert!(eventually(Duration::from_secs(2), || calls_a.lock().unwrap().contains(&("consensus", Call::QueryFailed(b, 7)))).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let failures = calls_a.lock().unwrap().iter().filter(|(_, c)| matches!(c, Call::QueryFailed(..))).count();
    assert_eq!(failures, 1);

    // Closing the connection reaches both chains
    network_a.shutdown();
    assert!(eventually(Duration::from_secs(2), || calls_b.lock().unwrap().contains(&("consensus", Call::Disconnected(a)))).await);
    network_b.shutdown();
}

fn settings(dir: &std::path::Path, name: &str) -> Settings {
    Settings {
        listener_ip: "127.0.0.1:0".to_owned(),
        data_dir: dir.join(name).to_str().map(str::to_owned),
        k: 1,
        alpha: 1,
        beta_virtuous: 1,
        beta_rogue: 2,
        concurrent_repolls: 1,
        ..Settings::default()
    }
}

#[actix_rt::test]
async fn test_new_node_bootstraps_from_its_beacon() {
    let dir = std::env::temp_dir().join(format!("zfx-bootstrap-{}", Id::generate()));

    let first = node::run(settings(&dir, "first")).await.unwrap();
    let genesis = first.vm().last_accepted().unwrap();
    for payload in [b"one".to_vec(), b"two".to_vec()] {
        let before = first.vm().last_accepted().unwrap();
        first.vm().submit(payload);
        assert!(eventually(Duration::from_secs(5), || first.vm().last_accepted().unwrap() != before).await);
    }
    let tip = first.vm().last_accepted().unwrap();
    assert_ne!(tip, genesis);

    let mut second_settings = settings(&dir, "second");
    second_settings.bootstrap_peers = vec![format!("{}@{}", first.node_id(), first.listener())];
    let second = node::run(second_settings).await.unwrap();
    assert!(eventually(Duration::from_secs(10), || second.vm().last_accepted().unwrap() == tip).await);
    assert_eq!(second.vm().get_block(&tip).unwrap().height(), 2);

    second.shutdown().await.unwrap();
    first.shutdown().await.unwrap();
    std::fs::remove_dir_all(dir).unwrap();
}
