use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::allychains::Allychain;
use crate::engine::common::testing::{Call, TestApp, TestEngine};
use crate::engine::common::{ChainContext, EngineState};
use crate::networking::handler::{EngineManager, Handler, HandlerConfig};
use crate::networking::timeout::{self, TimeoutConfig};
use crate::networking::tracker::ResourceTracker;
use crate::networking::ChainRouter;
use crate::zfx_id::{Id, NodeId};
use tokio::sync::mpsc;

pub type Calls = Arc<Mutex<Vec<(&'static str, Call)>>>;

/// Chain every scenario runs.
pub fn chain_id() -> Id {
    Id::one()
}

/// A router whose requests time out after exactly `timeout`.
pub fn router(node_id: NodeId, timeout: Duration) -> Arc<ChainRouter> {
    let timeouts = Arc::new(timeout::Manager::new(TimeoutConfig {
        initial: timeout,
        minimum: timeout,
        maximum: timeout,
        ..TimeoutConfig::default()
    }));
    {
        let timeouts = timeouts.clone();
        tokio::spawn(async move { timeouts.dispatch().await });
    }
    ChainRouter::new(node_id, timeouts)
}

/// Adds a chain run by recording engines to `router`. The chain is in normal operation once
/// started.
pub fn add_test_chain(router: &Arc<ChainRouter>) -> (Arc<ChainContext>, Arc<Handler>, Calls) {
    let (ctx, engine_timeouts) =
        ChainContext::new(1, Arc::new(Allychain::new(Id::zero())), chain_id(), router.node_id(), EngineState::Bootstrapping);
    let calls: Calls = Arc::new(Mutex::new(vec![]));
    let (_vm_tx, vm_rx) = mpsc::unbounded_channel();
    let handler = Handler::new(
        ctx.clone(),
        HandlerConfig { gossip_frequency: Duration::from_secs(3600), async_workers: 2 },
        Arc::new(TestApp::default()),
        Arc::new(ResourceTracker::new(Duration::from_secs(1))),
        vm_rx,
        engine_timeouts,
    );
    let mut bootstrapper = TestEngine::new(ctx.clone(), "bootstrap", calls.clone());
    bootstrapper.advance_on_start = Some(EngineState::NormalOp);
    handler.set_engines(EngineManager::new(
        ctx.clone(),
        None,
        Box::new(bootstrapper),
        Box::new(TestEngine::new(ctx.clone(), "consensus", calls.clone())),
    ));
    handler.start().unwrap();
    router.add_chain(handler.clone());
    (ctx, handler, calls)
}

/// Polls `condition` until it holds or `limit` has passed.
pub async fn eventually<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
