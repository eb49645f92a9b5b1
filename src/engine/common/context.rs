use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::info;

use crate::allychains::Allychain;
use crate::zfx_id::{Id, NodeId};

/// Phase of a chain. A chain only ever moves forward through the phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineState {
    StateSyncing,
    Bootstrapping,
    NormalOp,
}

/// What an engine knows about the chain it runs.
#[derive(Debug)]
pub struct ChainContext {
    pub network_id: u32,
    pub chain_id: Id,
    pub node_id: NodeId,
    allychain: Arc<Allychain>,
    state: RwLock<EngineState>,
    halted: AtomicBool,
    timeouts: mpsc::UnboundedSender<Duration>,
}

impl ChainContext {
    /// Returns the context together with the receiving end of the engine's timeout requests,
    /// which belongs to the chain's handler.
    pub fn new(
        network_id: u32,
        allychain: Arc<Allychain>,
        chain_id: Id,
        node_id: NodeId,
        state: EngineState,
    ) -> (Arc<ChainContext>, mpsc::UnboundedReceiver<Duration>) {
        let (timeouts, rx) = mpsc::unbounded_channel();
        let ctx = ChainContext {
            network_id,
            chain_id,
            node_id,
            allychain,
            state: RwLock::new(state),
            halted: AtomicBool::new(false),
            timeouts,
        };
        (Arc::new(ctx), rx)
    }

    pub fn allychain_id(&self) -> Id {
        self.allychain.id()
    }

    pub fn allychain(&self) -> &Arc<Allychain> {
        &self.allychain
    }

    pub fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the chain to `state`. Returns `false`, leaving the phase unchanged, if that would
    /// not be a step forward.
    pub fn set_state(&self, state: EngineState) -> bool {
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state <= *current {
            return false;
        }
        info!("[{}] chain {} moving from {:?} to {:?}", "context".green(), self.chain_id, *current, state);
        *current = state;
        true
    }

    /// Asks long running engine work to stop at the next opportunity.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Asks for the engine's `timeout` callback to be called after `after`.
    pub fn register_timeout(&self, after: Duration) {
        // Fails only once the handler is gone, when nobody would run the callback anyway
        let _ = self.timeouts.send(after);
    }
}
