use std::sync::Arc;

use colored::Colorize;
use tracing::info;

use crate::engine::common::{next_request_id, ChainContext, Engine, EngineState};
use crate::engine::Result;
use crate::networking::message::{InboundMessage, Message};

/// The engines of one chain, one per phase. Only the engine of the chain's current phase
/// receives messages.
pub struct EngineManager {
    ctx: Arc<ChainContext>,
    state_syncer: Option<Box<dyn Engine>>,
    bootstrapper: Box<dyn Engine>,
    consensus: Box<dyn Engine>,
}

impl EngineManager {
    pub fn new(
        ctx: Arc<ChainContext>,
        state_syncer: Option<Box<dyn Engine>>,
        bootstrapper: Box<dyn Engine>,
        consensus: Box<dyn Engine>,
    ) -> Self {
        EngineManager { ctx, state_syncer, bootstrapper, consensus }
    }

    fn engine(&mut self, state: EngineState) -> &mut dyn Engine {
        match (state, self.state_syncer.as_mut()) {
            (EngineState::StateSyncing, Some(syncer)) => syncer.as_mut(),
            (EngineState::StateSyncing, None) | (EngineState::Bootstrapping, _) => self.bootstrapper.as_mut(),
            (EngineState::NormalOp, _) => self.consensus.as_mut(),
        }
    }

    pub fn current(&mut self) -> &mut dyn Engine {
        let state = self.ctx.state();
        self.engine(state)
    }

    /// Starts the engine of the chain's phase, and the following ones if it finishes at once.
    pub fn start(&mut self) -> Result<()> {
        if self.state_syncer.is_none() {
            self.ctx.set_state(EngineState::Bootstrapping);
        }
        let state = self.ctx.state();
        self.engine(state).start(0)?;
        self.advance(state)
    }

    /// Hands over to the next engine for as long as the phase keeps moving. Request ids carry
    /// on from the previous engine so answers meant for it are not mistaken for new ones.
    fn advance(&mut self, mut from: EngineState) -> Result<()> {
        loop {
            let to = self.ctx.state();
            if to == from {
                return Ok(());
            }
            let start_request_id = next_request_id(self.engine(from).last_request_id());
            if to == EngineState::NormalOp {
                self.ctx.allychain().bootstrapped(&self.ctx.chain_id);
            }
            info!("[{}] chain {} handing over to {:?}", "handler".magenta(), self.ctx.chain_id, to);
            self.engine(to).start(start_request_id)?;
            from = to;
        }
    }

    /// Runs the callback of `msg` on the current engine.
    pub fn dispatch(&mut self, msg: InboundMessage) -> Result<()> {
        let state = self.ctx.state();
        let (node_id, op) = (msg.node_id, msg.op());
        let engine = self.engine(state);
        match msg.message {
            Message::GetAcceptedFrontier { request_id } => engine.get_accepted_frontier(node_id, request_id)?,
            Message::AcceptedFrontier { request_id, container_ids } => {
                engine.accepted_frontier(node_id, request_id, container_ids)?
            }
            Message::GetAcceptedFrontierFailed { request_id } => {
                engine.get_accepted_frontier_failed(node_id, request_id)?
            }
            Message::GetAccepted { request_id, container_ids } => {
                engine.get_accepted(node_id, request_id, container_ids)?
            }
            Message::Accepted { request_id, container_ids } => engine.accepted(node_id, request_id, container_ids)?,
            Message::GetAcceptedFailed { request_id } => engine.get_accepted_failed(node_id, request_id)?,
            Message::GetAncestors { request_id, container_id } => {
                engine.get_ancestors(node_id, request_id, container_id)?
            }
            Message::Ancestors { request_id, containers } => engine.ancestors(node_id, request_id, containers)?,
            Message::GetAncestorsFailed { request_id } => engine.get_ancestors_failed(node_id, request_id)?,
            Message::Get { request_id, container_id } => engine.get(node_id, request_id, container_id)?,
            Message::Put { request_id, container } => engine.put(node_id, request_id, container)?,
            Message::GetFailed { request_id } => engine.get_failed(node_id, request_id)?,
            Message::PushQuery { request_id, container } => engine.push_query(node_id, request_id, container)?,
            Message::PullQuery { request_id, container_id } => engine.pull_query(node_id, request_id, container_id)?,
            Message::Chits { request_id, votes } => engine.chits(node_id, request_id, votes)?,
            Message::QueryFailed { request_id } => engine.query_failed(node_id, request_id)?,
            Message::Connected => engine.connected(node_id)?,
            Message::Disconnected => engine.disconnected(node_id)?,
            Message::Notify(vm_message) => engine.notify(vm_message)?,
            Message::GossipRequest => engine.gossip()?,
            Message::Timeout => engine.timeout()?,
            Message::AppRequest { .. }
            | Message::AppResponse { .. }
            | Message::AppRequestFailed { .. }
            | Message::AppGossip { .. } => {
                return Err(crate::engine::Error::InvalidState(format!("{:?} routed to the consensus engine", op)))
            }
        }
        self.advance(state)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.current().shutdown()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allychains::Allychain;
    use crate::engine::common::testing::{Call, TestEngine};
    use crate::zfx_id::Id;
    use std::sync::Mutex;

    #[test]
    fn test_handover_on_bootstrap() {
        let allychain = Arc::new(Allychain::new(Id::zero()));
        allychain.add_chain(Id::one());
        let (ctx, _rx) =
            ChainContext::new(1, allychain.clone(), Id::one(), Id::two(), EngineState::StateSyncing);
        let calls = Arc::new(Mutex::new(vec![]));
        let mut bootstrapper = TestEngine::new(ctx.clone(), "bootstrap", calls.clone());
        bootstrapper.advance_on_start = Some(EngineState::NormalOp);
        let consensus = TestEngine::new(ctx.clone(), "consensus", calls.clone());
        let mut engines = EngineManager::new(ctx.clone(), None, Box::new(bootstrapper), Box::new(consensus));

        engines.start().unwrap();
        assert_eq!(ctx.state(), EngineState::NormalOp);
        assert!(allychain.is_bootstrapped());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("bootstrap", Call::Start(0)), ("consensus", Call::Start(11))]
        );

        let msg = InboundMessage::new(Id::two(), Id::one(), Message::QueryFailed { request_id: 3 });
        engines.dispatch(msg).unwrap();
        assert_eq!(calls.lock().unwrap().last(), Some(&("consensus", Call::QueryFailed(Id::two(), 3))));
    }

    #[test]
    fn test_only_the_current_engine_receives_messages() {
        let allychain = Arc::new(Allychain::new(Id::zero()));
        let (ctx, _rx) =
            ChainContext::new(1, allychain, Id::one(), Id::two(), EngineState::Bootstrapping);
        let calls = Arc::new(Mutex::new(vec![]));
        let bootstrapper = TestEngine::new(ctx.clone(), "bootstrap", calls.clone());
        let consensus = TestEngine::new(ctx.clone(), "consensus", calls.clone());
        let mut engines = EngineManager::new(ctx.clone(), None, Box::new(bootstrapper), Box::new(consensus));
        engines.start().unwrap();

        engines.dispatch(InboundMessage::new(Id::two(), Id::one(), Message::GossipRequest)).unwrap();
        let app = InboundMessage::new(Id::two(), Id::one(), Message::AppGossip { bytes: vec![] });
        assert!(engines.dispatch(app).is_err());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("bootstrap", Call::Start(0)), ("bootstrap", Call::Gossip)]
        );
    }
}
