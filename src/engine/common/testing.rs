//! Test doubles recording what crosses the engine boundary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{AppHandler, ChainContext, Engine, EngineState, Sender};
use crate::engine::{Error, Result};
use crate::vm::VmMessage;
use crate::zfx_id::{Id, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    GetAcceptedFrontier(Vec<NodeId>, u32),
    AcceptedFrontier(NodeId, u32, Vec<Id>),
    GetAccepted(Vec<NodeId>, u32, Vec<Id>),
    Accepted(NodeId, u32, Vec<Id>),
    GetAncestors(NodeId, u32, Id),
    Ancestors(NodeId, u32, Vec<Vec<u8>>),
    Get(NodeId, u32, Id),
    Put(NodeId, u32, Vec<u8>),
    PushQuery(Vec<NodeId>, u32, Vec<u8>),
    PullQuery(Vec<NodeId>, u32, Id),
    Chits(NodeId, u32, Vec<Id>),
    Gossip(Vec<u8>),
    AppRequest(Vec<NodeId>, u32, Vec<u8>),
    AppResponse(NodeId, u32, Vec<u8>),
    AppGossip(Vec<u8>),
}

fn sorted(node_ids: HashSet<NodeId>) -> Vec<NodeId> {
    let mut node_ids: Vec<NodeId> = node_ids.into_iter().collect();
    node_ids.sort();
    node_ids
}

#[derive(Debug, Default)]
pub struct TestSender {
    sent: Mutex<Vec<Sent>>,
}

impl TestSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything sent since the last call.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

impl Sender for TestSender {
    fn send_get_accepted_frontier(&self, node_ids: HashSet<NodeId>, request_id: u32) {
        self.record(Sent::GetAcceptedFrontier(sorted(node_ids), request_id));
    }

    fn send_accepted_frontier(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.record(Sent::AcceptedFrontier(node_id, request_id, container_ids));
    }

    fn send_get_accepted(&self, node_ids: HashSet<NodeId>, request_id: u32, container_ids: Vec<Id>) {
        self.record(Sent::GetAccepted(sorted(node_ids), request_id, container_ids));
    }

    fn send_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.record(Sent::Accepted(node_id, request_id, container_ids));
    }

    fn send_get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        self.record(Sent::GetAncestors(node_id, request_id, container_id));
    }

    fn send_ancestors(&self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>) {
        self.record(Sent::Ancestors(node_id, request_id, containers));
    }

    fn send_get(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        self.record(Sent::Get(node_id, request_id, container_id));
    }

    fn send_put(&self, node_id: NodeId, request_id: u32, container: Vec<u8>) {
        self.record(Sent::Put(node_id, request_id, container));
    }

    fn send_push_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container: Vec<u8>) {
        self.record(Sent::PushQuery(sorted(node_ids), request_id, container));
    }

    fn send_pull_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container_id: Id) {
        self.record(Sent::PullQuery(sorted(node_ids), request_id, container_id));
    }

    fn send_chits(&self, node_id: NodeId, request_id: u32, votes: Vec<Id>) {
        self.record(Sent::Chits(node_id, request_id, votes));
    }

    fn send_gossip(&self, container: Vec<u8>) {
        self.record(Sent::Gossip(container));
    }

    fn send_app_request(&self, node_ids: HashSet<NodeId>, request_id: u32, bytes: Vec<u8>) {
        self.record(Sent::AppRequest(sorted(node_ids), request_id, bytes));
    }

    fn send_app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) {
        self.record(Sent::AppResponse(node_id, request_id, bytes));
    }

    fn send_app_gossip(&self, bytes: Vec<u8>) {
        self.record(Sent::AppGossip(bytes));
    }
}

/// Engine callbacks seen by a `TestEngine`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(u32),
    PullQuery(NodeId, u32, Id),
    PushQuery(NodeId, u32),
    Chits(NodeId, u32, Vec<Id>),
    QueryFailed(NodeId, u32),
    Get(NodeId, u32, Id),
    GetFailed(NodeId, u32),
    Put(NodeId, u32),
    Connected(NodeId),
    Disconnected(NodeId),
    Gossip,
    Timeout,
    Notify(VmMessage),
    Shutdown,
}

/// Engine recording its callbacks into a shared log.
pub struct TestEngine {
    ctx: Arc<ChainContext>,
    name: &'static str,
    calls: Arc<Mutex<Vec<(&'static str, Call)>>>,
    /// Phase the engine moves the chain to when started.
    pub advance_on_start: Option<EngineState>,
    /// Chits make the engine fail.
    pub fail_on_chits: bool,
    /// Time spent in each `pull_query`.
    pub work: Duration,
    last_request_id: u32,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl TestEngine {
    pub fn new(ctx: Arc<ChainContext>, name: &'static str, calls: Arc<Mutex<Vec<(&'static str, Call)>>>) -> Self {
        TestEngine {
            ctx,
            name,
            calls,
            advance_on_start: None,
            fail_on_chits: false,
            work: Duration::from_secs(0),
            last_request_id: 0,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of the most callbacks that ever ran at the same time.
    pub fn max_active(&self) -> Arc<AtomicUsize> {
        self.max_active.clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((self.name, call));
    }
}

impl Engine for TestEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn context(&self) -> &Arc<ChainContext> {
        &self.ctx
    }

    fn start(&mut self, start_request_id: u32) -> Result<()> {
        self.record(Call::Start(start_request_id));
        self.last_request_id = start_request_id + 10;
        if let Some(state) = self.advance_on_start {
            self.ctx.set_state(state);
        }
        Ok(())
    }

    fn last_request_id(&self) -> u32 {
        self.last_request_id
    }

    fn pull_query(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        self.record(Call::PullQuery(node_id, request_id, container_id));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn push_query(&mut self, node_id: NodeId, request_id: u32, _container: Vec<u8>) -> Result<()> {
        self.record(Call::PushQuery(node_id, request_id));
        Ok(())
    }

    fn chits(&mut self, node_id: NodeId, request_id: u32, votes: Vec<Id>) -> Result<()> {
        self.record(Call::Chits(node_id, request_id, votes));
        if self.fail_on_chits {
            return Err(Error::InvalidState("chits".to_owned()));
        }
        Ok(())
    }

    fn query_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.record(Call::QueryFailed(node_id, request_id));
        Ok(())
    }

    fn get(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        self.record(Call::Get(node_id, request_id, container_id));
        Ok(())
    }

    fn get_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.record(Call::GetFailed(node_id, request_id));
        Ok(())
    }

    fn put(&mut self, node_id: NodeId, request_id: u32, _container: Vec<u8>) -> Result<()> {
        self.record(Call::Put(node_id, request_id));
        Ok(())
    }

    fn connected(&mut self, node_id: NodeId) -> Result<()> {
        self.record(Call::Connected(node_id));
        Ok(())
    }

    fn disconnected(&mut self, node_id: NodeId) -> Result<()> {
        self.record(Call::Disconnected(node_id));
        Ok(())
    }

    fn gossip(&mut self) -> Result<()> {
        self.record(Call::Gossip);
        Ok(())
    }

    fn timeout(&mut self) -> Result<()> {
        self.record(Call::Timeout);
        Ok(())
    }

    fn notify(&mut self, message: VmMessage) -> Result<()> {
        self.record(Call::Notify(message));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.record(Call::Shutdown);
        Ok(())
    }
}

/// Application messages seen by a `TestApp`.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCall {
    Request(NodeId, u32, Vec<u8>),
    RequestFailed(NodeId, u32),
    Response(NodeId, u32, Vec<u8>),
    Gossip(NodeId, Vec<u8>),
}

#[derive(Debug, Default)]
pub struct TestApp {
    pub(crate) calls: Mutex<Vec<AppCall>>,
    /// Requests make the handler fail.
    pub fail_on_request: bool,
}

impl TestApp {
    pub fn calls(&self) -> Vec<AppCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl AppHandler for TestApp {
    fn app_request(&self, node_id: NodeId, request_id: u32, _deadline: Instant, request: Vec<u8>) -> Result<()> {
        self.calls.lock().unwrap().push(AppCall::Request(node_id, request_id, request));
        if self.fail_on_request {
            return Err(Error::InvalidState("app request".to_owned()));
        }
        Ok(())
    }

    fn app_request_failed(&self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.calls.lock().unwrap().push(AppCall::RequestFailed(node_id, request_id));
        Ok(())
    }

    fn app_response(&self, node_id: NodeId, request_id: u32, response: Vec<u8>) -> Result<()> {
        self.calls.lock().unwrap().push(AppCall::Response(node_id, request_id, response));
        Ok(())
    }

    fn app_gossip(&self, node_id: NodeId, message: Vec<u8>) -> Result<()> {
        self.calls.lock().unwrap().push(AppCall::Gossip(node_id, message));
        Ok(())
    }
}
