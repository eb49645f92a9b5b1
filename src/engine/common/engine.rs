use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tracing::debug;

use super::ChainContext;
use crate::engine::Result;
use crate::vm::VmMessage;
use crate::zfx_id::{Id, NodeId};

fn dropped(engine: &str, op: &str, node_id: &NodeId) -> Result<()> {
    debug!("[{}] {} is not handling {} from {}", "engine".blue(), engine, op, node_id);
    Ok(())
}

/// Callbacks driven by the chain's handler, one at a time.
///
/// An error returned from any callback is fatal for the chain. Messages the engine has no use
/// for in its current phase are dropped.
pub trait Engine: Send {
    fn name(&self) -> &'static str;

    fn context(&self) -> &Arc<ChainContext>;

    /// Starts the engine. `start_request_id` is the first request id it may use.
    fn start(&mut self, start_request_id: u32) -> Result<()>;

    /// The last request id the engine used, so that the next engine does not reuse it.
    fn last_request_id(&self) -> u32 {
        0
    }

    fn get_accepted_frontier(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "GetAcceptedFrontier", &node_id)
    }

    fn accepted_frontier(&mut self, node_id: NodeId, _request_id: u32, _container_ids: Vec<Id>) -> Result<()> {
        dropped(self.name(), "AcceptedFrontier", &node_id)
    }

    fn get_accepted_frontier_failed(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "GetAcceptedFrontierFailed", &node_id)
    }

    fn get_accepted(&mut self, node_id: NodeId, _request_id: u32, _container_ids: Vec<Id>) -> Result<()> {
        dropped(self.name(), "GetAccepted", &node_id)
    }

    fn accepted(&mut self, node_id: NodeId, _request_id: u32, _container_ids: Vec<Id>) -> Result<()> {
        dropped(self.name(), "Accepted", &node_id)
    }

    fn get_accepted_failed(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "GetAcceptedFailed", &node_id)
    }

    fn get_ancestors(&mut self, node_id: NodeId, _request_id: u32, _container_id: Id) -> Result<()> {
        dropped(self.name(), "GetAncestors", &node_id)
    }

    fn ancestors(&mut self, node_id: NodeId, _request_id: u32, _containers: Vec<Vec<u8>>) -> Result<()> {
        dropped(self.name(), "Ancestors", &node_id)
    }

    fn get_ancestors_failed(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "GetAncestorsFailed", &node_id)
    }

    fn get(&mut self, node_id: NodeId, _request_id: u32, _container_id: Id) -> Result<()> {
        dropped(self.name(), "Get", &node_id)
    }

    fn put(&mut self, node_id: NodeId, _request_id: u32, _container: Vec<u8>) -> Result<()> {
        dropped(self.name(), "Put", &node_id)
    }

    fn get_failed(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "GetFailed", &node_id)
    }

    fn push_query(&mut self, node_id: NodeId, _request_id: u32, _container: Vec<u8>) -> Result<()> {
        dropped(self.name(), "PushQuery", &node_id)
    }

    fn pull_query(&mut self, node_id: NodeId, _request_id: u32, _container_id: Id) -> Result<()> {
        dropped(self.name(), "PullQuery", &node_id)
    }

    fn chits(&mut self, node_id: NodeId, _request_id: u32, _votes: Vec<Id>) -> Result<()> {
        dropped(self.name(), "Chits", &node_id)
    }

    fn query_failed(&mut self, node_id: NodeId, _request_id: u32) -> Result<()> {
        dropped(self.name(), "QueryFailed", &node_id)
    }

    fn connected(&mut self, _node_id: NodeId) -> Result<()> {
        Ok(())
    }

    fn disconnected(&mut self, _node_id: NodeId) -> Result<()> {
        Ok(())
    }

    fn gossip(&mut self) -> Result<()> {
        Ok(())
    }

    /// A timeout registered through the chain context fired.
    fn timeout(&mut self) -> Result<()> {
        Ok(())
    }

    fn notify(&mut self, message: VmMessage) -> Result<()> {
        debug!("[{}] {} is not handling {:?}", "engine".blue(), self.name(), message);
        Ok(())
    }

    /// Stops in-progress work early. Called from outside the engine lock, so it only flags the
    /// chain context.
    fn halt(&self) {
        self.context().halt();
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Serves containers to peers.
pub trait GetHandler {
    fn get_accepted_frontier(&self, node_id: NodeId, request_id: u32) -> Result<()>;

    /// Answers with the subset of `container_ids` that is accepted locally.
    fn get_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()>;

    fn get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()>;

    fn get(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()>;
}

/// Limits on a single `Ancestors` response.
#[derive(Debug, Clone, PartialEq)]
pub struct GetterConfig {
    pub max_containers: usize,
    pub max_bytes: usize,
    pub max_time: Duration,
}

impl Default for GetterConfig {
    fn default() -> Self {
        GetterConfig { max_containers: 2000, max_bytes: 2 * 1024 * 1024, max_time: Duration::from_millis(50) }
    }
}

/// Application level messages. Handled concurrently and outside the engine lock.
pub trait AppHandler: Send + Sync {
    fn app_request(&self, node_id: NodeId, request_id: u32, deadline: Instant, request: Vec<u8>) -> Result<()>;

    fn app_request_failed(&self, node_id: NodeId, request_id: u32) -> Result<()>;

    fn app_response(&self, node_id: NodeId, request_id: u32, response: Vec<u8>) -> Result<()>;

    fn app_gossip(&self, node_id: NodeId, message: Vec<u8>) -> Result<()>;
}
