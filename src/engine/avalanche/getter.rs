use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use tracing::debug;

use super::{Manager, Vertex};
use crate::consensus::Status;
use crate::engine::common::{GetHandler, GetterConfig, Sender};
use crate::engine::Result;
use crate::zfx_id::{Id, NodeId};

/// Size of the length prefix of each container in an `Ancestors` message, and of the
/// container count.
const LEN_PREFIX: usize = 4;

/// Serves the vertices of a DAG chain to peers.
pub struct Getter {
    manager: Arc<dyn Manager>,
    sender: Arc<dyn Sender>,
    config: GetterConfig,
}

impl Getter {
    pub fn new(manager: Arc<dyn Manager>, sender: Arc<dyn Sender>, config: GetterConfig) -> Self {
        Getter { manager, sender, config }
    }

    // Storage failures are answered as if the vertex was unknown
    fn lookup(&self, id: &Id) -> Option<Vertex> {
        match self.manager.get_vtx(id) {
            Ok(vtx) => vtx.filter(|v| v.status() != Status::Unknown),
            Err(err) => {
                debug!("[{}] failed to read vertex {}: {}", "getter".cyan(), id, err);
                None
            }
        }
    }

    /// Collects `root` and its ancestors in breadth first order, within the configured limits.
    pub fn ancestors(&self, root: Vertex) -> Vec<Vec<u8>> {
        let started = Instant::now();
        let mut visited = HashSet::new();
        visited.insert(root.id());
        let mut queue = VecDeque::new();
        queue.push_back(root);

        let mut containers = vec![];
        let mut total = LEN_PREFIX;
        while containers.len() < self.config.max_containers && started.elapsed() < self.config.max_time {
            let vtx = match queue.pop_front() {
                Some(vtx) => vtx,
                None => break,
            };
            let len = total + LEN_PREFIX + vtx.bytes().len();
            if len > self.config.max_bytes {
                break;
            }
            total = len;
            for parent_id in vtx.parents() {
                if visited.contains(parent_id) {
                    continue;
                }
                // The peer can fetch parents we do not have from someone else
                if let Some(parent) = self.lookup(parent_id) {
                    visited.insert(*parent_id);
                    queue.push_back(parent);
                }
            }
            containers.push(vtx.bytes().to_vec());
        }
        containers
    }
}

impl GetHandler for Getter {
    fn get_accepted_frontier(&self, node_id: NodeId, request_id: u32) -> Result<()> {
        match self.manager.edge() {
            Ok(edge) => self.sender.send_accepted_frontier(node_id, request_id, edge),
            Err(err) => debug!(
                "[{}] dropping GetAcceptedFrontier({}) from {}: {}",
                "getter".cyan(),
                request_id,
                node_id,
                err
            ),
        }
        Ok(())
    }

    fn get_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        let accepted = container_ids
            .into_iter()
            .filter(|id| matches!(self.lookup(id), Some(vtx) if vtx.status() == Status::Accepted))
            .collect();
        self.sender.send_accepted(node_id, request_id, accepted);
        Ok(())
    }

    fn get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        let root = match self.lookup(&container_id) {
            Some(root) => root,
            None => {
                debug!(
                    "[{}] dropping GetAncestors({}) from {} for unknown vertex {}",
                    "getter".cyan(),
                    request_id,
                    node_id,
                    container_id
                );
                return Ok(());
            }
        };
        let containers = self.ancestors(root);
        self.sender.send_ancestors(node_id, request_id, containers);
        Ok(())
    }

    fn get(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        if let Some(vtx) = self.lookup(&container_id) {
            self.sender.send_put(node_id, request_id, vtx.bytes().to_vec());
        }
        Ok(())
    }
}
