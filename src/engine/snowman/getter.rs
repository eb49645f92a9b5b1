use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use tracing::debug;

use crate::consensus::{Decidable, Status};
use crate::engine::common::{GetHandler, GetterConfig, Sender};
use crate::engine::Result;
use crate::vm::{Block, ChainVm};
use crate::zfx_id::{Id, NodeId};

const LEN_PREFIX: usize = 4;

/// Serves the blocks of a linear chain to peers.
pub struct Getter {
    vm: Arc<dyn ChainVm>,
    sender: Arc<dyn Sender>,
    config: GetterConfig,
}

impl Getter {
    pub fn new(vm: Arc<dyn ChainVm>, sender: Arc<dyn Sender>, config: GetterConfig) -> Self {
        Getter { vm, sender, config }
    }

    fn lookup(&self, id: &Id) -> Option<Arc<dyn Block>> {
        match self.vm.get_block(id) {
            Ok(block) if block.status() != Status::Unknown => Some(block),
            Ok(_) => None,
            Err(err) => {
                debug!("[{}] block {} not available: {}", "getter".cyan(), id, err);
                None
            }
        }
    }

    /// `root` followed by its ancestors, newest first, within the configured limits.
    pub fn ancestors(&self, root: Arc<dyn Block>) -> Vec<Vec<u8>> {
        let started = Instant::now();
        let mut containers = vec![];
        let mut total = LEN_PREFIX;
        let mut next = Some(root);
        while containers.len() < self.config.max_containers && started.elapsed() < self.config.max_time {
            let block = match next.take() {
                Some(block) => block,
                None => break,
            };
            let len = total + LEN_PREFIX + block.bytes().len();
            if len > self.config.max_bytes {
                break;
            }
            total = len;
            containers.push(block.bytes().to_vec());
            if block.height() > 0 {
                next = self.lookup(&block.parent());
            }
        }
        containers
    }
}

impl GetHandler for Getter {
    fn get_accepted_frontier(&self, node_id: NodeId, request_id: u32) -> Result<()> {
        match self.vm.last_accepted() {
            Ok(last_accepted) => self.sender.send_accepted_frontier(node_id, request_id, vec![last_accepted]),
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
            .filter(|id| matches!(self.lookup(id), Some(block) if block.status() == Status::Accepted))
            .collect();
        self.sender.send_accepted(node_id, request_id, accepted);
        Ok(())
    }

    fn get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        match self.lookup(&container_id) {
            Some(root) => {
                let containers = self.ancestors(root);
                self.sender.send_ancestors(node_id, request_id, containers);
            }
            None => debug!(
                "[{}] dropping GetAncestors({}) from {} for unknown block {}",
                "getter".cyan(),
                request_id,
                node_id,
                container_id
            ),
        }
        Ok(())
    }

    fn get(&self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        if let Some(block) = self.lookup(&container_id) {
            self.sender.send_put(node_id, request_id, block.bytes().to_vec());
        }
        Ok(())
    }
}
