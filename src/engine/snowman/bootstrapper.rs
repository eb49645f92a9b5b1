use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, info, warn};

use super::{Config, Getter};
use crate::consensus::{Decidable, Status};
use crate::engine::common::{self, ChainContext, Engine, EngineState, GetHandler, Requests, Sender};
use crate::engine::Result;
use crate::validators;
use crate::vm::{Block, ChainVm};
use crate::zfx_id::{Id, NodeId};

/// How long to wait before asking the beacons again after a failed round.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for enough beacon weight to connect.
    Connecting,
    Frontier,
    Accepted,
    Fetching,
    /// Waiting for the retry timeout.
    Waiting,
    Done,
}

/// Catches a chain up with the beacons before it takes part in consensus.
///
/// 1. Asks every beacon for its accepted frontier.
/// 2. Asks every beacon which of the union of the frontiers it has accepted, and keeps the
///    blocks accepted by more than half of the beacon weight.
/// 3. Fetches the missing ancestry of those blocks with `GetAncestors`.
/// 4. Accepts the fetched blocks in height order and moves the chain to normal operation.
pub struct Bootstrapper {
    ctx: Arc<ChainContext>,
    vm: Arc<dyn ChainVm>,
    sender: Arc<dyn Sender>,
    beacons: Arc<validators::Set>,
    getter: Getter,

    phase: Phase,
    started: bool,
    request_id: u32,
    connected: HashSet<NodeId>,

    pending_frontier: HashSet<NodeId>,
    frontier: HashSet<Id>,
    pending_accepted: HashSet<NodeId>,
    responded_weight: u64,
    accepted_weight: HashMap<Id, u64>,

    outstanding: Requests,
    // fetched blocks above the last accepted block, waiting to be executed
    to_execute: HashMap<Id, Arc<dyn Block>>,
    last_accepted_height: u64,
}

impl Bootstrapper {
    pub fn new(config: Config) -> Self {
        let getter = Getter::new(config.vm.clone(), config.sender.clone(), config.getter.clone());
        Bootstrapper {
            ctx: config.ctx,
            vm: config.vm,
            sender: config.sender,
            beacons: config.beacons,
            getter,
            phase: Phase::Connecting,
            started: false,
            request_id: 0,
            connected: HashSet::new(),
            pending_frontier: HashSet::new(),
            frontier: HashSet::new(),
            pending_accepted: HashSet::new(),
            responded_weight: 0,
            accepted_weight: HashMap::new(),
            outstanding: Requests::new(),
            to_execute: HashMap::new(),
            last_accepted_height: 0,
        }
    }

    /// Beacon weight needed to trust a response.
    fn alpha(&self) -> u64 {
        self.beacons.weight() / 2 + 1
    }

    fn connected_weight(&self) -> u64 {
        self.connected.iter().map(|id| self.beacons.get_weight(id)).sum()
    }

    fn next_request_id(&mut self) -> u32 {
        self.request_id = common::next_request_id(self.request_id);
        self.request_id
    }

    fn beacon_ids(&self) -> HashSet<NodeId> {
        self.beacons.list().into_iter().map(|(id, _)| id).collect()
    }

    fn start_frontier(&mut self) -> Result<()> {
        if self.beacons.weight() == 0 {
            info!("[{}] no beacons, nothing to bootstrap", "bootstrap".yellow());
            return self.finish();
        }
        if self.connected_weight() < self.alpha() {
            debug!("[{}] waiting for beacons to connect", "bootstrap".yellow());
            self.phase = Phase::Connecting;
            return Ok(());
        }
        let last_accepted = self.vm.last_accepted()?;
        self.last_accepted_height = self.vm.get_block(&last_accepted)?.height();

        self.phase = Phase::Frontier;
        self.frontier.clear();
        self.pending_frontier = self.beacon_ids();
        let request_id = self.next_request_id();
        info!(
            "[{}] fetching accepted frontier from {} beacons",
            "bootstrap".yellow(),
            self.pending_frontier.len()
        );
        self.sender.send_get_accepted_frontier(self.pending_frontier.clone(), request_id);
        Ok(())
    }

    fn on_frontier(&mut self, node_id: NodeId, request_id: u32, ids: Vec<Id>) -> Result<()> {
        if self.phase != Phase::Frontier || request_id != self.request_id || !self.pending_frontier.remove(&node_id) {
            debug!("[{}] unexpected AcceptedFrontier({}) from {}", "bootstrap".yellow(), request_id, node_id);
            return Ok(());
        }
        self.frontier.extend(ids);
        if !self.pending_frontier.is_empty() {
            return Ok(());
        }

        self.phase = Phase::Accepted;
        self.responded_weight = 0;
        self.accepted_weight.clear();
        self.pending_accepted = self.beacon_ids();
        let request_id = self.next_request_id();
        let mut frontier: Vec<Id> = self.frontier.iter().cloned().collect();
        frontier.sort();
        self.sender.send_get_accepted(self.pending_accepted.clone(), request_id, frontier);
        Ok(())
    }

    fn on_accepted(&mut self, node_id: NodeId, request_id: u32, ids: Option<Vec<Id>>) -> Result<()> {
        if self.phase != Phase::Accepted || request_id != self.request_id || !self.pending_accepted.remove(&node_id) {
            debug!("[{}] unexpected Accepted({}) from {}", "bootstrap".yellow(), request_id, node_id);
            return Ok(());
        }
        let weight = self.beacons.get_weight(&node_id);
        if let Some(ids) = ids {
            self.responded_weight = self.responded_weight.saturating_add(weight);
            for id in ids {
                let w = self.accepted_weight.entry(id).or_insert(0);
                *w = w.saturating_add(weight);
            }
        }
        if !self.pending_accepted.is_empty() {
            return Ok(());
        }

        let alpha = self.alpha();
        if self.responded_weight < alpha {
            warn!(
                "[{}] only {} of the {} beacon weight needed answered, retrying",
                "bootstrap".yellow(),
                self.responded_weight,
                alpha
            );
            self.phase = Phase::Waiting;
            self.ctx.register_timeout(RETRY_DELAY);
            return Ok(());
        }
        let mut accepted: Vec<Id> =
            self.accepted_weight.iter().filter(|(_, w)| **w >= alpha).map(|(id, _)| *id).collect();
        accepted.sort();
        info!("[{}] {} blocks accepted by the beacons", "bootstrap".yellow(), accepted.len());

        self.phase = Phase::Fetching;
        for id in accepted {
            self.fetch(id)?;
        }
        self.maybe_finish()
    }

    /// Walks down from `id` through the blocks we have, requesting the first one we don't.
    fn fetch(&mut self, id: Id) -> Result<()> {
        let mut id = id;
        loop {
            if self.outstanding.contains(&id) || self.to_execute.contains_key(&id) {
                return Ok(());
            }
            let block = match self.vm.get_block(&id) {
                Ok(block) if block.status().fetched() => block,
                _ => return self.request(id),
            };
            if block.status() == Status::Accepted || block.height() <= self.last_accepted_height {
                return Ok(());
            }
            id = block.parent();
            self.to_execute.insert(block.id(), block);
        }
    }

    fn request(&mut self, id: Id) -> Result<()> {
        let beacon = match self.beacons.sample(1)?.pop() {
            Some(beacon) => beacon,
            None => return Ok(()),
        };
        let request_id = self.next_request_id();
        self.outstanding.add(beacon, request_id, id);
        debug!("[{}] fetching ancestors of {} from {}", "bootstrap".yellow(), id, beacon);
        self.sender.send_get_ancestors(beacon, request_id, id);
        Ok(())
    }

    fn maybe_finish(&mut self) -> Result<()> {
        if self.phase != Phase::Fetching || !self.outstanding.is_empty() {
            return Ok(());
        }
        let mut blocks: Vec<Arc<dyn Block>> = self.to_execute.drain().map(|(_, b)| b).collect();
        blocks.sort_by_key(|b| b.height());
        info!("[{}] executing {} blocks", "bootstrap".yellow(), blocks.len());
        for block in blocks {
            if self.ctx.is_halted() {
                info!("[{}] halted while executing", "bootstrap".yellow());
                return Ok(());
            }
            if block.status() == Status::Accepted {
                continue;
            }
            block.verify()?;
            block.accept()?;
            debug!("[{}] accepted {} at height {}", "bootstrap".yellow(), block.id(), block.height());
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        self.phase = Phase::Done;
        info!("[{}] chain {} bootstrapped", "bootstrap".yellow(), self.ctx.chain_id);
        self.ctx.set_state(EngineState::NormalOp);
        Ok(())
    }

    fn refetch(&mut self, id: Id) -> Result<()> {
        if self.phase == Phase::Fetching {
            self.request(id)?;
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

impl Engine for Bootstrapper {
    fn name(&self) -> &'static str {
        "bootstrapper"
    }

    fn context(&self) -> &Arc<ChainContext> {
        &self.ctx
    }

    fn start(&mut self, start_request_id: u32) -> Result<()> {
        self.request_id = start_request_id;
        self.started = true;
        self.ctx.allychain().add_chain(self.ctx.chain_id);
        self.start_frontier()
    }

    fn last_request_id(&self) -> u32 {
        self.request_id
    }

    fn get_accepted_frontier(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.getter.get_accepted_frontier(node_id, request_id)
    }

    fn accepted_frontier(&mut self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        self.on_frontier(node_id, request_id, container_ids)
    }

    fn get_accepted_frontier_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        self.on_frontier(node_id, request_id, vec![])
    }

    fn get_accepted(&mut self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        self.getter.get_accepted(node_id, request_id, container_ids)
    }

    fn accepted(&mut self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        self.on_accepted(node_id, request_id, Some(container_ids))
    }

    fn get_accepted_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        self.on_accepted(node_id, request_id, None)
    }

    fn get_ancestors(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        self.getter.get_ancestors(node_id, request_id, container_id)
    }

    fn ancestors(&mut self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        let wanted = match self.outstanding.remove(&node_id, request_id) {
            Some(wanted) => wanted,
            None => {
                debug!("[{}] unexpected Ancestors({}) from {}", "bootstrap".yellow(), request_id, node_id);
                return Ok(());
            }
        };
        let mut blocks = Vec::with_capacity(containers.len());
        for container in containers.iter() {
            match self.vm.parse_block(container) {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    debug!("[{}] bad container from {}: {}", "bootstrap".yellow(), node_id, err);
                    break;
                }
            }
        }
        match blocks.first() {
            Some(first) if first.id() == wanted => {}
            _ => {
                debug!("[{}] {} did not send {}", "bootstrap".yellow(), node_id, wanted);
                self.refetch(wanted)?;
                return self.maybe_finish();
            }
        }
        self.fetch(wanted)?;
        self.maybe_finish()
    }

    fn get_ancestors_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        if self.ctx.is_halted() {
            return Ok(());
        }
        if let Some(wanted) = self.outstanding.remove(&node_id, request_id) {
            self.refetch(wanted)?;
        }
        Ok(())
    }

    fn get(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        self.getter.get(node_id, request_id, container_id)
    }

    fn connected(&mut self, node_id: NodeId) -> Result<()> {
        if !self.beacons.contains(&node_id) || !self.connected.insert(node_id) {
            return Ok(());
        }
        if self.started && self.phase == Phase::Connecting && self.connected_weight() >= self.alpha() {
            return self.start_frontier();
        }
        Ok(())
    }

    fn disconnected(&mut self, node_id: NodeId) -> Result<()> {
        self.connected.remove(&node_id);
        Ok(())
    }

    fn timeout(&mut self) -> Result<()> {
        if self.phase == Phase::Waiting && !self.ctx.is_halted() {
            return self.start_frontier();
        }
        Ok(())
    }
}
