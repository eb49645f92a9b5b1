use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use colored::Colorize;
use tracing::{debug, error, info, warn};

use super::{Config, Getter};
use crate::consensus::poll::{self, EarlyTermNoTraversalFactory};
use crate::consensus::snowman::Topological;
use crate::consensus::{Blockable, Blocker, Decidable, Parameters, Status};
use crate::engine::common::{self, ChainContext, Engine, EngineState, GetHandler, Requests, Sender};
use crate::engine::Result;
use crate::util::Bag;
use crate::validators;
use crate::vm::{Block, ChainVm, VmMessage};
use crate::zfx_id::{Id, NodeId};

/// Work waiting for blocks to be issued into consensus.
enum Job {
    /// Add a block once its parent has been issued.
    Issue { block: Arc<dyn Block>, deps: HashSet<Id>, abandoned: bool },
    /// Answer a query once the queried block has been issued.
    Convince { node_id: NodeId, request_id: u32, deps: HashSet<Id>, abandoned: bool },
    /// Count a vote once the voted block has been issued. `None` drops the voter.
    Vote { node_id: NodeId, request_id: u32, vote: Option<Id>, deps: HashSet<Id> },
}

impl Blockable for Job {
    fn dependencies(&self) -> &HashSet<Id> {
        match self {
            Job::Issue { deps, .. } | Job::Convince { deps, .. } | Job::Vote { deps, .. } => deps,
        }
    }

    fn fulfill(&mut self, id: &Id) {
        match self {
            Job::Issue { deps, .. } | Job::Convince { deps, .. } | Job::Vote { deps, .. } => {
                deps.remove(id);
            }
        }
    }

    fn abandon(&mut self, id: &Id) {
        match self {
            Job::Issue { abandoned, .. } | Job::Convince { abandoned, .. } => *abandoned = true,
            // A vote for a block that will never be issued still completes the voter's answer
            Job::Vote { deps, .. } => {
                deps.remove(id);
            }
        }
    }
}

/// The Snowman consensus engine of a bootstrapped chain.
pub struct Transitive {
    ctx: Arc<ChainContext>,
    vm: Arc<dyn ChainVm>,
    sender: Arc<dyn Sender>,
    validators: Arc<validators::Set>,
    params: Parameters,
    getter: Getter,

    consensus: Topological,
    polls: poll::Set,
    request_id: u32,
    // outstanding `Get`s
    blk_reqs: Requests,
    // blocks waiting for an ancestor before they can be issued
    pending: HashMap<Id, Arc<dyn Block>>,
    blocked: Blocker<Job>,
    pending_builds: usize,
}

impl Transitive {
    pub fn new(config: Config) -> Result<Self> {
        let (last_accepted, height) = Self::last_accepted(config.vm.as_ref())?;
        let consensus = Topological::new(config.params.clone(), last_accepted, height)?;
        let getter = Getter::new(config.vm.clone(), config.sender.clone(), config.getter.clone());
        Ok(Transitive {
            polls: poll::Set::new(Box::new(EarlyTermNoTraversalFactory::new(config.params.alpha))),
            ctx: config.ctx,
            vm: config.vm,
            sender: config.sender,
            validators: config.validators,
            params: config.params,
            getter,
            consensus,
            request_id: 0,
            blk_reqs: Requests::new(),
            pending: HashMap::new(),
            blocked: Blocker::new(),
            pending_builds: 0,
        })
    }

    fn last_accepted(vm: &dyn ChainVm) -> Result<(Id, u64)> {
        let id = vm.last_accepted()?;
        let block = vm.get_block(&id)?;
        Ok((id, block.height()))
    }

    /// Tip of the preferred chain.
    pub fn preference(&self) -> Id {
        self.consensus.preference()
    }

    pub fn num_processing(&self) -> usize {
        self.consensus.num_processing()
    }

    pub fn num_polls(&self) -> usize {
        self.polls.len()
    }

    fn next_request_id(&mut self) -> u32 {
        self.request_id = common::next_request_id(self.request_id);
        self.request_id
    }

    fn get_block(&self, id: &Id) -> Option<Arc<dyn Block>> {
        if let Some(block) = self.pending.get(id) {
            return Some(block.clone());
        }
        self.vm.get_block(id).ok()
    }

    fn was_issued(&self, block: &dyn Block) -> bool {
        let id = block.id();
        self.consensus.decided(block) || self.consensus.processing(&id) || self.pending.contains_key(&id)
    }

    /// Issues `block` and every ancestor we have, asking `node_id` for the first ancestor we
    /// are missing. Returns whether `block` is now decided or processing.
    fn issue_from(&mut self, node_id: NodeId, block: Arc<dyn Block>) -> Result<bool> {
        let root = block.clone();
        let mut block = block;
        while !self.was_issued(block.as_ref()) {
            self.issue(block.clone())?;
            let parent_id = block.parent();
            match self.get_block(&parent_id) {
                Some(parent) if parent.status().fetched() => block = parent,
                _ => {
                    self.send_request(node_id, parent_id);
                    return Ok(false);
                }
            }
        }
        let id = block.id();
        self.blk_reqs.remove_any(&id);
        if self.consensus.decided(block.as_ref()) || self.consensus.processing(&id) {
            // Nothing can still be waiting on a block that is already in consensus
            let abandoned = self.blocked.abandon(&id);
            self.run(abandoned)?;
        }
        Ok(self.consensus.decided(root.as_ref()) || self.consensus.processing(&root.id()))
    }

    /// Whether `id` may still be issued: it is waiting on an ancestor or being fetched.
    fn awaiting(&self, id: &Id) -> bool {
        self.pending.contains_key(id) || self.blk_reqs.contains(id)
    }

    fn issue_from_id(&mut self, node_id: NodeId, id: Id) -> Result<bool> {
        match self.get_block(&id) {
            Some(block) => self.issue_from(node_id, block),
            None => {
                self.send_request(node_id, id);
                Ok(false)
            }
        }
    }

    /// Issues a block built locally, whose ancestry must already be known.
    fn issue_with_ancestors(&mut self, block: Arc<dyn Block>) -> Result<bool> {
        let mut id = block.id();
        let mut next = Some(block);
        while let Some(block) = next.take() {
            id = block.id();
            if !block.status().fetched() {
                break;
            }
            if self.was_issued(block.as_ref()) {
                if self.consensus.decided(block.as_ref()) || self.consensus.processing(&id) {
                    return Ok(true);
                }
                break;
            }
            self.issue(block.clone())?;
            id = block.parent();
            next = self.get_block(&id);
        }
        if self.blk_reqs.contains(&id) {
            return Ok(false);
        }
        let abandoned = self.blocked.abandon(&id);
        self.run(abandoned)?;
        Ok(false)
    }

    fn issue(&mut self, block: Arc<dyn Block>) -> Result<()> {
        let id = block.id();
        self.pending.insert(id, block.clone());
        self.blk_reqs.remove_any(&id);

        let parent_id = block.parent();
        let mut deps = HashSet::new();
        let parent_issued = match self.vm.get_block(&parent_id) {
            Ok(parent) => self.consensus.decided(parent.as_ref()) || self.consensus.processing(&parent_id),
            Err(_) => false,
        };
        if !parent_issued {
            deps.insert(parent_id);
        }
        if let Some(job) = self.blocked.register(Job::Issue { block, deps, abandoned: false }) {
            self.run(vec![job])?;
        }
        Ok(())
    }

    fn send_request(&mut self, node_id: NodeId, id: Id) {
        if self.blk_reqs.contains(&id) {
            return;
        }
        let request_id = self.next_request_id();
        self.blk_reqs.add(node_id, request_id, id);
        debug!("[{}] fetching {} from {}", "snowman".blue(), id, node_id);
        self.sender.send_get(node_id, request_id, id);
    }

    /// Runs jobs released by the blocker, and every job they release in turn.
    fn run(&mut self, jobs: Vec<Job>) -> Result<()> {
        let mut queue: VecDeque<Job> = jobs.into();
        while let Some(job) = queue.pop_front() {
            match job {
                Job::Issue { block, abandoned: false, .. } => {
                    let released = self.deliver(block)?;
                    queue.extend(released);
                }
                Job::Issue { block, abandoned: true, .. } => {
                    let id = block.id();
                    self.pending.remove(&id);
                    self.blk_reqs.remove_any(&id);
                    queue.extend(self.blocked.abandon(&id));
                }
                Job::Convince { node_id, request_id, abandoned, .. } => {
                    if !abandoned {
                        self.sender.send_chits(node_id, request_id, vec![self.consensus.preference()]);
                    }
                }
                Job::Vote { node_id, request_id, vote, .. } => {
                    let results = match vote {
                        Some(vote) => self.polls.vote(request_id, &node_id, vote),
                        None => self.polls.drop(request_id, &node_id),
                    };
                    self.apply_polls(results)?;
                }
            }
        }
        Ok(())
    }

    /// Adds `block` to consensus. Returns the jobs that were waiting on it.
    fn deliver(&mut self, block: Arc<dyn Block>) -> Result<Vec<Job>> {
        if self.consensus.decided(block.as_ref()) {
            return Ok(vec![]);
        }
        let id = block.id();
        self.pending.remove(&id);

        if !self.consensus.accepted_or_processing(&block.parent()) {
            debug!("[{}] dropping {}: parent was rejected", "snowman".blue(), id);
            return Ok(self.blocked.abandon(&id));
        }
        if let Err(err) = block.verify() {
            debug!("[{}] dropping {}: {}", "snowman".blue(), id, err);
            return Ok(self.blocked.abandon(&id));
        }
        let decisions = self.consensus.add(block.clone())?;
        if !decisions.rejected.contains(&id) && self.consensus.is_preferred(&id) {
            self.send_push_query(block.as_ref());
        }
        let released = self.blocked.fulfill(&id);
        self.repoll();
        self.vm.set_preference(self.consensus.preference())?;
        Ok(released)
    }

    fn sample(&self) -> Option<Bag<NodeId>> {
        match self.validators.sample(self.params.k) {
            Ok(sampled) => Some(sampled.into_iter().collect()),
            Err(err) => {
                error!("[{}] not enough validators to poll: {}", "snowman".blue(), err);
                None
            }
        }
    }

    /// Polls the network with a block it may not have yet.
    fn send_push_query(&mut self, block: &dyn Block) {
        let vdrs = match self.sample() {
            Some(vdrs) => vdrs,
            None => return,
        };
        let request_id = self.next_request_id();
        let node_ids: HashSet<NodeId> = vdrs.list().into_iter().collect();
        if self.polls.add(request_id, vdrs) {
            self.sender.send_push_query(node_ids, request_id, block.bytes().to_vec());
        }
    }

    fn send_pull_query(&mut self, id: Id) {
        let vdrs = match self.sample() {
            Some(vdrs) => vdrs,
            None => return,
        };
        let request_id = self.next_request_id();
        let node_ids: HashSet<NodeId> = vdrs.list().into_iter().collect();
        if self.polls.add(request_id, vdrs) {
            self.sender.send_pull_query(node_ids, request_id, id);
        }
    }

    /// Keeps `concurrent_repolls` polls running while there is something to decide.
    fn repoll(&mut self) {
        let preference = self.consensus.preference();
        for _ in self.polls.len()..self.params.concurrent_repolls {
            self.send_pull_query(preference);
        }
    }

    fn apply_polls(&mut self, results: Vec<Bag<Id>>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        for votes in results.iter() {
            let decisions = self.consensus.record_poll(votes)?;
            for id in decisions.accepted.iter() {
                info!("[{}] accepted {}", "snowman".blue(), id);
            }
            for id in decisions.rejected.iter() {
                debug!("[{}] rejected {}", "snowman".blue(), id);
            }
        }
        self.vm.set_preference(self.consensus.preference())?;
        if self.consensus.finalized() {
            debug!("[{}] nothing left to decide", "snowman".blue());
            return Ok(());
        }
        self.repoll();
        Ok(())
    }

    fn build_blocks(&mut self) -> Result<()> {
        while self.pending_builds > 0 && self.consensus.num_processing() < self.params.optimal_processing {
            self.pending_builds -= 1;
            let block = match self.vm.build_block() {
                Ok(block) => block,
                Err(err) => {
                    debug!("[{}] failed to build a block: {}", "snowman".blue(), err);
                    return Ok(());
                }
            };
            if block.status() != Status::Processing {
                warn!("[{}] built block {} is {:?}", "snowman".blue(), block.id(), block.status());
            }
            if block.parent() != self.consensus.preference() {
                warn!("[{}] built block {} is not on the preferred chain", "snowman".blue(), block.id());
            }
            let id = block.id();
            if !self.issue_with_ancestors(block)? {
                warn!("[{}] built block {} was not issued", "snowman".blue(), id);
            }
        }
        Ok(())
    }
}

impl Engine for Transitive {
    fn name(&self) -> &'static str {
        "snowman"
    }

    fn context(&self) -> &Arc<ChainContext> {
        &self.ctx
    }

    fn start(&mut self, start_request_id: u32) -> Result<()> {
        self.request_id = start_request_id;
        let (last_accepted, height) = Self::last_accepted(self.vm.as_ref())?;
        self.consensus = Topological::new(self.params.clone(), last_accepted, height)?;
        self.vm.set_preference(last_accepted)?;
        info!("[{}] consensus starting at {} (height {})", "snowman".blue(), last_accepted, height);
        self.ctx.set_state(EngineState::NormalOp);
        Ok(())
    }

    fn last_request_id(&self) -> u32 {
        self.request_id
    }

    fn get_accepted_frontier(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.getter.get_accepted_frontier(node_id, request_id)
    }

    fn get_accepted(&mut self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        self.getter.get_accepted(node_id, request_id, container_ids)
    }

    fn get_ancestors(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        self.getter.get_ancestors(node_id, request_id, container_id)
    }

    fn get(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        self.getter.get(node_id, request_id, container_id)
    }

    fn put(&mut self, node_id: NodeId, request_id: u32, container: Vec<u8>) -> Result<()> {
        let block = match self.vm.parse_block(&container) {
            Ok(block) => block,
            Err(err) => {
                debug!("[{}] failed to parse block from {}: {}", "snowman".blue(), node_id, err);
                return self.get_failed(node_id, request_id);
            }
        };
        let id = block.id();
        if let Some(expected) = self.blk_reqs.remove(&node_id, request_id) {
            if expected != id {
                debug!("[{}] {} sent {} instead of {}", "snowman".blue(), node_id, id, expected);
                self.blk_reqs.add(node_id, request_id, expected);
                return self.get_failed(node_id, request_id);
            }
        }
        self.issue_from(node_id, block)?;
        self.build_blocks()
    }

    fn get_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        let id = match self.blk_reqs.remove(&node_id, request_id) {
            Some(id) => id,
            None => {
                debug!("[{}] unexpected GetFailed({}) from {}", "snowman".blue(), request_id, node_id);
                return Ok(());
            }
        };
        let abandoned = self.blocked.abandon(&id);
        self.run(abandoned)?;
        self.build_blocks()
    }

    fn push_query(&mut self, node_id: NodeId, request_id: u32, container: Vec<u8>) -> Result<()> {
        let block = match self.vm.parse_block(&container) {
            Ok(block) => block,
            Err(err) => {
                debug!("[{}] failed to parse queried block from {}: {}", "snowman".blue(), node_id, err);
                return Ok(());
            }
        };
        let id = block.id();
        self.issue_from(node_id, block)?;
        self.pull_query(node_id, request_id, id)
    }

    fn pull_query(&mut self, node_id: NodeId, request_id: u32, container_id: Id) -> Result<()> {
        let mut deps = HashSet::new();
        if !self.issue_from_id(node_id, container_id)? {
            if !self.awaiting(&container_id) {
                // The querier's request times out instead
                debug!("[{}] {} queried dropped block {}", "snowman".blue(), node_id, container_id);
                return Ok(());
            }
            deps.insert(container_id);
        }
        let job = Job::Convince { node_id, request_id, deps, abandoned: false };
        if let Some(job) = self.blocked.register(job) {
            self.run(vec![job])?;
        }
        Ok(())
    }

    fn chits(&mut self, node_id: NodeId, request_id: u32, votes: Vec<Id>) -> Result<()> {
        if votes.len() != 1 {
            debug!("[{}] {} voted for {} blocks", "snowman".blue(), node_id, votes.len());
            return self.query_failed(node_id, request_id);
        }
        let vote = votes[0];
        let mut deps = HashSet::new();
        if !self.issue_from_id(node_id, vote)? && self.awaiting(&vote) {
            deps.insert(vote);
        }
        let job = Job::Vote { node_id, request_id, vote: Some(vote), deps };
        if let Some(job) = self.blocked.register(job) {
            self.run(vec![job])?;
        }
        Ok(())
    }

    fn query_failed(&mut self, node_id: NodeId, request_id: u32) -> Result<()> {
        self.run(vec![Job::Vote { node_id, request_id, vote: None, deps: HashSet::new() }])
    }

    fn gossip(&mut self) -> Result<()> {
        let id = self.vm.last_accepted()?;
        match self.vm.get_block(&id) {
            Ok(block) => self.sender.send_gossip(block.bytes().to_vec()),
            Err(err) => warn!("[{}] cannot gossip last accepted {}: {}", "snowman".blue(), id, err),
        }
        Ok(())
    }

    fn notify(&mut self, message: VmMessage) -> Result<()> {
        match message {
            VmMessage::PendingTxs => {
                self.pending_builds += 1;
                self.build_blocks()
            }
            other => {
                debug!("[{}] ignoring {:?}", "snowman".blue(), other);
                Ok(())
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        info!("[{}] shutting down", "snowman".blue());
        self.vm.shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allychains::Allychain;
    use crate::consensus::snowman::testing::TestBlock;
    use crate::engine::common::testing::{Sent, TestSender};
    use crate::engine::common::GetterConfig;
    use crate::vm::testing::TestVm;

    struct Fixture {
        engine: Transitive,
        vm: Arc<TestVm>,
        sender: Arc<TestSender>,
        genesis: Arc<TestBlock>,
        vdr: NodeId,
    }

    fn fixture() -> Fixture {
        let genesis = TestBlock::genesis();
        let vm = TestVm::new(genesis.clone());
        let sender = TestSender::new();
        let vdr = Id::new(b"validator");
        let validators = Arc::new(validators::Set::new());
        validators.add_weight(vdr, 1).unwrap();
        let (ctx, _) = ChainContext::new(
            1,
            Arc::new(Allychain::new(Id::zero())),
            Id::one(),
            Id::two(),
            EngineState::Bootstrapping,
        );
        let config = Config {
            ctx,
            vm: vm.clone(),
            sender: sender.clone(),
            validators: validators.clone(),
            beacons: validators,
            params: Parameters {
                k: 1,
                alpha: 1,
                beta_virtuous: 1,
                beta_rogue: 2,
                concurrent_repolls: 1,
                ..Parameters::default()
            },
            getter: GetterConfig::default(),
        };
        let mut engine = Transitive::new(config).unwrap();
        engine.start(0).unwrap();
        Fixture { engine, vm, sender, genesis, vdr }
    }

    #[test]
    fn test_start_enters_normal_op() {
        let f = fixture();
        assert_eq!(f.engine.context().state(), EngineState::NormalOp);
        assert_eq!(f.engine.preference(), f.genesis.id());
    }

    #[test]
    fn test_built_block_is_queried_and_accepted() {
        let mut f = fixture();
        let a = TestBlock::child_of(&f.genesis, b"a");
        f.vm.queue_build(a.clone());
        f.engine.notify(VmMessage::PendingTxs).unwrap();
        assert_eq!(f.engine.preference(), a.id());
        assert_eq!(f.vm.preference(), a.id());

        let sent = f.sender.take();
        assert_eq!(sent, vec![Sent::PushQuery(vec![f.vdr], 1, a.bytes().to_vec())]);

        f.engine.chits(f.vdr, 1, vec![a.id()]).unwrap();
        assert_eq!(a.status(), Status::Accepted);
        assert_eq!(f.engine.num_processing(), 0);
        assert_eq!(f.engine.num_polls(), 0);
    }

    #[test]
    fn test_missing_parent_is_fetched() {
        let mut f = fixture();
        let a = TestBlock::child_of(&f.genesis, b"a");
        let b = TestBlock::child_of(&a, b"b");
        let peer = Id::new(b"peer");

        f.engine.push_query(peer, 9, b.bytes().to_vec()).unwrap();
        assert_eq!(f.sender.take(), vec![Sent::Get(peer, 1, a.id())]);
        assert_eq!(f.engine.num_processing(), 0);

        f.engine.put(peer, 1, a.bytes().to_vec()).unwrap();
        assert_eq!(f.engine.num_processing(), 2);
        assert_eq!(f.engine.preference(), b.id());
        let sent = f.sender.take();
        // The querier gets our preference once b is issued
        assert!(sent.contains(&Sent::Chits(peer, 9, vec![b.id()])));
    }

    #[test]
    fn test_failed_get_drops_the_query_answer() {
        let mut f = fixture();
        let a = TestBlock::child_of(&f.genesis, b"a");
        let peer = Id::new(b"peer");

        f.engine.pull_query(peer, 7, a.id()).unwrap();
        assert_eq!(f.sender.take(), vec![Sent::Get(peer, 1, a.id())]);
        f.engine.get_failed(peer, 1).unwrap();
        assert!(f.sender.take().is_empty());
        // Unknown requests are ignored
        f.engine.get_failed(peer, 1).unwrap();
    }

    #[test]
    fn test_query_failed_finishes_poll() {
        let mut f = fixture();
        let a = TestBlock::child_of(&f.genesis, b"a");
        f.vm.queue_build(a.clone());
        f.engine.notify(VmMessage::PendingTxs).unwrap();
        f.sender.take();
        assert_eq!(f.engine.num_polls(), 1);

        f.engine.query_failed(f.vdr, 1).unwrap();
        assert_eq!(a.status(), Status::Processing);
        // The failed poll is replaced by a repoll of the preference
        assert_eq!(f.sender.take(), vec![Sent::PullQuery(vec![f.vdr], 2, a.id())]);
        assert_eq!(f.engine.num_polls(), 1);

        f.engine.chits(f.vdr, 2, vec![a.id()]).unwrap();
        assert_eq!(a.status(), Status::Accepted);
    }

    #[test]
    fn test_invalid_block_is_dropped() {
        let mut f = fixture();
        let bad = TestBlock::invalid_child_of(&f.genesis, b"bad");
        let peer = Id::new(b"peer");
        f.vm.insert(bad.clone());
        f.engine.pull_query(peer, 3, bad.id()).unwrap();
        assert_eq!(f.engine.num_processing(), 0);
        assert!(f.sender.take().is_empty());
    }

    #[test]
    fn test_gossip_sends_last_accepted() {
        let mut f = fixture();
        f.engine.gossip().unwrap();
        assert_eq!(f.sender.take(), vec![Sent::Gossip(f.genesis.bytes().to_vec())]);
    }
}
