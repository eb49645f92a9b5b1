use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use colored::Colorize;
use tracing::debug;

use super::Block;
use crate::consensus::snowball::Nnary;
use crate::consensus::{Decidable, Decisions, Error, Parameters, Result, Status};
use crate::util::Bag;
use crate::zfx_id::Id;

/// A node of the processing tree. The node of the last accepted block has no `block`.
#[derive(Default)]
struct Node {
    block: Option<Arc<dyn Block>>,
    // Decides between the children; created with the first child
    sb: Option<Nnary>,
    children: HashSet<Id>,
    // Set when the node's branch missed alpha in a poll it was part of
    should_falter: bool,
}

/// Snowman consensus over the tree of processing blocks.
///
/// The tree is rooted at the last accepted block (the head). Every node that has children runs
/// a snowball instance choosing between them. A vote for a block counts for each of its
/// processing ancestors, so a poll is applied to the chain of snowball instances from the
/// head down as far as the votes reach alpha.
pub struct Topological {
    params: Parameters,
    head: Id,
    height: u64,
    nodes: HashMap<Id, Node>,
    // Last block of the preferred branch
    tail: Id,
    preferred: HashSet<Id>,
}

impl Topological {
    pub fn new(params: Parameters, last_accepted: Id, height: u64) -> Result<Self> {
        params.verify()?;
        let mut nodes = HashMap::new();
        nodes.insert(last_accepted, Node::default());
        Ok(Topological {
            params,
            head: last_accepted,
            height,
            nodes,
            tail: last_accepted,
            preferred: HashSet::new(),
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn last_accepted(&self) -> (Id, u64) {
        (self.head, self.height)
    }

    pub fn num_processing(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn processing(&self, id: &Id) -> bool {
        *id != self.head && self.nodes.contains_key(id)
    }

    /// Whether `block` is already decided, as far as this instance can tell.
    pub fn decided(&self, block: &dyn Block) -> bool {
        if block.status().decided() {
            return true;
        }
        // Anything at or below the last accepted height that is not the head is rejected
        block.height() <= self.height
    }

    pub fn accepted_or_processing(&self, id: &Id) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_preferred(&self, id: &Id) -> bool {
        *id == self.head || self.preferred.contains(id)
    }

    /// The tip of the preferred branch.
    pub fn preference(&self) -> Id {
        self.tail
    }

    pub fn finalized(&self) -> bool {
        self.num_processing() == 0
    }

    /// Adds a block whose parent is the head or processing. A block on top of anything else can
    /// never be accepted and is rejected immediately.
    pub fn add(&mut self, block: Arc<dyn Block>) -> Result<Decisions> {
        let id = block.id();
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateAdd(id));
        }
        let parent_id = block.parent();
        let params = &self.params;
        let parent = match self.nodes.get_mut(&parent_id) {
            Some(parent) => parent,
            None => {
                block.reject()?;
                debug!("[{}] rejected {} on top of decided parent", "snowman".blue(), id);
                return Ok(Decisions { accepted: vec![], rejected: vec![id] });
            }
        };
        match parent.sb.as_mut() {
            Some(sb) => sb.add(id),
            None => parent.sb = Some(Nnary::new(params, id)),
        }
        parent.children.insert(id);
        self.nodes.insert(id, Node { block: Some(block), ..Node::default() });

        if self.tail == parent_id {
            self.tail = id;
            self.preferred.insert(id);
        }
        Ok(Decisions::default())
    }

    /// Applies the result of a poll.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<Decisions> {
        let stack = self.vote_stack(votes);
        let mut decisions = Decisions::default();

        if stack.is_empty() {
            // Nothing reached alpha: the whole tree falters on its next poll
            if let Some(head) = self.nodes.get_mut(&self.head) {
                head.should_falter = true;
            }
            return Ok(decisions);
        }

        for (i, (parent_id, votes)) in stack.iter().enumerate() {
            let next = stack.get(i + 1).map(|(id, _)| *id);
            let (falter, children) = {
                let node = match self.nodes.get_mut(parent_id) {
                    Some(node) => node,
                    // Rejected by an acceptance higher up the stack
                    None => break,
                };
                let falter = node.should_falter;
                node.should_falter = false;
                let sb = match node.sb.as_mut() {
                    Some(sb) => sb,
                    None => break,
                };
                if falter {
                    sb.record_unsuccessful_poll();
                }
                sb.record_poll(votes);
                (falter, node.children.iter().cloned().collect::<Vec<Id>>())
            };

            if *parent_id == self.head {
                let finalized = self.nodes.get(parent_id).and_then(|n| n.sb.as_ref()).map(|sb| sb.finalized());
                if finalized == Some(true) {
                    self.accept_preferred_child(&mut decisions)?;
                }
            }

            // Children off the voted path missed this poll
            for child in children {
                if !falter && Some(child) == next {
                    continue;
                }
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.should_falter = true;
                }
            }
        }

        self.update_preferred_branch();
        Ok(decisions)
    }

    /// Votes per parent, from the head down, as far as a parent's subtree received alpha votes.
    fn vote_stack(&self, votes: &Bag<Id>) -> Vec<(Id, Bag<Id>)> {
        let mut child_votes: HashMap<Id, Bag<Id>> = HashMap::new();
        for (vote, count) in votes.iter() {
            let mut id = *vote;
            // A vote counts for every processing ancestor
            while id != self.head {
                let parent = match self.nodes.get(&id).and_then(|n| n.block.as_ref()) {
                    Some(block) => block.parent(),
                    None => break,
                };
                child_votes.entry(parent).or_default().add_count(id, *count);
                id = parent;
            }
        }

        let mut stack = vec![];
        let mut parent = self.head;
        while let Some(votes) = child_votes.remove(&parent) {
            if votes.len() < self.params.alpha {
                break;
            }
            let next = match votes.mode() {
                Some((child, _)) => child,
                None => break,
            };
            stack.push((parent, votes));
            parent = next;
        }
        stack
    }

    fn accept_preferred_child(&mut self, decisions: &mut Decisions) -> Result<()> {
        let head = match self.nodes.remove(&self.head) {
            Some(head) => head,
            None => return Err(Error::Invariant(format!("missing head {}", self.head))),
        };
        let chosen = match head.sb.as_ref() {
            Some(sb) => sb.preference(),
            None => return Err(Error::Invariant(format!("head {} has no children", self.head))),
        };
        let block = match self.nodes.get(&chosen).and_then(|n| n.block.clone()) {
            Some(block) => block,
            None => return Err(Error::Invariant(format!("missing child {}", chosen))),
        };
        if block.status() == Status::Rejected {
            return Err(Error::Invariant(format!("accepting rejected block {}", chosen)));
        }
        block.accept()?;
        debug!("[{}] accepted {} at height {}", "snowman".blue(), chosen, block.height());
        decisions.accepted.push(chosen);

        self.head = chosen;
        self.height = block.height();
        self.preferred.remove(&chosen);
        if let Some(node) = self.nodes.get_mut(&chosen) {
            node.block = None;
        }

        for sibling in head.children.into_iter().filter(|id| *id != chosen) {
            self.reject_subtree(sibling, decisions)?;
        }
        Ok(())
    }

    fn reject_subtree(&mut self, root: Id, decisions: &mut Decisions) -> Result<()> {
        let mut to_reject = vec![root];
        while let Some(id) = to_reject.pop() {
            let node = match self.nodes.remove(&id) {
                Some(node) => node,
                None => continue,
            };
            if let Some(block) = node.block {
                block.reject()?;
            }
            self.preferred.remove(&id);
            decisions.rejected.push(id);
            to_reject.extend(node.children);
        }
        Ok(())
    }

    fn update_preferred_branch(&mut self) {
        self.preferred.clear();
        let mut id = self.head;
        while let Some(next) = self.nodes.get(&id).and_then(|n| n.sb.as_ref()).map(|sb| sb.preference()) {
            if !self.nodes.contains_key(&next) {
                break;
            }
            self.preferred.insert(next);
            id = next;
        }
        self.tail = id;
    }
}
