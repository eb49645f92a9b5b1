use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use colored::Colorize;
use tracing::debug;

use super::{Factory, Poll};
use crate::util::Bag;
use crate::zfx_id::{Id, NodeId};

struct Holder {
    poll: Box<dyn Poll>,
    started: Instant,
}

/// The in-flight polls of an engine, keyed by request id.
///
/// Results are released oldest first: a poll that finishes while an older poll is still open
/// is held back until the older one finishes, so decisions are applied in the order the polls
/// were issued.
pub struct Set {
    factory: Box<dyn Factory>,
    polls: HashMap<u32, Holder>,
    order: VecDeque<u32>,
}

impl Set {
    pub fn new(factory: Box<dyn Factory>) -> Self {
        Set { factory, polls: HashMap::new(), order: VecDeque::new() }
    }

    /// Starts a poll of `vdrs`. Returns `false` if `request_id` is already in use.
    pub fn add(&mut self, request_id: u32, vdrs: Bag<NodeId>) -> bool {
        if self.polls.contains_key(&request_id) {
            debug!("[{}] dropping duplicate poll {}", "poll".cyan(), request_id);
            return false;
        }
        let poll = self.factory.new_poll(vdrs);
        self.polls.insert(request_id, Holder { poll, started: Instant::now() });
        self.order.push_back(request_id);
        true
    }

    /// Records a vote and returns the results of the polls that are now complete.
    pub fn vote(&mut self, request_id: u32, vdr: &NodeId, vote: Id) -> Vec<Bag<Id>> {
        match self.polls.get_mut(&request_id) {
            Some(holder) => holder.poll.vote(vdr, vote),
            None => {
                debug!("[{}] dropping vote from {} for unknown poll {}", "poll".cyan(), vdr, request_id);
                return vec![];
            }
        }
        self.drain_finished()
    }

    /// Records that `vdr` will not answer `request_id` and returns the results of the polls
    /// that are now complete.
    pub fn drop(&mut self, request_id: u32, vdr: &NodeId) -> Vec<Bag<Id>> {
        match self.polls.get_mut(&request_id) {
            Some(holder) => holder.poll.drop_voter(vdr),
            None => return vec![],
        }
        self.drain_finished()
    }

    fn drain_finished(&mut self) -> Vec<Bag<Id>> {
        let mut results = vec![];
        while let Some(request_id) = self.order.front().cloned() {
            let finished = match self.polls.get(&request_id) {
                Some(holder) => holder.poll.finished(),
                None => true,
            };
            if !finished {
                break;
            }
            self.order.pop_front();
            if let Some(holder) = self.polls.remove(&request_id) {
                debug!(
                    "[{}] poll {} finished after {:?}",
                    "poll".cyan(),
                    request_id,
                    holder.started.elapsed()
                );
                results.push(holder.poll.result());
            }
        }
        results
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}
