use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use colored::Colorize;
use tracing::debug;

use super::{Acceptor, Tx};
use crate::consensus::{Blocker, Decidable, Decisions, Parameters, Result, Status};
use crate::util::Bag;
use crate::zfx_id::Id;

struct TxNode {
    tx: Arc<dyn Tx>,
    num_successful_polls: u64,
    // `current_vote` of the last successful poll
    last_vote: u64,
    confidence: usize,
    // Has ever conflicted with another transaction
    rogue: bool,
    pending_accept: bool,
    // Conflicting transactions preferred over this one
    ins: HashSet<Id>,
    // Conflicting transactions this one is preferred over
    outs: HashSet<Id>,
}

impl TxNode {
    fn new(tx: Arc<dyn Tx>) -> Self {
        TxNode {
            tx,
            num_successful_polls: 0,
            last_vote: 0,
            confidence: 0,
            rogue: false,
            pending_accept: false,
            ins: HashSet::new(),
            outs: HashSet::new(),
        }
    }
}

/// Conflict graph consensus.
///
/// Transactions spending a common input are joined by a directed edge pointing from the
/// preferred one to the other. The first transaction seen is preferred until a competitor has
/// more successful polls, at which point the edge is reversed. A transaction is preferred when
/// nothing points at it.
///
/// A transaction gathering enough consecutive successful polls while preferred is accepted as
/// soon as its dependencies are. Accepting it rejects every conflicting transaction, and
/// rejecting a transaction rejects everything depending on it.
pub struct Directed {
    params: Parameters,
    txs: HashMap<Id, TxNode>,
    // input -> processing transactions consuming it
    spenders: HashMap<Id, HashSet<Id>>,
    // processing transaction -> processing transactions depending on it
    dependants: HashMap<Id, HashSet<Id>>,
    preferences: HashSet<Id>,
    virtuous: HashSet<Id>,
    virtuous_voting: HashSet<Id>,
    pending_accept: Blocker<Acceptor>,
    current_vote: u64,
}

impl Directed {
    pub fn new(params: Parameters) -> Result<Self> {
        params.verify()?;
        Ok(Directed {
            params,
            txs: HashMap::new(),
            spenders: HashMap::new(),
            dependants: HashMap::new(),
            preferences: HashSet::new(),
            virtuous: HashSet::new(),
            virtuous_voting: HashSet::new(),
            pending_accept: Blocker::new(),
            current_vote: 0,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn issued(&self, tx: &dyn Tx) -> bool {
        tx.status().decided() || self.txs.contains_key(&tx.id())
    }

    pub fn processing(&self, id: &Id) -> bool {
        self.txs.contains_key(id)
    }

    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        self.conflicts(tx).is_empty()
    }

    /// Processing transactions conflicting with `tx`.
    pub fn conflicts(&self, tx: &dyn Tx) -> HashSet<Id> {
        let id = tx.id();
        let mut conflicts = HashSet::new();
        for input in tx.input_ids() {
            if let Some(spenders) = self.spenders.get(&input) {
                conflicts.extend(spenders.iter().filter(|s| **s != id).cloned());
            }
        }
        conflicts
    }

    pub fn preferences(&self) -> &HashSet<Id> {
        &self.preferences
    }

    pub fn virtuous(&self) -> &HashSet<Id> {
        &self.virtuous
    }

    /// No virtuous transaction is left to vote on.
    pub fn quiesce(&self) -> bool {
        self.virtuous_voting.is_empty()
    }

    pub fn finalized(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn add(&mut self, tx: Arc<dyn Tx>) -> Result<Decisions> {
        let mut decisions = Decisions::default();
        if self.issued(tx.as_ref()) {
            return Ok(decisions);
        }
        let id = tx.id();

        let mut pending_deps = vec![];
        for dep in tx.dependencies() {
            match dep.status() {
                Status::Accepted => (),
                Status::Rejected => {
                    tx.reject()?;
                    decisions.rejected.push(id);
                    return Ok(decisions);
                }
                _ => pending_deps.push(dep.id()),
            }
        }

        let mut node = TxNode::new(tx.clone());
        for input in tx.input_ids() {
            let spenders = self.spenders.entry(input).or_default();
            for conflict_id in spenders.iter() {
                if let Some(conflict) = self.txs.get_mut(conflict_id) {
                    conflict.outs.insert(id);
                    conflict.rogue = true;
                }
                node.ins.insert(*conflict_id);
                node.rogue = true;
                self.virtuous.remove(conflict_id);
                self.virtuous_voting.remove(conflict_id);
            }
            spenders.insert(id);
        }
        if !node.rogue {
            self.virtuous.insert(id);
            self.virtuous_voting.insert(id);
        }
        if node.ins.is_empty() {
            self.preferences.insert(id);
        }
        for dep in pending_deps {
            self.dependants.entry(dep).or_default().insert(id);
        }
        self.txs.insert(id, node);
        Ok(decisions)
    }

    /// Applies a poll. Every transaction with at least alpha votes had a successful poll, every
    /// other transaction an unsuccessful one.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<Decisions> {
        self.current_vote += 1;
        let mut decisions = Decisions::default();
        let mut acceptable = vec![];

        for id in votes.threshold(self.params.alpha) {
            match self.txs.get_mut(&id) {
                Some(node) => {
                    if node.last_vote + 1 == self.current_vote {
                        node.confidence += 1;
                    } else {
                        node.confidence = 1;
                    }
                    node.last_vote = self.current_vote;
                    node.num_successful_polls += 1;
                }
                None => continue,
            }
            self.redirect_edges(&id);

            let (beta_virtuous, beta_rogue) = (self.params.beta_virtuous, self.params.beta_rogue);
            if let Some(node) = self.txs.get_mut(&id) {
                let beta = if node.rogue { beta_rogue } else { beta_virtuous };
                if !node.pending_accept && node.ins.is_empty() && node.confidence >= beta {
                    node.pending_accept = true;
                    acceptable.push(id);
                }
            }
        }

        for id in acceptable {
            self.defer_acceptance(id, &mut decisions)?;
        }
        Ok(decisions)
    }

    // Reverses the edges from conflicts that now have fewer successful polls than `id`.
    fn redirect_edges(&mut self, id: &Id) {
        let (polls, ins) = match self.txs.get(id) {
            Some(node) => (node.num_successful_polls, node.ins.iter().cloned().collect::<Vec<Id>>()),
            None => return,
        };
        for other in ins {
            let reverse = match self.txs.get_mut(&other) {
                Some(o) if polls > o.num_successful_polls => {
                    o.outs.remove(id);
                    o.ins.insert(*id);
                    true
                }
                _ => false,
            };
            if reverse {
                self.preferences.remove(&other);
                if let Some(node) = self.txs.get_mut(id) {
                    node.ins.remove(&other);
                    node.outs.insert(other);
                }
            }
        }
        if self.txs.get(id).map(|n| n.ins.is_empty()).unwrap_or(false) {
            self.preferences.insert(*id);
        }
    }

    fn defer_acceptance(&mut self, id: Id, decisions: &mut Decisions) -> Result<()> {
        let deps = match self.txs.get(&id) {
            Some(node) => node
                .tx
                .dependencies()
                .iter()
                .filter(|d| d.status() != Status::Accepted)
                .map(|d| d.id())
                .collect(),
            None => return Ok(()),
        };
        if let Some(mut acceptor) = self.pending_accept.register(Acceptor::new(id, deps)) {
            if let Some(tx_id) = acceptor.take() {
                self.accept(tx_id, decisions)?;
            }
        }
        Ok(())
    }

    fn accept(&mut self, id: Id, decisions: &mut Decisions) -> Result<()> {
        let mut to_accept = vec![id];
        while let Some(id) = to_accept.pop() {
            let node = match self.txs.remove(&id) {
                Some(node) => node,
                // Rejected while waiting on its dependencies
                None => continue,
            };
            node.tx.accept()?;
            debug!("[{}] accepted {}", "snowstorm".yellow(), id);
            decisions.accepted.push(id);
            self.preferences.remove(&id);
            self.virtuous.remove(&id);
            self.virtuous_voting.remove(&id);
            self.dependants.remove(&id);

            let mut conflicts = vec![];
            for input in node.tx.input_ids() {
                if let Some(spenders) = self.spenders.remove(&input) {
                    conflicts.extend(spenders.into_iter().filter(|s| *s != id));
                }
            }
            self.reject_all(conflicts, decisions)?;

            for mut acceptor in self.pending_accept.fulfill(&id) {
                if let Some(tx_id) = acceptor.take() {
                    to_accept.push(tx_id);
                }
            }
        }
        Ok(())
    }

    fn reject_all(&mut self, ids: Vec<Id>, decisions: &mut Decisions) -> Result<()> {
        let mut to_reject = ids;
        while let Some(id) = to_reject.pop() {
            let node = match self.txs.remove(&id) {
                Some(node) => node,
                None => continue,
            };
            node.tx.reject()?;
            debug!("[{}] rejected {}", "snowstorm".yellow(), id);
            decisions.rejected.push(id);
            self.preferences.remove(&id);
            self.virtuous.remove(&id);
            self.virtuous_voting.remove(&id);

            for input in node.tx.input_ids() {
                let emptied = match self.spenders.get_mut(&input) {
                    Some(spenders) => {
                        spenders.remove(&id);
                        spenders.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    self.spenders.remove(&input);
                }
            }
            for other in node.ins.iter().chain(node.outs.iter()) {
                if let Some(o) = self.txs.get_mut(other) {
                    o.ins.remove(&id);
                    o.outs.remove(&id);
                    if o.ins.is_empty() {
                        self.preferences.insert(*other);
                    }
                }
            }

            if let Some(dependants) = self.dependants.remove(&id) {
                to_reject.extend(dependants);
            }
            for acceptor in self.pending_accept.abandon(&id) {
                to_reject.push(acceptor.tx_id());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::snowstorm::testing::TestTx;

    fn params() -> Parameters {
        Parameters {
            k: 2,
            alpha: 2,
            beta_virtuous: 1,
            beta_rogue: 2,
            concurrent_repolls: 1,
            ..Parameters::default()
        }
    }

    fn votes(ids: &[Id]) -> Bag<Id> {
        ids.iter().cloned().collect()
    }

    #[test]
    fn test_virtuous_tx_is_accepted() {
        let mut graph = Directed::new(params()).unwrap();
        let tx = TestTx::new(b"tx", &[Id::one()]);
        graph.add(tx.clone()).unwrap();
        assert!(graph.is_virtuous(tx.as_ref()));
        assert!(graph.preferences().contains(&tx.id()));

        // One vote is below alpha
        assert!(graph.record_poll(&votes(&[tx.id()])).unwrap().is_empty());
        let decisions = graph.record_poll(&votes(&[tx.id(), tx.id()])).unwrap();
        assert_eq!(decisions.accepted, vec![tx.id()]);
        assert_eq!(tx.status(), Status::Accepted);
        assert!(graph.finalized());
    }

    #[test]
    fn test_conflicts_are_rejected() {
        let mut graph = Directed::new(params()).unwrap();
        let first = TestTx::new(b"first", &[Id::one()]);
        let second = TestTx::new(b"second", &[Id::one(), Id::two()]);
        graph.add(first.clone()).unwrap();
        graph.add(second.clone()).unwrap();
        assert!(!graph.is_virtuous(first.as_ref()));
        assert!(graph.preferences().contains(&first.id()));
        assert!(!graph.preferences().contains(&second.id()));

        let for_second = votes(&[second.id(), second.id()]);
        assert!(graph.record_poll(&for_second).unwrap().is_empty());
        // The edge flipped: second is now preferred
        assert!(graph.preferences().contains(&second.id()));
        assert!(!graph.preferences().contains(&first.id()));

        let decisions = graph.record_poll(&for_second).unwrap();
        assert_eq!(decisions.accepted, vec![second.id()]);
        assert_eq!(decisions.rejected, vec![first.id()]);
        assert_eq!(first.status(), Status::Rejected);
        assert!(graph.finalized());
    }

    #[test]
    fn test_failed_poll_resets_confidence() {
        let mut graph = Directed::new(params()).unwrap();
        let a = TestTx::new(b"a", &[Id::one()]);
        let b = TestTx::new(b"b", &[Id::one()]);
        graph.add(a.clone()).unwrap();
        graph.add(b.clone()).unwrap();

        let for_a = votes(&[a.id(), a.id()]);
        graph.record_poll(&for_a).unwrap();
        graph.record_poll(&votes(&[a.id(), b.id()])).unwrap();
        assert!(graph.record_poll(&for_a).unwrap().is_empty());
        let decisions = graph.record_poll(&for_a).unwrap();
        assert_eq!(decisions.accepted, vec![a.id()]);
        assert_eq!(b.status(), Status::Rejected);
    }

    #[test]
    fn test_acceptance_waits_for_dependencies() {
        let mut graph = Directed::new(params()).unwrap();
        let parent = TestTx::new(b"parent", &[Id::one()]);
        let child = TestTx::with_deps(b"child", &[Id::two()], vec![parent.clone()]);
        graph.add(parent.clone()).unwrap();
        graph.add(child.clone()).unwrap();

        assert!(graph.record_poll(&votes(&[child.id(), child.id()])).unwrap().is_empty());
        assert_eq!(child.status(), Status::Processing);

        let decisions = graph.record_poll(&votes(&[parent.id(), parent.id()])).unwrap();
        assert_eq!(decisions.accepted, vec![parent.id(), child.id()]);
        assert_eq!(child.status(), Status::Accepted);
    }

    #[test]
    fn test_rejection_cascades_to_dependants() {
        let mut graph = Directed::new(params()).unwrap();
        let parent = TestTx::new(b"parent", &[Id::one()]);
        let rival = TestTx::new(b"rival", &[Id::one()]);
        let child = TestTx::with_deps(b"child", &[Id::two()], vec![parent.clone()]);
        graph.add(parent.clone()).unwrap();
        graph.add(rival.clone()).unwrap();
        graph.add(child.clone()).unwrap();
        graph.record_poll(&votes(&[child.id(), child.id()])).unwrap();

        let for_rival = votes(&[rival.id(), rival.id()]);
        graph.record_poll(&for_rival).unwrap();
        let decisions = graph.record_poll(&for_rival).unwrap();
        assert_eq!(decisions.accepted, vec![rival.id()]);
        assert_eq!(parent.status(), Status::Rejected);
        assert_eq!(child.status(), Status::Rejected);
        assert!(graph.finalized());

        // Anything built on a rejected transaction is rejected on arrival
        let late = TestTx::with_deps(b"late", &[Id::two()], vec![parent.clone()]);
        let decisions = graph.add(late.clone()).unwrap();
        assert_eq!(decisions.rejected, vec![late.id()]);
    }
}
