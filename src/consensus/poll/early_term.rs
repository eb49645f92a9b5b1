use super::{Factory, Poll};
use crate::util::Bag;
use crate::zfx_id::{Id, NodeId};

/// Polls every sampled validator and waits for all of them.
#[derive(Debug)]
pub struct NoEarlyTerm {
    votes: Bag<Id>,
    polled: Bag<NodeId>,
}

impl Poll for NoEarlyTerm {
    fn vote(&mut self, vdr: &NodeId, vote: Id) {
        let count = self.polled.remove(vdr);
        self.votes.add_count(vote, count);
    }

    fn drop_voter(&mut self, vdr: &NodeId) {
        self.polled.remove(vdr);
    }

    fn finished(&self) -> bool {
        self.polled.is_empty()
    }

    fn result(&self) -> Bag<Id> {
        self.votes.clone()
    }
}

pub struct NoEarlyTermFactory;

impl Factory for NoEarlyTermFactory {
    fn new_poll(&self, vdrs: Bag<NodeId>) -> Box<dyn Poll> {
        Box::new(NoEarlyTerm { votes: Bag::new(), polled: vdrs })
    }
}

/// Finishes as soon as the outstanding votes can no longer change whether some choice reaches
/// alpha.
///
/// Votes are weighted by how many times the voter was sampled. The poll is done when
/// * nobody is left to answer,
/// * the most voted choice already has alpha votes, or
/// * the most voted choice could not reach alpha even with every outstanding vote.
#[derive(Debug)]
pub struct EarlyTermNoTraversal {
    votes: Bag<Id>,
    polled: Bag<NodeId>,
    alpha: usize,
}

impl Poll for EarlyTermNoTraversal {
    fn vote(&mut self, vdr: &NodeId, vote: Id) {
        let count = self.polled.remove(vdr);
        self.votes.add_count(vote, count);
    }

    fn drop_voter(&mut self, vdr: &NodeId) {
        self.polled.remove(vdr);
    }

    fn finished(&self) -> bool {
        let remaining = self.polled.len();
        if remaining == 0 {
            return true;
        }
        let freq = self.votes.mode().map(|(_, count)| count).unwrap_or(0);
        freq >= self.alpha || freq + remaining < self.alpha
    }

    fn result(&self) -> Bag<Id> {
        self.votes.clone()
    }
}

pub struct EarlyTermNoTraversalFactory {
    alpha: usize,
}

impl EarlyTermNoTraversalFactory {
    pub fn new(alpha: usize) -> Self {
        EarlyTermNoTraversalFactory { alpha }
    }
}

impl Factory for EarlyTermNoTraversalFactory {
    fn new_poll(&self, vdrs: Bag<NodeId>) -> Box<dyn Poll> {
        Box::new(EarlyTermNoTraversal { votes: Bag::new(), polled: vdrs, alpha: self.alpha })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vdrs(n: u8) -> Vec<NodeId> {
        (1..=n).map(|i| Id::new(&[i])).collect()
    }

    #[test]
    fn test_finishes_on_alpha() {
        let v = vdrs(5);
        let mut poll = EarlyTermNoTraversalFactory::new(3).new_poll(v.iter().cloned().collect());
        let x = Id::new(b"x");
        poll.vote(&v[0], x);
        poll.vote(&v[1], x);
        assert!(!poll.finished());
        poll.vote(&v[2], x);
        assert!(poll.finished());
        assert_eq!(poll.result().count(&x), 3);
    }

    #[test]
    fn test_finishes_when_alpha_is_unreachable() {
        let v = vdrs(5);
        let mut poll = EarlyTermNoTraversalFactory::new(4).new_poll(v.iter().cloned().collect());
        poll.drop_voter(&v[0]);
        assert!(!poll.finished());
        poll.drop_voter(&v[1]);
        // 3 outstanding, nobody voted: 0 + 3 < 4
        assert!(poll.finished());
    }

    #[test]
    fn test_never_finishes_while_outcome_can_flip() {
        let v = vdrs(5);
        let mut poll = EarlyTermNoTraversalFactory::new(3).new_poll(v.iter().cloned().collect());
        let (x, y) = (Id::new(b"x"), Id::new(b"y"));
        poll.vote(&v[0], x);
        assert!(!poll.finished());
        poll.vote(&v[1], y);
        assert!(!poll.finished());
        poll.vote(&v[2], y);
        // y has 1 + 2 outstanding >= 3
        assert!(!poll.finished());
        poll.drop_voter(&v[3]);
        assert!(!poll.finished());
        poll.drop_voter(&v[4]);
        assert!(poll.finished());
    }

    #[test]
    fn test_repeated_votes_are_ignored() {
        let v = vdrs(3);
        let mut polled: Bag<NodeId> = v.iter().cloned().collect();
        polled.add(v[0]);
        let mut poll = EarlyTermNoTraversalFactory::new(3).new_poll(polled);
        let x = Id::new(b"x");
        poll.vote(&v[0], x);
        poll.vote(&v[0], x);
        poll.drop_voter(&v[0]);
        // v[0] was sampled twice so its single vote counts twice, once
        assert_eq!(poll.result().count(&x), 2);
        assert!(!poll.finished());
        poll.vote(&Id::new(b"stranger"), x);
        assert_eq!(poll.result().count(&x), 2);
    }

    #[test]
    fn test_no_early_term_waits_for_everyone() {
        let v = vdrs(3);
        let mut poll = NoEarlyTermFactory.new_poll(v.iter().cloned().collect());
        let x = Id::new(b"x");
        poll.vote(&v[0], x);
        poll.vote(&v[1], x);
        assert!(!poll.finished());
        poll.drop_voter(&v[2]);
        assert!(poll.finished());
    }
}
