//! External sender that hands messages to nobody.

use std::collections::HashSet;
use std::sync::Mutex;

use super::message::Envelope;
use super::sender::ExternalSender;
use crate::zfx_id::{Id, NodeId};

/// Records what is sent. Only `reachable` nodes count as sent to.
#[derive(Debug, Default)]
pub struct TestExternalSender {
    reachable: HashSet<NodeId>,
    sent: Mutex<Vec<(Envelope, HashSet<NodeId>)>>,
    gossiped: Mutex<Vec<Envelope>>,
}

impl TestExternalSender {
    pub fn new(reachable: Vec<NodeId>) -> Self {
        TestExternalSender { reachable: reachable.into_iter().collect(), ..Self::default() }
    }

    pub fn sent(&self) -> Vec<(Envelope, HashSet<NodeId>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn gossiped(&self) -> Vec<Envelope> {
        self.gossiped.lock().unwrap().clone()
    }
}

impl ExternalSender for TestExternalSender {
    fn send(
        &self,
        envelope: Envelope,
        node_ids: HashSet<NodeId>,
        _allychain_id: Id,
        _validator_only: bool,
    ) -> HashSet<NodeId> {
        let sent: HashSet<NodeId> = node_ids.intersection(&self.reachable).cloned().collect();
        if !sent.is_empty() {
            self.sent.lock().unwrap().push((envelope, sent.clone()));
        }
        sent
    }

    fn gossip(
        &self,
        envelope: Envelope,
        _allychain_id: Id,
        _validator_only: bool,
        _num_validators: usize,
        _num_non_validators: usize,
        _num_peers: usize,
    ) -> HashSet<NodeId> {
        self.gossiped.lock().unwrap().push(envelope);
        self.reachable.clone()
    }
}
