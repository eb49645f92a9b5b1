use std::collections::HashSet;

use crate::consensus::Blockable;
use crate::zfx_id::Id;

/// Acceptance of a transaction that is waiting for its dependencies to be accepted.
///
/// The transaction is handed out for acceptance at most once, and never after any of its
/// dependencies has been abandoned.
#[derive(Debug)]
pub struct Acceptor {
    tx_id: Id,
    deps: HashSet<Id>,
    rejected: bool,
    taken: bool,
}

impl Acceptor {
    pub fn new(tx_id: Id, deps: HashSet<Id>) -> Self {
        Acceptor { tx_id, deps, rejected: false, taken: false }
    }

    pub fn tx_id(&self) -> Id {
        self.tx_id
    }

    pub fn rejected(&self) -> bool {
        self.rejected
    }

    /// The transaction to accept, if it is ready and was not handed out before.
    pub fn take(&mut self) -> Option<Id> {
        if self.rejected || self.taken || !self.deps.is_empty() {
            return None;
        }
        self.taken = true;
        Some(self.tx_id)
    }
}

impl Blockable for Acceptor {
    fn dependencies(&self) -> &HashSet<Id> {
        &self.deps
    }

    fn fulfill(&mut self, id: &Id) {
        self.deps.remove(id);
    }

    fn abandon(&mut self, _id: &Id) {
        self.rejected = true;
    }
}
