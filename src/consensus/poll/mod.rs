//! Polls: one round of votes from a sample of validators.

mod early_term;
mod set;

pub use early_term::{EarlyTermNoTraversal, EarlyTermNoTraversalFactory, NoEarlyTerm, NoEarlyTermFactory};
pub use set::Set;

use crate::util::Bag;
use crate::zfx_id::{Id, NodeId};

pub trait Poll: std::fmt::Debug + Send {
    /// Records `vdr`'s vote. Ignored if `vdr` was not polled or has already answered.
    fn vote(&mut self, vdr: &NodeId, vote: Id);

    /// Records that `vdr` will not answer.
    fn drop_voter(&mut self, vdr: &NodeId);

    fn finished(&self) -> bool;

    fn result(&self) -> Bag<Id>;
}

pub trait Factory: Send {
    fn new_poll(&self, vdrs: Bag<NodeId>) -> Box<dyn Poll>;
}
