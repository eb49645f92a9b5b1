//! Snowstorm: consensus on transactions that may conflict by spending the same inputs.

mod acceptor;
mod directed;

pub use acceptor::Acceptor;
pub use directed::Directed;

use std::sync::Arc;

use super::Decidable;
use crate::zfx_id::Id;

pub trait Tx: Decidable + Send + Sync {
    /// Transactions that must be accepted before this one can be.
    fn dependencies(&self) -> Vec<Arc<dyn Tx>>;

    /// Inputs consumed. Two transactions consuming the same input conflict.
    fn input_ids(&self) -> Vec<Id>;

    fn bytes(&self) -> &[u8];
}

#[cfg(test)]
pub mod testing;
