//! Snowman: consensus on a linear chain of blocks.

mod topological;

pub use topological::Topological;

use super::{Decidable, Result};
use crate::zfx_id::Id;

/// A block as consensus sees it.
pub trait Block: Decidable + Send + Sync {
    fn parent(&self) -> Id;

    fn height(&self) -> u64;

    fn bytes(&self) -> &[u8];

    /// Checks the block against its parent's state. Called before the block enters consensus.
    fn verify(&self) -> Result<()>;
}

#[cfg(test)]
pub mod testing;
