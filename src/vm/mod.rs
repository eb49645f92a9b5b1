//! The interface between a Snowman chain and the virtual machine executing its blocks.

pub mod blockstore;

use std::sync::Arc;

pub use crate::consensus::snowman::Block;

use crate::codec;
use crate::consensus;
use crate::storage;
use crate::zfx_id::Id;

#[derive(Debug)]
pub enum Error {
    /// The block is not known locally.
    NotFound(Id),
    Parse(String),
    NoPendingTxs,
    Codec(codec::Error),
    Storage(storage::Error),
    Consensus(consensus::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        Error::Storage(error)
    }
}

impl From<consensus::Error> for Error {
    fn from(error: consensus::Error) -> Self {
        Error::Consensus(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Notifications from the VM to its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmMessage {
    /// The VM has transactions it would like to put in a block.
    PendingTxs,
    StateSyncDone,
}

/// A VM for a linear chain.
///
/// Blocks handed out by the VM for the same id must share their status: accepting one must be
/// visible through every other handle.
pub trait ChainVm: Send + Sync {
    /// Builds a block on top of the current preference.
    fn build_block(&self) -> Result<Arc<dyn Block>>;

    fn parse_block(&self, bytes: &[u8]) -> Result<Arc<dyn Block>>;

    /// Fails with `NotFound` for blocks the VM does not have.
    fn get_block(&self, id: &Id) -> Result<Arc<dyn Block>>;

    fn set_preference(&self, id: Id) -> Result<()>;

    fn last_accepted(&self) -> Result<Id>;

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub mod testing;
