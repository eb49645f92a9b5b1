//! Weighted validator sets, per allychain, with global masking.

mod manager;
mod set;
mod state;

pub use manager::Manager;
pub use set::Set;
pub use state::State;

use crate::util::sampler;
use crate::zfx_id::{Id, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    WeightOverflow,
    MissingValidator(NodeId),
    InsufficientWeight { validator: NodeId, weight: u64, removed: u64 },
    MissingAllychain(Id),
    Sampler(sampler::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<sampler::Error> for Error {
    fn from(error: sampler::Error) -> Self {
        Error::Sampler(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
