//! Snow* consensus: polls, snowball instances, the Snowman block tree and the Snowstorm
//! conflict graph.

pub mod blocker;
mod parameters;
pub mod poll;
pub mod snowball;
pub mod snowman;
pub mod snowstorm;

pub use blocker::{Blockable, Blocker};
pub use parameters::Parameters;

use crate::zfx_id::Id;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidParameters(String),
    DuplicateAdd(Id),
    /// A decision callback (accept / reject) failed in the VM.
    Decision(Id, String),
    InvalidBlock(Id, String),
    /// A state transition that would break finality was attempted.
    Invariant(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Life cycle of a consensus item. Only ever moves forward: `Unknown` -> `Processing` ->
/// `Accepted` | `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Unknown,
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Whether the item's bytes are available locally.
    pub fn fetched(&self) -> bool {
        !matches!(self, Status::Unknown)
    }
}

/// Something consensus decides on.
pub trait Decidable {
    fn id(&self) -> Id;

    fn status(&self) -> Status;

    fn accept(&self) -> Result<()>;

    fn reject(&self) -> Result<()>;
}

/// Outcome of applying a poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decisions {
    pub accepted: Vec<Id>,
    pub rejected: Vec<Id>,
}

impl Decisions {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }

    pub fn extend(&mut self, other: Decisions) {
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
    }
}
