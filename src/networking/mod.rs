//! Moving consensus messages between the network and the chains' engines.

pub mod handler;
pub mod message;
pub mod router;
pub mod sender;
pub mod throttling;
pub mod timeout;
pub mod tracker;

#[cfg(test)]
pub mod testing;

pub use handler::{EngineManager, Handler, HandlerConfig};
pub use message::{Envelope, InboundMessage, Message, Op};
pub use router::ChainRouter;
pub use sender::{ExternalSender, GossipConfig, Sender};

use crate::engine;

#[derive(Debug)]
pub enum Error {
    Engine(engine::Error),
    /// The handler was started without engines.
    NoEngines,
    AlreadyStarted,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<engine::Error> for Error {
    fn from(error: engine::Error) -> Self {
        Error::Engine(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
