//! Interfaces shared by every engine.

mod context;
mod engine;
mod requests;
mod sender;

pub use context::{ChainContext, EngineState};
pub use engine::{AppHandler, Engine, GetHandler, GetterConfig};
pub use requests::{next_request_id, Requests, GOSSIP_REQUEST_ID};
pub use sender::Sender;

#[cfg(test)]
pub mod testing;
