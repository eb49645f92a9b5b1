//! Connections to other nodes.
//!
//! Every TCP connection opens with a signed version exchange, after which it carries
//! [Envelope](crate::networking::Envelope)s in both directions. Inbound messages go through
//! the throttlers and on to the chain router; outbound ones are written by one `Peer` actor
//! per connection.

pub mod channel;
pub mod handshake;
mod manager;
mod peer;

pub use channel::Channel;
pub use manager::{Network, NetworkConfig};
pub use peer::Peer;

use std::net::SocketAddr;

use derive_more::{Display, From};

use crate::zfx_id::NodeId;

#[derive(Debug, Display, From)]
pub enum Error {
    Io(std::io::Error),
    Signature(ed25519_dalek::SignatureError),
    Bincode(bincode::Error),
    #[from(ignore)]
    #[display(fmt = "network id mismatch: ours {}, theirs {}", ours, theirs)]
    NetworkMismatch { ours: u32, theirs: u32 },
    #[from(ignore)]
    #[display(fmt = "clock difference of {}s", _0)]
    ClockSkew(u64),
    #[from(ignore)]
    UnexpectedFrame,
    #[from(ignore)]
    ConnectionClosed,
    /// The peer is not the node we dialled.
    #[from(ignore)]
    UnexpectedPeer,
    #[from(ignore)]
    SelfConnection,
    #[from(ignore)]
    AlreadyConnected,
    #[from(ignore)]
    #[display(fmt = "invalid peer: {}", _0)]
    InvalidPeer(String),
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Where to reach a node, and who it is if known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub id: Option<NodeId>,
    pub ip: SocketAddr,
}

impl PeerInfo {
    /// Parses a peer from the format `IP` or `ID@IP`.
    pub fn from_id_and_ip(s: &str) -> Result<PeerInfo> {
        let invalid = || Error::InvalidPeer(s.to_owned());
        let parts: Vec<&str> = s.split('@').collect();
        match parts.as_slice() {
            [ip] => Ok(PeerInfo { id: None, ip: ip.parse().map_err(|_| invalid())? }),
            [id, ip] => {
                let id: NodeId = id.parse().map_err(|_| invalid())?;
                Ok(PeerInfo { id: Some(id), ip: ip.parse().map_err(|_| invalid())? })
            }
            _ => Err(invalid()),
        }
    }
}
