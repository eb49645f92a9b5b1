//! The version exchange opening every connection.
//!
//! Each side sends a signed `Version` and answers the other's with a `VersionAck`. A peer is
//! identified by the hash of its public key.

use std::net::SocketAddr;
use std::time::Duration;

use colored::Colorize;
use ed25519_dalek::{Keypair, PublicKey, Signature, Signer, Verifier};
use tai64::Tai64;
use tracing::debug;

use super::channel;
use super::{Error, Result};
use crate::networking::Envelope;
use crate::zfx_id::NodeId;

/// What a connection carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    Version(Version),
    VersionAck,
    Message(Envelope),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub network_id: u32,
    pub public_key: PublicKey,
    pub timestamp: Tai64,
    /// Where the peer accepts connections.
    pub listener: SocketAddr,
    pub signature: Signature,
}

fn signed_bytes(network_id: u32, public_key: &PublicKey, timestamp: &Tai64, listener: &SocketAddr) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&(network_id, public_key.as_bytes(), timestamp.0, listener))?)
}

impl Version {
    pub fn new(keypair: &Keypair, network_id: u32, listener: SocketAddr) -> Result<Self> {
        let timestamp = Tai64::now();
        let bytes = signed_bytes(network_id, &keypair.public, &timestamp, &listener)?;
        let signature = keypair.sign(&bytes);
        Ok(Version { network_id, public_key: keypair.public, timestamp, listener, signature })
    }

    /// Checks the version against our own network and clock. Returns the peer's node id.
    pub fn verify(&self, network_id: u32, max_clock_difference: Duration) -> Result<NodeId> {
        if self.network_id != network_id {
            return Err(Error::NetworkMismatch { ours: network_id, theirs: self.network_id });
        }
        let now = Tai64::now().0;
        let difference = if now > self.timestamp.0 { now - self.timestamp.0 } else { self.timestamp.0 - now };
        if difference > max_clock_difference.as_secs() {
            return Err(Error::ClockSkew(difference));
        }
        let bytes = signed_bytes(self.network_id, &self.public_key, &self.timestamp, &self.listener)?;
        self.public_key.verify(&bytes, &self.signature)?;
        Ok(node_id(&self.public_key))
    }
}

pub fn node_id(public_key: &PublicKey) -> NodeId {
    NodeId::new(public_key.as_bytes())
}

/// Exchanges versions over a fresh connection. Returns the peer's node id and listener.
pub async fn handshake(
    sender: &mut channel::Sender<Frame, Frame>,
    receiver: &mut channel::Receiver<Frame, Frame>,
    version: Version,
    max_clock_difference: Duration,
) -> Result<(NodeId, SocketAddr)> {
    let network_id = version.network_id;
    sender.send(Frame::Version(version)).await?;
    let theirs = match receiver.recv().await? {
        Some(Frame::Version(theirs)) => theirs,
        Some(_) => return Err(Error::UnexpectedFrame),
        None => return Err(Error::ConnectionClosed),
    };
    let node_id = theirs.verify(network_id, max_clock_difference)?;
    sender.send(Frame::VersionAck).await?;
    match receiver.recv().await? {
        Some(Frame::VersionAck) => {}
        Some(_) => return Err(Error::UnexpectedFrame),
        None => return Err(Error::ConnectionClosed),
    }
    debug!("[{}] handshake with {} listening on {}", "network".yellow(), node_id, theirs.listener);
    Ok((node_id, theirs.listener))
}
