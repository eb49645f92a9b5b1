//! Hash-based identifiers for chains, allychains, containers and nodes.
//!
//! See the documentation of [Id] for details.

use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::{self, Rng};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte identifier.
///
/// Ids are ordered by their bytes; this ordering is the canonical ordering used wherever
/// nodes must agree on an order (validator lists, vote tie-breaks). They are displayed in
/// base58check.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id([u8; 32]);

/// Nodes are identified by the hash of their public key.
pub type NodeId = Id;

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for Id {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, crate::Error> {
        let (version, bytes) = s.from_base58check().map_err(|_| crate::Error::InvalidId)?;
        if version != 0 {
            return Err(crate::Error::InvalidId);
        }
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| crate::Error::InvalidId)?;
        Ok(Id(bytes))
    }
}

impl From<[u8; 32]> for Id {
    fn from(bytes: [u8; 32]) -> Self {
        Id(bytes)
    }
}

impl Id {
    /// Creates an id by hashing `bytes`.
    pub fn new(bytes: &[u8]) -> Id {
        Id(hash(bytes))
    }

    /// Random id, used for fresh chains in tests and for ephemeral keys.
    pub fn generate() -> Id {
        let mut rng = rand::thread_rng();
        Id(rng.gen())
    }

    /// The empty id. Windows computed for it are always the maximum delay.
    pub fn zero() -> Id {
        Id([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// All-ones `Id` (for testing)
    pub fn one() -> Id {
        Id([1u8; 32])
    }

    /// All-twos `Id` (for testing)
    pub fn two() -> Id {
        Id([2u8; 32])
    }

    pub fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Derives a new id from this one and a number, e.g. the n-th child of a chain.
    pub fn prefix(&self, n: u64) -> Id {
        let mut bytes = Vec::with_capacity(40);
        bytes.extend_from_slice(&n.to_be_bytes());
        bytes.extend_from_slice(&self.0);
        Id(hash(&bytes))
    }

    /// Reads the first eight bytes as a big-endian integer.
    pub fn to_u64_be(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(head)
    }
}

fn hash(input: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(input);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&hasher.finalize());
    buf
}
