//! Database storage layer using [`sled`](http://docs.rs/sled/) as backend
use crate::codec;
use crate::zfx_id::Id;

/// Block storage for linear chains
pub mod block;
/// Vertex storage for DAG chains
pub mod vertex;

#[derive(Debug)]
pub enum Error {
    Bincode(String),
    Sled(sled::Error),
    Codec(codec::Error),
    InvalidKey,
    UndefinedGenesis,
    /// Accepted blocks must extend the last accepted block.
    InvalidHeight { last: u64, height: u64 },
    MissingVertex(Id),
}

impl std::error::Error for Error {}

impl std::convert::From<Box<bincode::ErrorKind>> for Error {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        Error::Bincode(format!("{:?}", error))
    }
}

impl std::convert::From<sled::Error> for Error {
    fn from(error: sled::Error) -> Self {
        Error::Sled(error)
    }
}

impl std::convert::From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
