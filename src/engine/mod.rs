//! Consensus engines: the callbacks the handler drives for one chain.

pub mod avalanche;
pub mod common;
pub mod snowman;

use crate::codec;
use crate::consensus;
use crate::storage;
use crate::validators;
use crate::vm;

#[derive(Debug)]
pub enum Error {
    Consensus(consensus::Error),
    Vm(vm::Error),
    Codec(codec::Error),
    Validators(validators::Error),
    Storage(storage::Error),
    /// The engine is not in a state to run the callback.
    InvalidState(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<consensus::Error> for Error {
    fn from(error: consensus::Error) -> Self {
        Error::Consensus(error)
    }
}

impl From<vm::Error> for Error {
    fn from(error: vm::Error) -> Self {
        Error::Vm(error)
    }
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl From<validators::Error> for Error {
    fn from(error: validators::Error) -> Self {
        Error::Validators(error)
    }
}

impl From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        Error::Storage(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
