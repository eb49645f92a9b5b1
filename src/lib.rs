#[macro_use]
extern crate serde_derive;
extern crate colored;

pub mod allychains;
pub mod codec;
pub mod consensus;
pub mod engine;
pub mod network;
pub mod networking;
pub mod proposervm;
pub mod server;
pub mod storage;
pub mod util;
pub mod validators;
pub mod vm;
pub mod zfx_id;

#[cfg(test)]
mod integration_test;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Dalek(ed25519_dalek::ed25519::Error),
    Sled(sled::Error),
    Hex(hex::FromHexError),

    Codec(codec::Error),
    Consensus(consensus::Error),
    Engine(engine::Error),
    Network(network::Error),
    Networking(networking::Error),
    Proposer(proposervm::Error),
    Storage(storage::Error),
    Validators(validators::Error),
    Vm(vm::Error),

    /// A string that does not encode an `Id`
    InvalidId,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl std::convert::From<$source> for Error {
                fn from(error: $source) -> Self {
                    Error::$variant(error)
                }
            }
        )*
    };
}

impl_from! {
    std::io::Error => IO,
    ed25519_dalek::ed25519::Error => Dalek,
    sled::Error => Sled,
    hex::FromHexError => Hex,
    codec::Error => Codec,
    consensus::Error => Consensus,
    engine::Error => Engine,
    network::Error => Network,
    networking::Error => Networking,
    proposervm::Error => Proposer,
    storage::Error => Storage,
    validators::Error => Validators,
    vm::Error => Vm,
}

pub type Result<T> = std::result::Result<T, Error>;
