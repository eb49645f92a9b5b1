//! Snowman++ proposer selection.

mod windower;

pub use windower::{Windower, MAX_DELAY, MAX_WINDOWS, WINDOW_DURATION};

use crate::util::sampler;
use crate::validators;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Validators(validators::Error),
    Sampler(sampler::Error),
    WeightOverflow,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<validators::Error> for Error {
    fn from(error: validators::Error) -> Self {
        Error::Validators(error)
    }
}

impl From<sampler::Error> for Error {
    fn from(error: sampler::Error) -> Self {
        Error::Sampler(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
