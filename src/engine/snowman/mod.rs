//! Engines for linear chains: the bootstrapper and the Snowman consensus engine.

mod bootstrapper;
mod getter;
mod transitive;

pub use bootstrapper::Bootstrapper;
pub use getter::Getter;
pub use transitive::Transitive;

use std::sync::Arc;

use super::common::{ChainContext, GetterConfig, Sender};
use crate::consensus::Parameters;
use crate::validators;
use crate::vm::ChainVm;

/// Everything a Snowman chain's engines share.
#[derive(Clone)]
pub struct Config {
    pub ctx: Arc<ChainContext>,
    pub vm: Arc<dyn ChainVm>,
    pub sender: Arc<dyn Sender>,
    /// Validators sampled for polls.
    pub validators: Arc<validators::Set>,
    /// Validators trusted while bootstrapping.
    pub beacons: Arc<validators::Set>,
    pub params: Parameters,
    pub getter: GetterConfig,
}
