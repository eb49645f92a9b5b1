use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{Error, Result};
use crate::util::sampler::WeightedWithoutReplacement;
use crate::validators::State;
use crate::zfx_id::{Id, NodeId};

/// Length of one proposer window.
pub const WINDOW_DURATION: Duration = Duration::from_secs(5);
/// Number of validators given a window of their own.
pub const MAX_WINDOWS: usize = 6;
/// Delay after which anyone may propose.
pub const MAX_DELAY: Duration = Duration::from_secs(WINDOW_DURATION.as_secs() * MAX_WINDOWS as u64);

/// Assigns block proposal windows to validators.
///
/// For a given chain height the validator set at the core-chain height is sorted by ID and a
/// weighted sample without replacement is drawn, seeded with the chain height mixed with the
/// chain ID. The n-th validator drawn may propose n windows after the parent block.
pub struct Windower {
    state: Arc<dyn State>,
    allychain_id: Id,
    chain_source: u64,
    sampler: Mutex<WeightedWithoutReplacement>,
}

impl Windower {
    pub fn new(state: Arc<dyn State>, allychain_id: Id, chain_id: Id) -> Self {
        Windower {
            state,
            allychain_id,
            chain_source: chain_id.to_u64_be(),
            sampler: Mutex::new(WeightedWithoutReplacement::deterministic(0)),
        }
    }

    /// The validators owning the first windows for a block at `chain_height`, in window order.
    /// A validator appears once per window it owns.
    pub fn proposers(&self, chain_height: u64, core_height: u64) -> Result<Vec<NodeId>> {
        let mut validators: Vec<(NodeId, u64)> =
            self.state.get_validator_set(core_height, &self.allychain_id)?.into_iter().collect();
        validators.sort_by(|a, b| a.0.cmp(&b.0));

        let weights: Vec<u64> = validators.iter().map(|(_, w)| *w).collect();
        let mut total: u64 = 0;
        for w in weights.iter() {
            total = total.checked_add(*w).ok_or(Error::WeightOverflow)?;
        }
        let count = std::cmp::min(MAX_WINDOWS as u64, total) as usize;

        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        sampler.initialize(&weights)?;
        sampler.seed(chain_height ^ self.chain_source);
        let indices = sampler.sample(count)?;
        Ok(indices.into_iter().map(|i| validators[i].0).collect())
    }

    /// How long after its parent `validator_id` may propose a block at `chain_height`.
    pub fn delay(&self, chain_height: u64, core_height: u64, validator_id: &NodeId) -> Result<Duration> {
        if validator_id.is_zero() {
            return Ok(MAX_DELAY);
        }
        let proposers = self.proposers(chain_height, core_height)?;
        let mut delay = Duration::from_secs(0);
        for proposer in proposers.iter() {
            if proposer == validator_id {
                return Ok(delay);
            }
            delay += WINDOW_DURATION;
        }
        Ok(MAX_DELAY)
    }
}
