//! Weighted sampling without replacement.
//!
//! Sampling is done over weight units: an element with weight `w` owns `w` consecutive units
//! of the range `[0, total)`, `count` distinct units are drawn uniformly and each is mapped
//! back to its element. An element may therefore be drawn more than once, in proportion to
//! its weight.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    WeightOverflow,
    InsufficientWeight { requested: u64, available: u64 },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct WeightedWithoutReplacement {
    // cumulative[i] is the sum of the weights of elements 0..=i
    cumulative: Vec<u64>,
    rng: StdRng,
}

impl Default for WeightedWithoutReplacement {
    fn default() -> Self {
        WeightedWithoutReplacement { cumulative: vec![], rng: StdRng::from_entropy() }
    }
}

impl WeightedWithoutReplacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sampler whose draws are a pure function of the weights and `seed`.
    pub fn deterministic(seed: u64) -> Self {
        WeightedWithoutReplacement { cumulative: vec![], rng: StdRng::seed_from_u64(seed) }
    }

    pub fn initialize(&mut self, weights: &[u64]) -> Result<()> {
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0u64;
        for w in weights.iter() {
            total = total.checked_add(*w).ok_or(Error::WeightOverflow)?;
            cumulative.push(total);
        }
        self.cumulative = cumulative;
        Ok(())
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().cloned().unwrap_or(0)
    }

    /// Draws `count` weight units and returns the index of the element owning each.
    pub fn sample(&mut self, count: usize) -> Result<Vec<usize>> {
        let total = self.total_weight();
        let requested = count as u64;
        if requested > total {
            return Err(Error::InsufficientWeight { requested, available: total });
        }
        // Lazy Fisher-Yates over [0, total): only the swapped slots are stored
        let mut swapped: HashMap<u64, u64> = HashMap::with_capacity(count);
        let mut indices = Vec::with_capacity(count);
        for i in 0..requested {
            let j = self.rng.gen_range(i, total);
            let unit = *swapped.get(&j).unwrap_or(&j);
            let displaced = *swapped.get(&i).unwrap_or(&i);
            swapped.insert(j, displaced);
            indices.push(self.cumulative.partition_point(|c| *c <= unit));
        }
        Ok(indices)
    }
}
