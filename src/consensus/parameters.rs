use std::time::Duration;

use super::{Error, Result};

/// Sampling and finality parameters shared by every Snow* instance of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Validators sampled per poll.
    pub k: usize,
    /// Votes needed for a successful poll.
    pub alpha: usize,
    /// Consecutive successful polls needed to finalise an item without conflicts.
    pub beta_virtuous: usize,
    /// Consecutive successful polls needed to finalise an item with conflicts.
    pub beta_rogue: usize,
    pub concurrent_repolls: usize,
    pub optimal_processing: usize,
    pub max_outstanding_items: usize,
    pub max_item_processing_time: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            k: 20,
            alpha: 15,
            beta_virtuous: 15,
            beta_rogue: 20,
            concurrent_repolls: 4,
            optimal_processing: 50,
            max_outstanding_items: 1024,
            max_item_processing_time: Duration::from_secs(120),
        }
    }
}

impl Parameters {
    pub fn verify(&self) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidParameters(reason));
        if self.alpha <= self.k / 2 {
            return invalid(format!("k = {}, alpha = {}: fails k/2 < alpha", self.k, self.alpha));
        }
        if self.alpha > self.k {
            return invalid(format!("k = {}, alpha = {}: fails alpha <= k", self.k, self.alpha));
        }
        if self.beta_virtuous == 0 {
            return invalid("beta_virtuous must be positive".to_owned());
        }
        if self.beta_rogue < self.beta_virtuous {
            return invalid(format!(
                "beta_virtuous = {}, beta_rogue = {}: fails beta_virtuous <= beta_rogue",
                self.beta_virtuous, self.beta_rogue
            ));
        }
        if self.concurrent_repolls == 0 || self.concurrent_repolls > self.beta_rogue {
            return invalid(format!(
                "concurrent_repolls = {}: must be in 1..={}",
                self.concurrent_repolls, self.beta_rogue
            ));
        }
        if self.optimal_processing == 0 {
            return invalid("optimal_processing must be positive".to_owned());
        }
        if self.max_outstanding_items == 0 {
            return invalid("max_outstanding_items must be positive".to_owned());
        }
        Ok(())
    }
}
