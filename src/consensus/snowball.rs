//! N-ary snowball: the per-decision confidence state machine.

use std::collections::HashMap;

use super::Parameters;
use crate::util::Bag;
use crate::zfx_id::Id;

/// Snowball over any number of choices.
///
/// * A successful poll (some choice with at least alpha votes) increases that choice's
///   preference strength; the preference is the choice with the greatest strength.
/// * Confidence counts consecutive successful polls for the same choice. An unsuccessful poll
///   resets confidence, never the preference.
/// * The instance finalises once confidence reaches beta_virtuous while it has only ever seen
///   one choice, or beta_rogue otherwise.
#[derive(Debug, Clone)]
pub struct Nnary {
    alpha: usize,
    beta_virtuous: usize,
    beta_rogue: usize,

    preference: Id,
    preference_strength: HashMap<Id, usize>,

    // choice of the last successful poll
    last_successful: Id,
    confidence: usize,

    rogue: bool,
    finalized: bool,
}

impl Nnary {
    pub fn new(params: &Parameters, choice: Id) -> Self {
        Nnary {
            alpha: params.alpha,
            beta_virtuous: params.beta_virtuous,
            beta_rogue: params.beta_rogue,
            preference: choice,
            preference_strength: HashMap::new(),
            last_successful: choice,
            confidence: 0,
            rogue: false,
            finalized: false,
        }
    }

    /// Adds a competing choice.
    pub fn add(&mut self, choice: Id) {
        if choice != self.preference {
            self.rogue = true;
        }
    }

    pub fn preference(&self) -> Id {
        // Once finalised the decided choice is the one that won the consecutive polls
        if self.finalized {
            return self.last_successful;
        }
        self.preference
    }

    pub fn confidence(&self) -> usize {
        self.confidence
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Applies a poll result. Returns whether the poll was successful.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        match votes.mode() {
            Some((choice, count)) if count >= self.alpha => {
                self.record_successful_poll(choice);
                true
            }
            _ => {
                self.record_unsuccessful_poll();
                false
            }
        }
    }

    pub fn record_successful_poll(&mut self, choice: Id) {
        if self.finalized {
            return;
        }
        let strength = {
            let s = self.preference_strength.entry(choice).or_insert(0);
            *s += 1;
            *s
        };
        let preferred_strength = self.preference_strength.get(&self.preference).cloned().unwrap_or(0);
        if strength > preferred_strength {
            self.preference = choice;
        }

        if choice == self.last_successful {
            self.confidence += 1;
        } else {
            self.last_successful = choice;
            self.confidence = 1;
        }

        self.finalized = (!self.rogue && self.confidence >= self.beta_virtuous)
            || self.confidence >= self.beta_rogue;
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }
}
