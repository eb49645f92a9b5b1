//! Allychains and the chains they validate.

mod allychain;
mod tracker;

pub use allychain::Allychain;
pub use tracker::{AllychainTracker, Tracker};
