//! Small building blocks shared by the consensus and networking layers.

pub mod bag;
pub mod latch;
pub mod meter;
pub mod sampler;

pub use bag::Bag;
pub use latch::Latch;
