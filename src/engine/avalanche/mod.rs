//! DAG chains: vertices, their storage interface and the getter serving them to peers.

mod getter;
mod vertex;

pub use getter::Getter;
pub use vertex::{Vertex, CODEC_VERSION};

use super::Result;
use crate::zfx_id::Id;

/// Local vertex storage.
pub trait Manager: Send + Sync {
    /// `None` if the vertex is not known locally.
    fn get_vtx(&self, id: &Id) -> Result<Option<Vertex>>;

    /// The accepted frontier: accepted vertices without accepted children.
    fn edge(&self) -> Result<Vec<Id>>;
}

#[cfg(test)]
pub mod testing;
