//! In-memory vertex storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Manager, Vertex};
use crate::engine::{Error, Result};
use crate::zfx_id::Id;

#[derive(Debug, Default)]
pub struct TestManager {
    vertices: Mutex<HashMap<Id, Vertex>>,
    edge: Mutex<Vec<Id>>,
    failing: AtomicBool,
}

impl TestManager {
    pub fn insert(&self, vtx: Vertex) {
        self.vertices.lock().unwrap().insert(vtx.id(), vtx);
    }

    pub fn set_edge(&self, edge: Vec<Id>) {
        *self.edge.lock().unwrap() = edge;
    }

    /// Makes reading the edge fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Manager for TestManager {
    fn get_vtx(&self, id: &Id) -> Result<Option<Vertex>> {
        Ok(self.vertices.lock().unwrap().get(id).cloned())
    }

    fn edge(&self) -> Result<Vec<Id>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("edge unavailable".to_owned()));
        }
        Ok(self.edge.lock().unwrap().clone())
    }
}
