use super::{Error, Result};
use crate::codec;
use crate::consensus::Status;
use crate::engine;
use crate::engine::avalanche::{Manager, Vertex};
use crate::zfx_id::Id;

/// Vertices of a DAG chain, with their status and the accepted frontier.
pub struct VertexStore {
    codec: codec::Manager,
    vertices: sled::Tree,
    status: sled::Tree,
    edge: sled::Tree,
}

impl VertexStore {
    pub fn open(db: &sled::Db, codec: codec::Manager) -> Result<Self> {
        Ok(VertexStore {
            codec,
            vertices: db.open_tree("vertices")?,
            status: db.open_tree("vertex_status")?,
            edge: db.open_tree("edge")?,
        })
    }

    /// Stores a vertex with its current status.
    pub fn put(&self, vtx: &Vertex) -> Result<()> {
        let _ = self.vertices.insert(vtx.id().as_bytes(), vtx.bytes())?;
        self.set_status(&vtx.id(), vtx.status())
    }

    /// Updates the status of a stored vertex. An accepted vertex replaces its parents in the
    /// accepted frontier.
    pub fn set_status(&self, id: &Id, status: Status) -> Result<()> {
        if status == Status::Accepted {
            let vtx = self.get(id)?.ok_or(Error::MissingVertex(*id))?;
            for parent in vtx.parents() {
                let _ = self.edge.remove(parent.as_bytes())?;
            }
            let _ = self.edge.insert(id.as_bytes(), Vec::<u8>::new())?;
        }
        let _ = self.status.insert(id.as_bytes(), bincode::serialize(&status)?)?;
        Ok(())
    }

    pub fn get(&self, id: &Id) -> Result<Option<Vertex>> {
        let bytes = match self.vertices.get(id.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let status = match self.status.get(id.as_bytes())? {
            Some(status) => bincode::deserialize(status.as_ref())?,
            None => Status::Unknown,
        };
        let vtx = Vertex::parse(&self.codec, bytes.as_ref()).map_err(|err| match err {
            engine::Error::Codec(err) => Error::Codec(err),
            other => Error::Bincode(format!("{:?}", other)),
        })?;
        Ok(Some(vtx.with_status(status)))
    }

    pub fn accepted_frontier(&self) -> Result<Vec<Id>> {
        let mut edge = vec![];
        for kv in self.edge.iter() {
            let (k, _) = kv?;
            let mut bytes = [0u8; 32];
            if k.len() != bytes.len() {
                return Err(Error::InvalidKey);
            }
            bytes.copy_from_slice(k.as_ref());
            edge.push(Id::from(bytes));
        }
        Ok(edge)
    }
}

impl Manager for VertexStore {
    fn get_vtx(&self, id: &Id) -> engine::Result<Option<Vertex>> {
        Ok(self.get(id)?)
    }

    fn edge(&self) -> engine::Result<Vec<Id>> {
        Ok(self.accepted_frontier()?)
    }
}
