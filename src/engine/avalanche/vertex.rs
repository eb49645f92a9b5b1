use crate::codec;
use crate::consensus::Status;
use crate::engine::Result;
use crate::zfx_id::Id;

pub const CODEC_VERSION: u16 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Inner {
    chain_id: Id,
    height: u64,
    parents: Vec<Id>,
    txs: Vec<Vec<u8>>,
}

/// A DAG vertex. The id is the hash of the vertex's encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    id: Id,
    bytes: Vec<u8>,
    inner: Inner,
    status: Status,
}

impl Vertex {
    /// Builds a new vertex. Parents are sorted and deduplicated so that equal vertices encode
    /// equally.
    pub fn build(
        codec: &codec::Manager,
        chain_id: Id,
        height: u64,
        mut parents: Vec<Id>,
        txs: Vec<Vec<u8>>,
    ) -> Result<Vertex> {
        parents.sort();
        parents.dedup();
        let inner = Inner { chain_id, height, parents, txs };
        let bytes = codec.marshal(CODEC_VERSION, &inner)?;
        Ok(Vertex { id: Id::new(&bytes), bytes, inner, status: Status::Processing })
    }

    pub fn parse(codec: &codec::Manager, bytes: &[u8]) -> Result<Vertex> {
        let (_version, inner): (u16, Inner) = codec.unmarshal(bytes)?;
        Ok(Vertex { id: Id::new(bytes), bytes: bytes.to_vec(), inner, status: Status::Processing })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn chain_id(&self) -> Id {
        self.inner.chain_id
    }

    pub fn height(&self) -> u64 {
        self.inner.height
    }

    pub fn parents(&self) -> &[Id] {
        &self.inner.parents
    }

    pub fn txs(&self) -> &[Vec<u8>] {
        &self.inner.txs
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}
