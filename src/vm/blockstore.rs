//! A VM whose blocks carry opaque payloads, persisted in sled.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Block, ChainVm, Error, Result, VmMessage};
use crate::codec;
use crate::consensus::{self, Decidable, Status};
use crate::engine::{self, common::AppHandler};
use crate::storage::block as store;
use crate::zfx_id::{Id, NodeId};

const CODEC_VERSION: u16 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Inner {
    parent: Id,
    height: u64,
    timestamp: u64,
    payload: Vec<u8>,
}

struct State {
    codec: codec::Manager,
    blocks: sled::Tree,
    accepted: sled::Tree,
    // blocks not yet decided
    processing: Mutex<HashMap<Id, Arc<PayloadBlock>>>,
}

impl State {
    fn decode(self: &Arc<Self>, bytes: &[u8], status: Status) -> Result<Arc<PayloadBlock>> {
        let (_, inner): (u16, Inner) = self.codec.unmarshal(bytes)?;
        Ok(Arc::new(PayloadBlock {
            id: Id::new(bytes),
            bytes: bytes.to_vec(),
            inner,
            status: Mutex::new(status),
            state: self.clone(),
        }))
    }

    fn lookup(self: &Arc<Self>, id: &Id) -> Result<Option<Arc<PayloadBlock>>> {
        if let Some(block) = self.processing.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            return Ok(Some(block.clone()));
        }
        match store::get_block(&self.blocks, id)? {
            Some(bytes) => Ok(Some(self.decode(&bytes, Status::Accepted)?)),
            None => Ok(None),
        }
    }

    fn forget(&self, id: &Id) {
        self.processing.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }
}

/// A block of the payload VM.
pub struct PayloadBlock {
    id: Id,
    bytes: Vec<u8>,
    inner: Inner,
    status: Mutex<Status>,
    state: Arc<State>,
}

impl PayloadBlock {
    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    pub fn timestamp(&self) -> u64 {
        self.inner.timestamp
    }

    fn decision_error(&self, err: impl std::fmt::Debug) -> consensus::Error {
        consensus::Error::Decision(self.id, format!("{:?}", err))
    }
}

impl Decidable for PayloadBlock {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept(&self) -> consensus::Result<()> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == Status::Rejected {
            return Err(self.decision_error("accepting a rejected block"));
        }
        store::put_block(&self.state.blocks, &self.id, &self.bytes).map_err(|e| self.decision_error(e))?;
        store::accept_block(&self.state.accepted, self.inner.height, &self.id)
            .map_err(|e| self.decision_error(e))?;
        *status = Status::Accepted;
        self.state.forget(&self.id);
        Ok(())
    }

    fn reject(&self) -> consensus::Result<()> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == Status::Accepted {
            return Err(self.decision_error("rejecting an accepted block"));
        }
        *status = Status::Rejected;
        self.state.forget(&self.id);
        Ok(())
    }
}

impl Block for PayloadBlock {
    fn parent(&self) -> Id {
        self.inner.parent
    }

    fn height(&self) -> u64 {
        self.inner.height
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn verify(&self) -> consensus::Result<()> {
        let invalid = |reason: &str| Err(consensus::Error::InvalidBlock(self.id, reason.to_owned()));
        let parent = match self.state.lookup(&self.inner.parent) {
            Ok(Some(parent)) => parent,
            Ok(None) => return invalid("unknown parent"),
            Err(err) => return Err(self.decision_error(err)),
        };
        if parent.height() + 1 != self.inner.height {
            return invalid("height does not follow the parent");
        }
        if parent.timestamp() > self.inner.timestamp {
            return invalid("timestamp before the parent");
        }
        Ok(())
    }
}

/// Reference VM: blocks order opaque payloads submitted to the node.
pub struct BlockStoreVm {
    state: Arc<State>,
    mempool: Mutex<VecDeque<Vec<u8>>>,
    preference: Mutex<Id>,
    notify: mpsc::UnboundedSender<VmMessage>,
}

impl BlockStoreVm {
    /// Opens the chain stored in `db`, creating it from `genesis` if it is empty. Returns the
    /// VM and the channel of its notifications to the engine.
    pub fn new(
        db: &sled::Db,
        codec: codec::Manager,
        genesis: &[u8],
    ) -> Result<(Self, mpsc::UnboundedReceiver<VmMessage>)> {
        let state = Arc::new(State {
            codec,
            blocks: db.open_tree("blocks").map_err(crate::storage::Error::from)?,
            accepted: db.open_tree("accepted").map_err(crate::storage::Error::from)?,
            processing: Mutex::new(HashMap::new()),
        });
        let last_accepted = match store::get_last_accepted(&state.accepted)? {
            Some((_, id)) => id,
            None => {
                let inner = Inner { parent: Id::zero(), height: 0, timestamp: 0, payload: genesis.to_vec() };
                let bytes = state.codec.marshal(CODEC_VERSION, &inner)?;
                let id = Id::new(&bytes);
                store::put_block(&state.blocks, &id, &bytes)?;
                store::accept_block(&state.accepted, 0, &id)?;
                info!("[{}] created genesis {}", "vm".green(), id);
                id
            }
        };
        let (notify, rx) = mpsc::unbounded_channel();
        let vm = BlockStoreVm {
            state,
            mempool: Mutex::new(VecDeque::new()),
            preference: Mutex::new(last_accepted),
            notify,
        };
        Ok((vm, rx))
    }

    /// Queues a payload for the next block.
    pub fn submit(&self, payload: Vec<u8>) {
        self.mempool.lock().unwrap_or_else(PoisonError::into_inner).push_back(payload);
        let _ = self.notify.send(VmMessage::PendingTxs);
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }
}

impl ChainVm for BlockStoreVm {
    fn build_block(&self) -> Result<Arc<dyn Block>> {
        let parent_id = *self.preference.lock().unwrap_or_else(PoisonError::into_inner);
        let parent = self.state.lookup(&parent_id)?.ok_or(Error::NotFound(parent_id))?;
        let payload = self.mempool.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let payload = payload.ok_or(Error::NoPendingTxs)?;
        let inner = Inner {
            parent: parent_id,
            height: parent.height() + 1,
            timestamp: std::cmp::max(Self::now(), parent.timestamp()),
            payload,
        };
        let bytes = self.state.codec.marshal(CODEC_VERSION, &inner)?;
        let block = self.state.decode(&bytes, Status::Processing)?;
        self.state.processing.lock().unwrap_or_else(PoisonError::into_inner).insert(block.id(), block.clone());
        debug!("[{}] built {} at height {}", "vm".green(), block.id(), block.height());
        Ok(block)
    }

    fn parse_block(&self, bytes: &[u8]) -> Result<Arc<dyn Block>> {
        let id = Id::new(bytes);
        if let Some(block) = self.state.lookup(&id)? {
            return Ok(block);
        }
        let block = self.state.decode(bytes, Status::Processing)?;
        self.state.processing.lock().unwrap_or_else(PoisonError::into_inner).insert(id, block.clone());
        Ok(block)
    }

    fn get_block(&self, id: &Id) -> Result<Arc<dyn Block>> {
        match self.state.lookup(id)? {
            Some(block) => Ok(block),
            None => Err(Error::NotFound(*id)),
        }
    }

    fn set_preference(&self, id: Id) -> Result<()> {
        *self.preference.lock().unwrap_or_else(PoisonError::into_inner) = id;
        Ok(())
    }

    fn last_accepted(&self) -> Result<Id> {
        match store::get_last_accepted(&self.state.accepted)? {
            Some((_, id)) => Ok(id),
            None => Err(Error::Storage(crate::storage::Error::UndefinedGenesis)),
        }
    }

    fn shutdown(&self) -> Result<()> {
        self.state.blocks.flush().map_err(crate::storage::Error::from)?;
        self.state.accepted.flush().map_err(crate::storage::Error::from)?;
        Ok(())
    }
}

/// Payloads gossiped by peers go to the mempool.
impl AppHandler for BlockStoreVm {
    fn app_request(&self, node_id: NodeId, request_id: u32, _deadline: Instant, _request: Vec<u8>) -> engine::Result<()> {
        debug!("[{}] ignoring AppRequest({}) from {}", "vm".green(), request_id, node_id);
        Ok(())
    }

    fn app_request_failed(&self, _node_id: NodeId, _request_id: u32) -> engine::Result<()> {
        Ok(())
    }

    fn app_response(&self, node_id: NodeId, request_id: u32, _response: Vec<u8>) -> engine::Result<()> {
        debug!("[{}] ignoring AppResponse({}) from {}", "vm".green(), request_id, node_id);
        Ok(())
    }

    fn app_gossip(&self, node_id: NodeId, message: Vec<u8>) -> engine::Result<()> {
        debug!("[{}] payload of {} bytes from {}", "vm".green(), message.len(), node_id);
        self.submit(message);
        Ok(())
    }
}
