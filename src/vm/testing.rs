//! In-memory VM over test blocks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{ChainVm, Error, Result};
use crate::consensus::snowman::testing::TestBlock;
use crate::consensus::snowman::Block;
use crate::consensus::{Decidable, Status};
use crate::zfx_id::Id;

#[derive(Debug)]
pub struct TestVm {
    genesis: Id,
    blocks: Mutex<HashMap<Id, Arc<TestBlock>>>,
    to_build: Mutex<VecDeque<Arc<TestBlock>>>,
    preference: Mutex<Id>,
    failing: AtomicBool,
}

impl TestVm {
    pub fn new(genesis: Arc<TestBlock>) -> Arc<TestVm> {
        let id = genesis.id();
        let mut blocks = HashMap::new();
        blocks.insert(id, genesis);
        Arc::new(TestVm {
            genesis: id,
            blocks: Mutex::new(blocks),
            to_build: Mutex::new(VecDeque::new()),
            preference: Mutex::new(id),
            failing: AtomicBool::new(false),
        })
    }

    /// Makes `block` known locally.
    pub fn insert(&self, block: Arc<TestBlock>) {
        self.blocks.lock().unwrap().insert(block.id(), block);
    }

    /// `block` will be returned by the next `build_block`.
    pub fn queue_build(&self, block: Arc<TestBlock>) {
        self.to_build.lock().unwrap().push_back(block);
    }

    pub fn block(&self, id: &Id) -> Option<Arc<TestBlock>> {
        self.blocks.lock().unwrap().get(id).cloned()
    }

    pub fn preference(&self) -> Id {
        *self.preference.lock().unwrap()
    }

    /// Makes reading the last accepted block fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ChainVm for TestVm {
    fn build_block(&self) -> Result<Arc<dyn Block>> {
        let block = self.to_build.lock().unwrap().pop_front().ok_or(Error::NoPendingTxs)?;
        self.insert(block.clone());
        Ok(block)
    }

    fn parse_block(&self, bytes: &[u8]) -> Result<Arc<dyn Block>> {
        let id = Id::new(bytes);
        if let Some(block) = self.block(&id) {
            return Ok(block);
        }
        let block = TestBlock::decode(bytes).ok_or_else(|| Error::Parse("short test block".to_owned()))?;
        let block = Arc::new(block);
        self.insert(block.clone());
        Ok(block)
    }

    fn get_block(&self, id: &Id) -> Result<Arc<dyn Block>> {
        match self.block(id) {
            Some(block) => Ok(block),
            None => Err(Error::NotFound(*id)),
        }
    }

    fn set_preference(&self, id: Id) -> Result<()> {
        *self.preference.lock().unwrap() = id;
        Ok(())
    }

    fn last_accepted(&self) -> Result<Id> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::NotFound(self.genesis));
        }
        let blocks = self.blocks.lock().unwrap();
        let last = blocks
            .values()
            .filter(|b| b.status() == Status::Accepted)
            .max_by_key(|b| b.height())
            .map(|b| b.id())
            .unwrap_or(self.genesis);
        Ok(last)
    }
}
