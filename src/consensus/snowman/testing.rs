//! Blocks for tests.

use std::sync::{Arc, Mutex};

use super::Block;
use crate::consensus::{Decidable, Error, Result, Status};
use crate::zfx_id::Id;

#[derive(Debug)]
pub struct TestBlock {
    id: Id,
    parent: Id,
    height: u64,
    bytes: Vec<u8>,
    status: Mutex<Status>,
    pub valid: bool,
}

impl TestBlock {
    pub fn genesis() -> Arc<TestBlock> {
        let bytes = b"genesis".to_vec();
        Arc::new(TestBlock {
            id: Id::new(&bytes),
            parent: Id::zero(),
            height: 0,
            bytes,
            status: Mutex::new(Status::Accepted),
            valid: true,
        })
    }

    /// Encodes parent, height and seed so that `TestBlock::decode` can rebuild the block.
    pub fn child_of(parent: &TestBlock, seed: &[u8]) -> Arc<TestBlock> {
        let height = parent.height + 1;
        let mut bytes = parent.id.as_bytes().to_vec();
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(seed);
        Arc::new(TestBlock {
            id: Id::new(&bytes),
            parent: parent.id,
            height,
            bytes,
            status: Mutex::new(Status::Processing),
            valid: true,
        })
    }

    pub fn invalid_child_of(parent: &TestBlock, seed: &[u8]) -> Arc<TestBlock> {
        let block = TestBlock::child_of(parent, seed);
        let mut block = Arc::try_unwrap(block).unwrap();
        block.valid = false;
        Arc::new(block)
    }

    pub fn decode(bytes: &[u8]) -> Option<TestBlock> {
        if bytes.len() < 40 {
            return None;
        }
        let mut parent = [0u8; 32];
        parent.copy_from_slice(&bytes[..32]);
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[32..40]);
        Some(TestBlock {
            id: Id::new(bytes),
            parent: Id::from(parent),
            height: u64::from_be_bytes(height),
            bytes: bytes.to_vec(),
            status: Mutex::new(Status::Processing),
            valid: true,
        })
    }

    pub fn set_status(&self, status: Status) {
        *self.status.lock().unwrap() = status;
    }
}

impl Decidable for TestBlock {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    fn accept(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap();
        if *status == Status::Rejected {
            return Err(Error::Decision(self.id, "accepting a rejected block".to_owned()));
        }
        *status = Status::Accepted;
        Ok(())
    }

    fn reject(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap();
        if *status == Status::Accepted {
            return Err(Error::Decision(self.id, "rejecting an accepted block".to_owned()));
        }
        *status = Status::Rejected;
        Ok(())
    }
}

impl Block for TestBlock {
    fn parent(&self) -> Id {
        self.parent
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn verify(&self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::InvalidBlock(self.id, "invalid test block".to_owned()))
        }
    }
}
