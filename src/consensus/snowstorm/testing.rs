//! Transactions for tests.

use std::sync::{Arc, Mutex};

use super::Tx;
use crate::consensus::{Decidable, Error, Result, Status};
use crate::zfx_id::Id;

#[derive(Debug)]
pub struct TestTx {
    id: Id,
    deps: Vec<Arc<TestTx>>,
    inputs: Vec<Id>,
    bytes: Vec<u8>,
    status: Mutex<Status>,
}

impl TestTx {
    pub fn new(seed: &[u8], inputs: &[Id]) -> Arc<TestTx> {
        TestTx::with_deps(seed, inputs, vec![])
    }

    pub fn with_deps(seed: &[u8], inputs: &[Id], deps: Vec<Arc<TestTx>>) -> Arc<TestTx> {
        Arc::new(TestTx {
            id: Id::new(seed),
            deps,
            inputs: inputs.to_vec(),
            bytes: seed.to_vec(),
            status: Mutex::new(Status::Processing),
        })
    }
}

impl Decidable for TestTx {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    fn accept(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap();
        if status.decided() {
            return Err(Error::Decision(self.id, format!("already {:?}", *status)));
        }
        *status = Status::Accepted;
        Ok(())
    }

    fn reject(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap();
        if status.decided() {
            return Err(Error::Decision(self.id, format!("already {:?}", *status)));
        }
        *status = Status::Rejected;
        Ok(())
    }
}

impl Tx for TestTx {
    fn dependencies(&self) -> Vec<Arc<dyn Tx>> {
        self.deps.iter().map(|d| d.clone() as Arc<dyn Tx>).collect()
    }

    fn input_ids(&self) -> Vec<Id> {
        self.inputs.clone()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
