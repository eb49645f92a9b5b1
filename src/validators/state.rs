use std::collections::HashMap;

use super::{Manager, Result};
use crate::zfx_id::{Id, NodeId};

/// Source of historical validator sets, indexed by core-chain height.
pub trait State: Send + Sync {
    fn get_current_height(&self) -> Result<u64>;

    fn get_validator_set(&self, height: u64, allychain_id: &Id) -> Result<HashMap<NodeId, u64>>;
}

/// The manager only knows the current sets, which it reports for every height.
impl State for Manager {
    fn get_current_height(&self) -> Result<u64> {
        Ok(0)
    }

    fn get_validator_set(&self, _height: u64, allychain_id: &Id) -> Result<HashMap<NodeId, u64>> {
        Ok(match self.get_validators(allychain_id) {
            Some(set) => set.list().into_iter().collect(),
            None => HashMap::new(),
        })
    }
}
