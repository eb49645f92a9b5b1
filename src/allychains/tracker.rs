use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::Allychain;
use crate::zfx_id::Id;

/// Which allychains this node validates.
pub trait AllychainTracker: Send + Sync {
    fn tracks_allychain(&self, allychain_id: &Id) -> bool;
}

/// The allychains known to the node, with their bootstrap trackers.
#[derive(Debug, Default)]
pub struct Tracker {
    tracked: HashSet<Id>,
    allychains: RwLock<HashMap<Id, Arc<Allychain>>>,
}

impl Tracker {
    /// `tracked` is fixed for the lifetime of the node.
    pub fn new(tracked: HashSet<Id>) -> Self {
        Tracker { tracked, allychains: RwLock::new(HashMap::new()) }
    }

    /// The bootstrap tracker of `allychain_id`, created on first use.
    pub fn allychain(&self, allychain_id: Id) -> Arc<Allychain> {
        if let Some(allychain) =
            self.allychains.read().unwrap_or_else(PoisonError::into_inner).get(&allychain_id)
        {
            return allychain.clone();
        }
        self.allychains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(allychain_id)
            .or_insert_with(|| Arc::new(Allychain::new(allychain_id)))
            .clone()
    }

    /// Whether every known allychain has finished bootstrapping.
    pub fn all_bootstrapped(&self) -> bool {
        self.allychains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(|a| a.is_bootstrapped())
    }
}

impl AllychainTracker for Tracker {
    fn tracks_allychain(&self, allychain_id: &Id) -> bool {
        self.tracked.contains(allychain_id)
    }
}
