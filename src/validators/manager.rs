use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Error, Result, Set};
use crate::zfx_id::{Id, NodeId};

/// Validator sets of every allychain the node knows about.
///
/// Masking is global: a masked validator is masked in every set, including sets created
/// after the mask was applied. The manager lock is always taken before a set's own lock.
#[derive(Debug, Default)]
pub struct Manager {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    allychains: HashMap<Id, Arc<Set>>,
    masked: HashSet<NodeId>,
}

impl Inner {
    fn get_or_create(&mut self, allychain_id: Id) -> Arc<Set> {
        let masked = &self.masked;
        self.allychains
            .entry(allychain_id)
            .or_insert_with(|| Arc::new(Set::with_masked(masked.clone())))
            .clone()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the validators of `allychain_id`.
    pub fn set(&self, allychain_id: Id, validators: &[(NodeId, u64)]) -> Result<()> {
        let mut inner = self.write();
        inner.get_or_create(allychain_id).set(validators)
    }

    pub fn add_weight(&self, allychain_id: Id, validator: NodeId, weight: u64) -> Result<()> {
        let mut inner = self.write();
        inner.get_or_create(allychain_id).add_weight(validator, weight)
    }

    pub fn remove_weight(&self, allychain_id: Id, validator: NodeId, weight: u64) -> Result<()> {
        let inner = self.write();
        match inner.allychains.get(&allychain_id) {
            Some(set) => set.remove_weight(validator, weight),
            None => Err(Error::MissingAllychain(allychain_id)),
        }
    }

    pub fn get_validators(&self, allychain_id: &Id) -> Option<Arc<Set>> {
        self.read().allychains.get(allychain_id).cloned()
    }

    /// The set of `allychain_id`, created empty (with the current masks) if unknown.
    pub fn get_or_create(&self, allychain_id: Id) -> Arc<Set> {
        self.write().get_or_create(allychain_id)
    }

    pub fn contains(&self, allychain_id: &Id, validator: &NodeId) -> bool {
        match self.read().allychains.get(allychain_id) {
            Some(set) => set.contains(validator),
            None => false,
        }
    }

    pub fn mask_validator(&self, validator: NodeId) {
        let mut inner = self.write();
        if !inner.masked.insert(validator) {
            return;
        }
        for set in inner.allychains.values() {
            set.mask_validator(validator);
        }
    }

    /// Reveals `validator` in every set, or in none of them if any set would overflow.
    pub fn reveal_validator(&self, validator: &NodeId) -> Result<()> {
        let mut inner = self.write();
        if !inner.masked.contains(validator) {
            return Ok(());
        }
        let mut revealed: Vec<&Arc<Set>> = Vec::with_capacity(inner.allychains.len());
        for set in inner.allychains.values() {
            if let Err(err) = set.reveal_validator(validator) {
                for set in revealed {
                    set.mask_validator(*validator);
                }
                return Err(err);
            }
            revealed.push(set);
        }
        inner.masked.remove(validator);
        Ok(())
    }
}
