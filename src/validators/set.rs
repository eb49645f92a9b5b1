use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Error, Result};
use crate::util::sampler::WeightedWithoutReplacement;
use crate::zfx_id::NodeId;

/// A weighted set of validators.
///
/// A masked validator keeps its weight but is left out of sampling and of the total weight.
/// A validator can be masked before it is ever added, in which case it joins masked.
#[derive(Debug, Default)]
pub struct Set {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    weights: HashMap<NodeId, u64>,
    masked: HashSet<NodeId>,
    // Sum of the weights of unmasked validators
    total: u64,
}

impl Inner {
    fn counted(&self, validator: &NodeId) -> bool {
        !self.masked.contains(validator)
    }
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set which starts out with `masked` already masked.
    pub fn with_masked(masked: HashSet<NodeId>) -> Self {
        Set { inner: RwLock::new(Inner { masked, ..Inner::default() }) }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the whole set. The masks are kept.
    pub fn set(&self, validators: &[(NodeId, u64)]) -> Result<()> {
        let mut inner = self.write();
        let mut weights = HashMap::with_capacity(validators.len());
        let mut total = 0u64;
        for (validator, weight) in validators.iter() {
            if *weight == 0 {
                continue;
            }
            let entry = weights.entry(*validator).or_insert(0u64);
            *entry = entry.checked_add(*weight).ok_or(Error::WeightOverflow)?;
            if inner.counted(validator) {
                total = total.checked_add(*weight).ok_or(Error::WeightOverflow)?;
            }
        }
        inner.weights = weights;
        inner.total = total;
        Ok(())
    }

    pub fn add_weight(&self, validator: NodeId, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        let mut inner = self.write();
        let current = inner.weights.get(&validator).cloned().unwrap_or(0);
        let new_weight = current.checked_add(weight).ok_or(Error::WeightOverflow)?;
        if inner.counted(&validator) {
            inner.total = inner.total.checked_add(weight).ok_or(Error::WeightOverflow)?;
        }
        inner.weights.insert(validator, new_weight);
        Ok(())
    }

    pub fn remove_weight(&self, validator: NodeId, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        let mut inner = self.write();
        let current = match inner.weights.get(&validator) {
            Some(w) => *w,
            None => return Err(Error::MissingValidator(validator)),
        };
        if weight > current {
            return Err(Error::InsufficientWeight { validator, weight: current, removed: weight });
        }
        if inner.counted(&validator) {
            inner.total -= weight;
        }
        if current == weight {
            inner.weights.remove(&validator);
        } else {
            inner.weights.insert(validator, current - weight);
        }
        Ok(())
    }

    pub fn get_weight(&self, validator: &NodeId) -> u64 {
        self.read().weights.get(validator).cloned().unwrap_or(0)
    }

    pub fn contains(&self, validator: &NodeId) -> bool {
        self.read().weights.contains_key(validator)
    }

    pub fn len(&self) -> usize {
        self.read().weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().weights.is_empty()
    }

    /// All validators with their weights, in canonical order.
    pub fn list(&self) -> Vec<(NodeId, u64)> {
        let mut list: Vec<(NodeId, u64)> =
            self.read().weights.iter().map(|(v, w)| (*v, *w)).collect();
        list.sort();
        list
    }

    /// Total weight of the unmasked validators.
    pub fn weight(&self) -> u64 {
        self.read().total
    }

    pub fn is_masked(&self, validator: &NodeId) -> bool {
        self.read().masked.contains(validator)
    }

    /// Samples `size` validators proportionally to their weight. A validator may appear more
    /// than once. Masked validators are never drawn.
    pub fn sample(&self, size: usize) -> Result<Vec<NodeId>> {
        let candidates: Vec<(NodeId, u64)> = {
            let inner = self.read();
            let mut candidates: Vec<(NodeId, u64)> = inner
                .weights
                .iter()
                .filter(|(v, _)| inner.counted(v))
                .map(|(v, w)| (*v, *w))
                .collect();
            candidates.sort();
            candidates
        };
        let weights: Vec<u64> = candidates.iter().map(|(_, w)| *w).collect();
        let mut sampler = WeightedWithoutReplacement::new();
        sampler.initialize(&weights)?;
        let indices = sampler.sample(size)?;
        Ok(indices.into_iter().map(|i| candidates[i].0).collect())
    }

    pub fn mask_validator(&self, validator: NodeId) {
        let mut inner = self.write();
        if !inner.masked.insert(validator) {
            return;
        }
        if let Some(w) = inner.weights.get(&validator).cloned() {
            inner.total -= w;
        }
    }

    pub fn reveal_validator(&self, validator: &NodeId) -> Result<()> {
        let mut inner = self.write();
        if !inner.masked.contains(validator) {
            return Ok(());
        }
        if let Some(w) = inner.weights.get(validator).cloned() {
            inner.total = inner.total.checked_add(w).ok_or(Error::WeightOverflow)?;
        }
        inner.masked.remove(validator);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::zfx_id::Id;

    #[test]
    fn test_add_remove_weight() {
        let set = Set::new();
        let v = Id::one();
        set.add_weight(v, 10).unwrap();
        set.add_weight(v, 5).unwrap();
        assert_eq!(set.get_weight(&v), 15);
        assert_eq!(set.weight(), 15);

        assert_eq!(
            set.remove_weight(v, 20),
            Err(Error::InsufficientWeight { validator: v, weight: 15, removed: 20 })
        );
        assert_eq!(set.remove_weight(Id::two(), 1), Err(Error::MissingValidator(Id::two())));
        set.remove_weight(v, 15).unwrap();
        assert!(!set.contains(&v));
        assert_eq!(set.weight(), 0);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let set = Set::new();
        set.add_weight(Id::one(), u64::MAX).unwrap();
        assert_eq!(set.add_weight(Id::two(), 1), Err(Error::WeightOverflow));
        assert_eq!(set.add_weight(Id::one(), 1), Err(Error::WeightOverflow));
        // Nothing changed
        assert_eq!(set.len(), 1);
        assert_eq!(set.weight(), u64::MAX);
    }

    #[test]
    fn test_masked_validators_are_not_sampled() {
        let set = Set::new();
        set.set(&[(Id::one(), 1), (Id::two(), 1)]).unwrap();
        set.mask_validator(Id::one());
        assert_eq!(set.weight(), 1);
        assert_eq!(set.sample(1).unwrap(), vec![Id::two()]);
        assert!(set.sample(2).is_err());

        set.reveal_validator(&Id::one()).unwrap();
        assert_eq!(set.weight(), 2);
        let mut sampled = set.sample(2).unwrap();
        sampled.sort();
        assert_eq!(sampled, vec![Id::one(), Id::two()]);
    }
}
