use std::collections::HashMap;
use std::hash::Hash;

/// A multiset: every element carries a multiplicity.
///
/// Polls use bags both for the sampled validators (a validator may be drawn more than once
/// and then counts more than once) and for the votes they collect.
#[derive(Debug, Clone)]
pub struct Bag<T: Eq + Hash> {
    counts: HashMap<T, usize>,
    size: usize,
}

impl<T: Eq + Hash> Default for Bag<T> {
    fn default() -> Self {
        Bag { counts: HashMap::default(), size: 0 }
    }
}

impl<T: Eq + Hash + Ord + Clone> PartialEq for Bag<T> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.counts == other.counts
    }
}

impl<T: Eq + Hash + Ord + Clone> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Bag::new();
        for t in iter {
            bag.add(t);
        }
        bag
    }
}

impl<T: Eq + Hash + Ord + Clone> Bag<T> {
    pub fn new() -> Self {
        Bag::default()
    }

    pub fn add(&mut self, t: T) {
        self.add_count(t, 1)
    }

    pub fn add_count(&mut self, t: T, count: usize) {
        if count == 0 {
            return;
        }
        *self.counts.entry(t).or_insert(0) += count;
        self.size += count;
    }

    pub fn count(&self, t: &T) -> usize {
        self.counts.get(t).cloned().unwrap_or(0)
    }

    /// Total multiplicity of the bag.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Removes every occurrence of `t`, returning how many there were.
    pub fn remove(&mut self, t: &T) -> usize {
        match self.counts.remove(t) {
            Some(count) => {
                self.size -= count;
                count
            }
            None => 0,
        }
    }

    /// The distinct elements, in canonical order.
    pub fn list(&self) -> Vec<T> {
        let mut elems: Vec<T> = self.counts.keys().cloned().collect();
        elems.sort();
        elems
    }

    /// The most frequent element and its count. Ties go to the smallest element so that
    /// every node picks the same one.
    pub fn mode(&self) -> Option<(T, usize)> {
        let mut mode: Option<(&T, usize)> = None;
        for (t, count) in self.counts.iter() {
            mode = match mode {
                Some((m, c)) if c > *count || (c == *count && m < t) => Some((m, c)),
                _ => Some((t, *count)),
            };
        }
        mode.map(|(t, c)| (t.clone(), c))
    }

    /// Elements appearing at least `threshold` times, in canonical order.
    pub fn threshold(&self, threshold: usize) -> Vec<T> {
        let mut elems: Vec<T> =
            self.counts.iter().filter(|(_, c)| **c >= threshold).map(|(t, _)| t.clone()).collect();
        elems.sort();
        elems
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &usize)> {
        self.counts.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::zfx_id::Id;

    #[test]
    fn test_counts() {
        let mut bag = Bag::new();
        bag.add(Id::one());
        bag.add_count(Id::two(), 3);
        bag.add_count(Id::zero(), 0);
        assert_eq!(bag.len(), 4);
        assert_eq!(bag.count(&Id::two()), 3);
        assert_eq!(bag.count(&Id::zero()), 0);
        assert_eq!(bag.list(), vec![Id::one(), Id::two()]);
        assert_eq!(bag.remove(&Id::two()), 3);
        assert_eq!(bag.remove(&Id::two()), 0);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_mode_breaks_ties_canonically() {
        let mut bag = Bag::new();
        assert_eq!(bag.mode(), None);
        bag.add_count(Id::two(), 2);
        bag.add_count(Id::one(), 2);
        assert_eq!(bag.mode(), Some((Id::one(), 2)));
        bag.add(Id::two());
        assert_eq!(bag.mode(), Some((Id::two(), 3)));
        assert_eq!(bag.threshold(3), vec![Id::two()]);
    }
}
