//! Jobs waiting on other items to be decided or fetched.

use std::collections::{HashMap, HashSet};

use crate::zfx_id::Id;

/// A job that can only run once a set of ids has been resolved.
pub trait Blockable {
    /// Ids still unresolved.
    fn dependencies(&self) -> &HashSet<Id>;

    /// `id` was resolved.
    fn fulfill(&mut self, id: &Id);

    /// `id` can never be resolved.
    fn abandon(&mut self, id: &Id);
}

/// Parks jobs until their dependencies are fulfilled.
///
/// The blocker never runs a job itself: `fulfill` and `abandon` hand back the jobs that became
/// ready or were abandoned, and the caller, which owns the state the jobs act on, runs them.
#[derive(Debug)]
pub struct Blocker<J> {
    next_key: u64,
    jobs: HashMap<u64, J>,
    waiting: HashMap<Id, Vec<u64>>,
}

impl<J> Default for Blocker<J> {
    fn default() -> Self {
        Blocker { next_key: 0, jobs: HashMap::new(), waiting: HashMap::new() }
    }
}

impl<J: Blockable> Blocker<J> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `job`, or hands it straight back if it has nothing to wait for.
    pub fn register(&mut self, job: J) -> Option<J> {
        if job.dependencies().is_empty() {
            return Some(job);
        }
        let key = self.next_key;
        self.next_key += 1;
        for dep in job.dependencies().iter() {
            self.waiting.entry(*dep).or_default().push(key);
        }
        self.jobs.insert(key, job);
        None
    }

    /// Marks `id` as resolved and returns the jobs with no dependencies left.
    pub fn fulfill(&mut self, id: &Id) -> Vec<J> {
        let keys = match self.waiting.remove(id) {
            Some(keys) => keys,
            None => return vec![],
        };
        let mut ready = vec![];
        for key in keys {
            let done = match self.jobs.get_mut(&key) {
                Some(job) => {
                    job.fulfill(id);
                    job.dependencies().is_empty()
                }
                // Abandoned through another dependency
                None => false,
            };
            if done {
                if let Some(job) = self.jobs.remove(&key) {
                    ready.push(job);
                }
            }
        }
        ready
    }

    /// Marks `id` as unresolvable and returns every job that was waiting on it.
    pub fn abandon(&mut self, id: &Id) -> Vec<J> {
        let keys = match self.waiting.remove(id) {
            Some(keys) => keys,
            None => return vec![],
        };
        let mut abandoned = vec![];
        for key in keys {
            if let Some(mut job) = self.jobs.remove(&key) {
                job.abandon(id);
                abandoned.push(job);
            }
        }
        abandoned
    }

    /// Whether some job is waiting on `id`.
    pub fn is_blocking(&self, id: &Id) -> bool {
        self.waiting.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
