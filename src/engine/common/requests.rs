use std::collections::HashMap;

use crate::zfx_id::{Id, NodeId};

/// Request id of `Put`s that gossip a container rather than answer a `Get`. Never used for a
/// request.
pub const GOSSIP_REQUEST_ID: u32 = u32::MAX;

/// The request id following `last`, wrapping around and skipping `GOSSIP_REQUEST_ID`.
pub fn next_request_id(last: u32) -> u32 {
    match last.wrapping_add(1) {
        GOSSIP_REQUEST_ID => 0,
        next => next,
    }
}

/// Outstanding requests for containers, keyed by the node and request id they were sent with.
#[derive(Debug, Default)]
pub struct Requests {
    requests: HashMap<(NodeId, u32), Id>,
    // number of outstanding requests per container
    containers: HashMap<Id, usize>,
}

impl Requests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node_id: NodeId, request_id: u32, container_id: Id) {
        if let Some(previous) = self.requests.insert((node_id, request_id), container_id) {
            self.forget(&previous);
        }
        *self.containers.entry(container_id).or_insert(0) += 1;
    }

    /// Removes the request and returns the container it was for.
    pub fn remove(&mut self, node_id: &NodeId, request_id: u32) -> Option<Id> {
        let container_id = self.requests.remove(&(*node_id, request_id))?;
        self.forget(&container_id);
        Some(container_id)
    }

    /// Removes every request for `container_id`. Returns whether there was any.
    pub fn remove_any(&mut self, container_id: &Id) -> bool {
        if self.containers.remove(container_id).is_none() {
            return false;
        }
        self.requests.retain(|_, id| id != container_id);
        true
    }

    pub fn contains(&self, container_id: &Id) -> bool {
        self.containers.contains_key(container_id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn forget(&mut self, container_id: &Id) {
        if let Some(n) = self.containers.get_mut(container_id) {
            *n -= 1;
            if *n == 0 {
                self.containers.remove(container_id);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_ids_skip_the_gossip_id() {
        assert_eq!(next_request_id(7), 8);
        assert_eq!(next_request_id(u32::MAX - 1), 0);
        assert_eq!(next_request_id(GOSSIP_REQUEST_ID), 0);
    }

    #[test]
    fn test_requests() {
        let mut reqs = Requests::new();
        let (a, b) = (Id::one(), Id::two());
        let x = Id::new(b"x");
        reqs.add(a, 1, x);
        reqs.add(b, 2, x);
        assert!(reqs.contains(&x));
        assert_eq!(reqs.remove(&a, 2), None);
        assert_eq!(reqs.remove(&a, 1), Some(x));
        assert!(reqs.contains(&x));
        assert!(reqs.remove_any(&x));
        assert!(!reqs.contains(&x));
        assert_eq!(reqs.remove(&b, 2), None);
        assert!(reqs.is_empty());
    }
}
