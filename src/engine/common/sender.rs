use std::collections::HashSet;

use crate::zfx_id::{Id, NodeId};

/// Outbound messages of an engine. Delivery is best effort: a request that is never answered
/// comes back to the engine as the matching failure callback.
pub trait Sender: Send + Sync {
    fn send_get_accepted_frontier(&self, node_ids: HashSet<NodeId>, request_id: u32);

    fn send_accepted_frontier(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>);

    fn send_get_accepted(&self, node_ids: HashSet<NodeId>, request_id: u32, container_ids: Vec<Id>);

    fn send_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>);

    fn send_get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id);

    fn send_ancestors(&self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>);

    fn send_get(&self, node_id: NodeId, request_id: u32, container_id: Id);

    fn send_put(&self, node_id: NodeId, request_id: u32, container: Vec<u8>);

    fn send_push_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container: Vec<u8>);

    fn send_pull_query(&self, node_ids: HashSet<NodeId>, request_id: u32, container_id: Id);

    fn send_chits(&self, node_id: NodeId, request_id: u32, votes: Vec<Id>);

    fn send_gossip(&self, container: Vec<u8>);

    fn send_app_request(&self, node_ids: HashSet<NodeId>, request_id: u32, bytes: Vec<u8>);

    fn send_app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>);

    fn send_app_gossip(&self, bytes: Vec<u8>);
}
