use std::time::{Duration, Instant};

use super::throttling::BufferPermit;
use crate::vm::VmMessage;
use crate::zfx_id::{Id, NodeId};

/// Message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    GetAcceptedFrontier,
    AcceptedFrontier,
    GetAcceptedFrontierFailed,
    GetAccepted,
    Accepted,
    GetAcceptedFailed,
    GetAncestors,
    Ancestors,
    GetAncestorsFailed,
    Get,
    Put,
    GetFailed,
    PushQuery,
    PullQuery,
    Chits,
    QueryFailed,
    AppRequest,
    AppResponse,
    AppRequestFailed,
    AppGossip,
    Connected,
    Disconnected,
    Notify,
    GossipRequest,
    Timeout,
}

impl Op {
    /// Application level messages, handled outside the engine lock.
    pub fn is_async(&self) -> bool {
        matches!(self, Op::AppRequest | Op::AppResponse | Op::AppRequestFailed | Op::AppGossip)
    }

    /// Messages produced locally that a peer may never send.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Op::GetAcceptedFrontierFailed
                | Op::GetAcceptedFailed
                | Op::GetAncestorsFailed
                | Op::GetFailed
                | Op::QueryFailed
                | Op::AppRequestFailed
                | Op::Connected
                | Op::Disconnected
                | Op::Notify
                | Op::GossipRequest
                | Op::Timeout
        )
    }

    /// The response a request expects, `None` for anything that is not a request.
    pub fn response(&self) -> Option<Op> {
        match self {
            Op::GetAcceptedFrontier => Some(Op::AcceptedFrontier),
            Op::GetAccepted => Some(Op::Accepted),
            Op::GetAncestors => Some(Op::Ancestors),
            Op::Get => Some(Op::Put),
            Op::PushQuery | Op::PullQuery => Some(Op::Chits),
            Op::AppRequest => Some(Op::AppResponse),
            _ => None,
        }
    }

    /// The failure delivered locally when a request goes unanswered.
    pub fn failure(&self) -> Option<Op> {
        match self {
            Op::GetAcceptedFrontier => Some(Op::GetAcceptedFrontierFailed),
            Op::GetAccepted => Some(Op::GetAcceptedFailed),
            Op::GetAncestors => Some(Op::GetAncestorsFailed),
            Op::Get => Some(Op::GetFailed),
            Op::PushQuery | Op::PullQuery => Some(Op::QueryFailed),
            Op::AppRequest => Some(Op::AppRequestFailed),
            _ => None,
        }
    }

    /// Whether the message answers a request, successfully or not.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Op::AcceptedFrontier
                | Op::GetAcceptedFrontierFailed
                | Op::Accepted
                | Op::GetAcceptedFailed
                | Op::Ancestors
                | Op::GetAncestorsFailed
                | Op::Put
                | Op::GetFailed
                | Op::Chits
                | Op::QueryFailed
                | Op::AppResponse
                | Op::AppRequestFailed
        )
    }
}

/// A consensus message with its typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    GetAcceptedFrontier { request_id: u32 },
    AcceptedFrontier { request_id: u32, container_ids: Vec<Id> },
    GetAcceptedFrontierFailed { request_id: u32 },
    GetAccepted { request_id: u32, container_ids: Vec<Id> },
    Accepted { request_id: u32, container_ids: Vec<Id> },
    GetAcceptedFailed { request_id: u32 },
    GetAncestors { request_id: u32, container_id: Id },
    Ancestors { request_id: u32, containers: Vec<Vec<u8>> },
    GetAncestorsFailed { request_id: u32 },
    Get { request_id: u32, container_id: Id },
    Put { request_id: u32, container: Vec<u8> },
    GetFailed { request_id: u32 },
    PushQuery { request_id: u32, container: Vec<u8> },
    PullQuery { request_id: u32, container_id: Id },
    Chits { request_id: u32, votes: Vec<Id> },
    QueryFailed { request_id: u32 },
    AppRequest { request_id: u32, bytes: Vec<u8> },
    AppResponse { request_id: u32, bytes: Vec<u8> },
    AppRequestFailed { request_id: u32 },
    AppGossip { bytes: Vec<u8> },
    Connected,
    Disconnected,
    Notify(VmMessage),
    GossipRequest,
    Timeout,
}

impl Message {
    pub fn op(&self) -> Op {
        match self {
            Message::GetAcceptedFrontier { .. } => Op::GetAcceptedFrontier,
            Message::AcceptedFrontier { .. } => Op::AcceptedFrontier,
            Message::GetAcceptedFrontierFailed { .. } => Op::GetAcceptedFrontierFailed,
            Message::GetAccepted { .. } => Op::GetAccepted,
            Message::Accepted { .. } => Op::Accepted,
            Message::GetAcceptedFailed { .. } => Op::GetAcceptedFailed,
            Message::GetAncestors { .. } => Op::GetAncestors,
            Message::Ancestors { .. } => Op::Ancestors,
            Message::GetAncestorsFailed { .. } => Op::GetAncestorsFailed,
            Message::Get { .. } => Op::Get,
            Message::Put { .. } => Op::Put,
            Message::GetFailed { .. } => Op::GetFailed,
            Message::PushQuery { .. } => Op::PushQuery,
            Message::PullQuery { .. } => Op::PullQuery,
            Message::Chits { .. } => Op::Chits,
            Message::QueryFailed { .. } => Op::QueryFailed,
            Message::AppRequest { .. } => Op::AppRequest,
            Message::AppResponse { .. } => Op::AppResponse,
            Message::AppRequestFailed { .. } => Op::AppRequestFailed,
            Message::AppGossip { .. } => Op::AppGossip,
            Message::Connected => Op::Connected,
            Message::Disconnected => Op::Disconnected,
            Message::Notify(_) => Op::Notify,
            Message::GossipRequest => Op::GossipRequest,
            Message::Timeout => Op::Timeout,
        }
    }

    pub fn request_id(&self) -> Option<u32> {
        match self {
            Message::GetAcceptedFrontier { request_id }
            | Message::AcceptedFrontier { request_id, .. }
            | Message::GetAcceptedFrontierFailed { request_id }
            | Message::GetAccepted { request_id, .. }
            | Message::Accepted { request_id, .. }
            | Message::GetAcceptedFailed { request_id }
            | Message::GetAncestors { request_id, .. }
            | Message::Ancestors { request_id, .. }
            | Message::GetAncestorsFailed { request_id }
            | Message::Get { request_id, .. }
            | Message::Put { request_id, .. }
            | Message::GetFailed { request_id }
            | Message::PushQuery { request_id, .. }
            | Message::PullQuery { request_id, .. }
            | Message::Chits { request_id, .. }
            | Message::QueryFailed { request_id }
            | Message::AppRequest { request_id, .. }
            | Message::AppResponse { request_id, .. }
            | Message::AppRequestFailed { request_id } => Some(*request_id),
            _ => None,
        }
    }

    /// The failure message standing in for the answer to a request of kind `op`.
    pub fn failure(op: Op, request_id: u32) -> Option<Message> {
        let message = match op.failure()? {
            Op::GetAcceptedFrontierFailed => Message::GetAcceptedFrontierFailed { request_id },
            Op::GetAcceptedFailed => Message::GetAcceptedFailed { request_id },
            Op::GetAncestorsFailed => Message::GetAncestorsFailed { request_id },
            Op::GetFailed => Message::GetFailed { request_id },
            Op::QueryFailed => Message::QueryFailed { request_id },
            Op::AppRequestFailed => Message::AppRequestFailed { request_id },
            _ => return None,
        };
        Some(message)
    }
}

/// What travels between peers: a message for one chain. Requests carry how long the sender
/// will wait for the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub chain_id: Id,
    pub deadline: Option<Duration>,
    pub message: Message,
}

impl Envelope {
    pub fn new(chain_id: Id, message: Message) -> Self {
        Envelope { chain_id, deadline: None, message }
    }

    pub fn with_deadline(chain_id: Id, deadline: Duration, message: Message) -> Self {
        Envelope { chain_id, deadline: Some(deadline), message }
    }
}

/// A message on its way to a chain's handler.
#[derive(Debug)]
pub struct InboundMessage {
    pub node_id: NodeId,
    pub chain_id: Id,
    pub message: Message,
    /// Past this point nobody is waiting for the answer anymore.
    pub expiration: Option<Instant>,
    pub received: Instant,
    // Releases the sender's buffer slot once the message is gone
    permit: Option<BufferPermit>,
}

impl InboundMessage {
    pub fn new(node_id: NodeId, chain_id: Id, message: Message) -> Self {
        InboundMessage {
            node_id,
            chain_id,
            message,
            expiration: None,
            received: Instant::now(),
            permit: None,
        }
    }

    pub fn from_envelope(node_id: NodeId, envelope: Envelope) -> Self {
        let mut msg = InboundMessage::new(node_id, envelope.chain_id, envelope.message);
        msg.expiration = envelope.deadline.map(|d| msg.received + d);
        msg
    }

    pub fn with_permit(mut self, permit: BufferPermit) -> Self {
        self.permit = Some(permit);
        self
    }

    pub fn op(&self) -> Op {
        self.message.op()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expiration, Some(expiration) if now > expiration)
    }
}
