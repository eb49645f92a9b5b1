use std::sync::Arc;

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, Context, Handler, WrapFuture};
use actix_derive::Message;
use colored::Colorize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::channel;
use super::handshake::Frame;
use crate::networking::Envelope;
use crate::zfx_id::NodeId;

/// The writing side of the connection to one peer. Messages are written in the order they
/// are delivered to the actor.
pub struct Peer {
    node_id: NodeId,
    writer: Arc<Mutex<channel::Sender<Frame, Frame>>>,
}

impl Peer {
    pub fn new(node_id: NodeId, writer: channel::Sender<Frame, Frame>) -> Self {
        Peer { node_id, writer: Arc::new(Mutex::new(writer)) }
    }
}

impl Actor for Peer {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] connected to {}", "peer".yellow(), self.node_id);
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] disconnected from {}", "peer".yellow(), self.node_id);
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Deliver(pub Envelope);

impl Handler<Deliver> for Peer {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Context<Self>) -> Self::Result {
        let writer = self.writer.clone();
        let write = async move { writer.lock().await.send(Frame::Message(msg.0)).await };
        // Holds back the mailbox until the frame is written
        ctx.wait(write.into_actor(self).map(|result, actor, ctx| {
            if let Err(err) = result {
                warn!("[{}] failed to write to {}: {}", "peer".yellow(), actor.node_id, err);
                ctx.stop();
            }
        }));
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Disconnect;

impl Handler<Disconnect> for Peer {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Context<Self>) -> Self::Result {
        ctx.stop();
    }
}
