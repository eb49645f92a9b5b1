use std::io;
use std::net::SocketAddr;

use futures::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_serde::formats::*;
use tokio_serde::Framed;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub type Reader<I, O> = Framed<FramedRead<OwnedReadHalf, LengthDelimitedCodec>, O, I, Bincode<O, I>>;

pub type Writer<I, O> = Framed<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>, O, I, Bincode<O, I>>;

/// Reading half of a channel: yields `O`s.
pub struct Receiver<I, O> {
    reader: Reader<I, O>,
}

impl<I, O> Receiver<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize + Unpin,
    O: for<'de> Deserialize<'de> + Serialize + Unpin,
{
    /// `None` once the other side has closed the connection.
    pub async fn recv(&mut self) -> io::Result<Option<O>> {
        self.reader.try_next().await
    }
}

/// Writing half of a channel: takes `I`s.
pub struct Sender<I, O> {
    writer: Writer<I, O>,
}

impl<I, O> Sender<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize + Unpin,
    O: for<'de> Deserialize<'de> + Serialize + Unpin,
{
    pub async fn send(&mut self, item: I) -> io::Result<()> {
        self.writer.send(item).await
    }
}

/// A TCP connection carrying length delimited, bincode encoded values: `I`s are written and
/// `O`s are read.
pub struct Channel<I, O> {
    socket: TcpStream,
    peer_addr: SocketAddr,
    ghost: std::marker::PhantomData<(I, O)>,
}

impl<I, O> Channel<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize + Unpin,
    O: for<'de> Deserialize<'de> + Serialize + Unpin,
{
    pub async fn connect(address: &SocketAddr) -> io::Result<Channel<I, O>> {
        let socket = TcpStream::connect(address).await?;
        Ok(Channel { socket, peer_addr: *address, ghost: Default::default() })
    }

    pub async fn accept(listener: &TcpListener) -> io::Result<Channel<I, O>> {
        let (socket, peer_addr) = listener.accept().await?;
        Ok(Channel { socket, peer_addr, ghost: Default::default() })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Splits the channel into halves that can live in different tasks.
    pub fn split(self) -> (Sender<I, O>, Receiver<I, O>) {
        let (reader, writer) = self.socket.into_split();

        let reader = FramedRead::new(reader, LengthDelimitedCodec::new());
        let reader = Framed::new(reader, Bincode::default());

        let writer = FramedWrite::new(writer, LengthDelimitedCodec::new());
        let writer = Framed::new(writer, Bincode::default());

        (Sender { writer }, Receiver { reader })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    struct Ping(u32);
    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    struct Pong(u32);

    #[actix_rt::test]
    async fn test_send_recv() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let channel: Channel<Pong, Ping> = Channel::accept(&listener).await.unwrap();
            let (mut sender, mut receiver) = channel.split();
            while let Some(Ping(n)) = receiver.recv().await.unwrap() {
                sender.send(Pong(n + 1)).await.unwrap();
            }
        });

        let channel: Channel<Ping, Pong> = Channel::connect(&address).await.unwrap();
        let (mut sender, mut receiver) = channel.split();
        for n in 0..3 {
            sender.send(Ping(n)).await.unwrap();
            assert_eq!(receiver.recv().await.unwrap(), Some(Pong(n + 1)));
        }
        drop(sender);
        server.await.unwrap();
    }
}
