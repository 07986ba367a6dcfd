use std::sync::Weak;

use async_trait::async_trait;
use comms::{
    FrameReader, FrameWriter,
    msg::Msg,
    specs::{
        command::{Command, Reply},
        object::WorkerId,
    },
};
use log::debug;
use tokio::{
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};

use crate::{PointerErr, Result, worker::Worker};

/// A link to a worker that can serve commands.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The name of the worker on the other end.
    fn id(&self) -> &WorkerId;

    /// Sends `cmd` and waits for the worker's reply.
    ///
    /// # Errors
    /// The link failed. Failures of the command itself come back as `Reply::Failure`.
    async fn execute(&self, cmd: Command) -> Result<Reply>;
}

/// A worker living in the same process.
///
/// Holds a weak reference so linked workers don't keep each other alive.
pub struct VirtualWorker {
    id: WorkerId,
    worker: Weak<Worker>,
}

impl VirtualWorker {
    pub fn new(id: WorkerId, worker: Weak<Worker>) -> Self {
        Self { id, worker }
    }
}

#[async_trait]
impl Transport for VirtualWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    async fn execute(&self, cmd: Command) -> Result<Reply> {
        let worker = self
            .worker
            .upgrade()
            .ok_or_else(|| PointerErr::UnknownWorker(self.id.clone()))?;

        Ok(worker.execute(cmd).await)
    }
}

type Channel = (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>);

/// A worker served over TCP by `service::serve`.
///
/// The connection carries one request at a time.
pub struct RemoteWorker {
    id: WorkerId,
    channel: Mutex<Channel>,
}

impl RemoteWorker {
    /// Creates a new `RemoteWorker` over an established connection.
    ///
    /// # Arguments
    /// * `id` - The name of the worker served on the other end.
    /// * `stream` - The connection to it.
    pub fn new(id: WorkerId, stream: TcpStream) -> Self {
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);

        Self {
            id,
            channel: Mutex::new((rx, tx)),
        }
    }

    /// Connects to the worker `id` served at `addr`.
    pub async fn connect<A: ToSocketAddrs>(id: WorkerId, addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = id.as_str(); "connected");
        Ok(Self::new(id, stream))
    }

    /// Ends the session gracefully.
    pub async fn disconnect(&self) -> Result<()> {
        match self.execute(Command::Disconnect).await? {
            Reply::Ack => Ok(()),
            reply => Err(PointerErr::UnexpectedReply(reply.kind())),
        }
    }
}

#[async_trait]
impl Transport for RemoteWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    async fn execute(&self, cmd: Command) -> Result<Reply> {
        let mut channel = self.channel.lock().await;
        let (rx, tx) = &mut *channel;

        tx.write(&Msg::Control(cmd)).await?;

        match rx.read().await? {
            Msg::Reply(reply) => Ok(reply),
            Msg::Err(e) => Err(PointerErr::Remote(e.into_owned())),
            Msg::Control(cmd) => Err(PointerErr::UnexpectedReply(cmd.name())),
        }
    }
}
