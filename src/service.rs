use std::{borrow::Cow, io, sync::Arc};

use comms::{
    msg::Msg,
    specs::{
        command::{Command, Reply},
        object::{ObjectId, ObjectSpec},
    },
};
use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{chain::TensorChain, worker::Worker};

/// Serves `worker` to every peer connecting to `listener`, until `shutdown` is cancelled.
///
/// # Arguments
/// * `worker` - The worker to serve.
/// * `listener` - The listener to accept peers from.
/// * `shutdown` - Stops the accept loop and every open session.
///
/// # Returns
/// An io error if accepting a connection fails.
pub async fn serve(
    worker: Arc<Worker>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let mut sessions = JoinSet::new();

    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };

        info!(worker = worker.id().as_str(); "peer connected from {addr}");

        let worker = Arc::clone(&worker);
        let shutdown = shutdown.clone();
        sessions.spawn(async move {
            if let Err(e) = session(worker, stream, shutdown).await {
                warn!("session with {addr} failed: {e}");
            }
        });
    }

    sessions.shutdown().await;
    info!(worker = worker.id().as_str(); "service stopped");
    Ok(())
}

/// Puts back an object whose `Get` reply never reached the peer.
fn restore(worker: &Worker, id: ObjectId, spec: ObjectSpec) {
    match TensorChain::from_spec(spec, worker.id()) {
        Ok(object) => {
            warn!(worker = worker.id().as_str(), id = id; "get reply not delivered, object kept");
            worker.objects().insert(id, object);
        }
        Err(e) => warn!(worker = worker.id().as_str(), id = id; "object {id} lost: {e}"),
    }
}

/// Serves the commands of a single connection until the peer disconnects.
async fn session(
    worker: Arc<Worker>,
    stream: TcpStream,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            msg = rx.read() => msg,
        };

        match msg {
            Ok(Msg::Control(Command::Disconnect)) => {
                debug!(worker = worker.id().as_str(); "peer disconnected");
                tx.write(&Msg::Reply(Reply::Ack)).await?;
                return Ok(());
            }
            Ok(Msg::Control(cmd)) => {
                let taken = match &cmd {
                    Command::Get { id } => Some(*id),
                    _ => None,
                };

                let reply = Msg::Reply(worker.execute(cmd).await);
                if let Err(e) = tx.write(&reply).await {
                    if let (Some(id), Msg::Reply(Reply::Object(spec))) = (taken, reply) {
                        restore(&worker, id, spec);
                    }

                    // an oversized frame is rejected before anything is written
                    if e.kind() != io::ErrorKind::InvalidInput {
                        return Err(e);
                    }
                    tx.write(&Msg::Err(Cow::Owned(e.to_string()))).await?;
                }
            }
            Ok(msg) => {
                let text = format!("expected a control message, got {}", msg.kind());
                tx.write(&Msg::Err(Cow::Owned(text))).await?;
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}
