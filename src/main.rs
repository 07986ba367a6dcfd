use std::{sync::Arc, time::Duration};

use anyhow::Context;
use log::{info, warn};
use tokio::{net::TcpListener, signal, time};
use tokio_util::sync::CancellationToken;

use remote_tensor::{
    RemoteWorker, Worker,
    config::{NodeConfig, PeerConfig},
    service,
};

const CONNECT_ATTEMPTS: usize = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Connects to `peer`, waiting for it to come up.
async fn connect(peer: &PeerConfig) -> anyhow::Result<RemoteWorker> {
    let mut attempt = 1;

    loop {
        match RemoteWorker::connect(peer.id.clone(), &peer.addr).await {
            Ok(remote) => return Ok(remote),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!("peer {} at {} not ready ({e}), retrying", peer.id, peer.addr);
                attempt += 1;
                time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("connecting to peer {}", peer.id));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = NodeConfig::from_env()?;
    let worker = Worker::new(config.id.clone());

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    info!("worker {} listening at {}", config.id, config.addr);

    let shutdown = CancellationToken::new();
    let service = tokio::spawn(service::serve(
        Arc::clone(&worker),
        listener,
        shutdown.clone(),
    ));

    for peer in &config.peers {
        let remote = connect(peer).await?;
        worker.connect(Arc::new(remote));
        info!("linked to peer {} at {}", peer.id, peer.addr);
    }

    signal::ctrl_c().await?;
    info!("received SIGTERM");

    shutdown.cancel();
    service.await??;

    Ok(())
}
