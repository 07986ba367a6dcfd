use std::sync::Arc;

use remote_tensor::{PointerErr, RemoteWorker, Tensor, Worker, service};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

async fn spawn_worker(name: &str) -> (Arc<Worker>, String, CancellationToken, JoinHandle<()>) {
    let worker = Worker::new(name);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let worker = Arc::clone(&worker);
        let shutdown = shutdown.clone();
        async move { service::serve(worker, listener, shutdown).await.unwrap() }
    });

    (worker, addr, shutdown, handle)
}

#[tokio::test]
async fn round_trip_over_tcp() {
    let (bob, addr, shutdown, handle) = spawn_worker("bob").await;

    let me = Worker::new("me");
    let remote = RemoteWorker::connect(bob.id().clone(), &addr).await.unwrap();
    me.connect(Arc::new(remote));

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3])
        .unwrap()
        .with_requires_grad(true);
    let x = me.tensor(x);

    let x_ptr = x.send(bob.id()).await.unwrap();
    assert!(bob.objects().contains(x.id()));

    let loss = x_ptr.mul(&x_ptr).await.unwrap().sum().await.unwrap();
    assert_eq!(loss.item().await.unwrap(), 14.0);
    loss.backward().await.unwrap();

    let x_back = x_ptr.get().await.unwrap();
    let grad: Vec<_> = x_back.as_native().unwrap().grad().unwrap().iter().copied().collect();
    assert_eq!(grad, [2.0, 4.0, 6.0]);

    let err = x_ptr.get().await.unwrap_err();
    assert!(matches!(err, PointerErr::ObjectNotFound { id, .. } if id == x.id()));

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn disconnect_ends_session() {
    let (bob, addr, shutdown, handle) = spawn_worker("bob").await;

    let remote = RemoteWorker::connect(bob.id().clone(), &addr).await.unwrap();
    remote.disconnect().await.unwrap();

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn non_finite_values_over_tcp() {
    let (bob, addr, shutdown, handle) = spawn_worker("bob").await;

    let me = Worker::new("me");
    let remote = RemoteWorker::connect(bob.id().clone(), &addr).await.unwrap();
    me.connect(Arc::new(remote));

    let x = Tensor::from_vec(vec![1.0, f32::INFINITY, f32::NAN], &[3]).unwrap();
    let x = me.tensor(x);

    let x_ptr = x.send(bob.id()).await.unwrap();
    let x_back = x_ptr.get().await.unwrap();

    let values = x_back.as_native().unwrap().to_vec();
    assert_eq!(values[..2], [1.0, f32::INFINITY]);
    assert!(values[2].is_nan());
    assert!(bob.objects().is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}
