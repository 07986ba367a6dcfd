//! A toy federated linear regression: the model visits each worker's data in turn.

use std::sync::Arc;

use remote_tensor::{Tensor, Worker, WorkerTensor, connect_all};

const LR: f32 = 0.01;
const ROUNDS: usize = 20;

fn matrix(values: &[f32], rows: usize, cols: usize) -> Tensor {
    Tensor::from_vec(values.to_vec(), &[rows, cols]).unwrap()
}

/// Sends `y = 2 * x + 1` samples to `worker`.
async fn shard(me: &Arc<Worker>, worker: &Arc<Worker>, xs: &[f32]) -> (WorkerTensor, WorkerTensor) {
    let inputs: Vec<f32> = xs.iter().flat_map(|&x| [x, 1.0]).collect();
    let targets: Vec<f32> = xs.iter().map(|&x| 2.0 * x + 1.0).collect();

    let inputs = me.tensor(matrix(&inputs, xs.len(), 2));
    let targets = me.tensor(matrix(&targets, xs.len(), 1));

    (
        inputs.send(worker.id()).await.unwrap(),
        targets.send(worker.id()).await.unwrap(),
    )
}

#[tokio::test]
async fn federated_training_reduces_loss() {
    let me = Worker::new("me");
    let bob = Worker::new("bob");
    let alice = Worker::new("alice");
    connect_all(&[Arc::clone(&me), Arc::clone(&bob), Arc::clone(&alice)]);

    let datasets = [
        shard(&me, &bob, &[0.0, 1.0]).await,
        shard(&me, &alice, &[2.0, 3.0]).await,
    ];

    let mut model = me.tensor(matrix(&[0.0, 0.0], 2, 1).with_requires_grad(true));
    let mut losses = Vec::new();

    for _ in 0..ROUNDS {
        let mut round_loss = 0.0;

        for (inputs, targets) in &datasets {
            let w = model.send(inputs.location()).await.unwrap();
            w.zero_grad().await.unwrap();

            let pred = inputs.matmul(&w).await.unwrap();
            let diff = pred.sub(targets).await.unwrap();
            let squared = diff.mul(&diff).await.unwrap();
            let loss = squared.sum().await.unwrap();
            loss.backward().await.unwrap();
            w.sgd_step(LR).await.unwrap();

            round_loss += loss.item().await.unwrap();
            for intermediate in [pred, diff, squared, loss] {
                intermediate.forget().await.unwrap();
            }
            model = w.get().await.unwrap();
        }

        losses.push(round_loss);
    }

    assert!(model.as_native().unwrap().requires_grad());
    assert!(losses.last().unwrap() < &(losses[0] / 2.0));
    // only the data shards are left behind
    assert_eq!(bob.objects().len(), 2);
    assert_eq!(alice.objects().len(), 2);
}
