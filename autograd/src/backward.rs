//! Reverse-mode automatic differentiation.

use std::collections::{HashMap, HashSet};

use ndarray::{ArrayD, IxDyn};

use crate::{
    Result,
    tensor::{Tensor, TensorOp, as_matrix, reshaped},
};

/// Propagates `seed` from `root` down to the leaves, accumulating into their gradient slot.
pub(crate) fn backward(root: &Tensor, seed: ArrayD<f32>) -> Result<()> {
    let order = topological_order(root);

    let mut adjoints: HashMap<usize, ArrayD<f32>> = HashMap::new();
    adjoints.insert(root.key(), seed);

    for node in order.iter().rev() {
        let Some(adjoint) = adjoints.remove(&node.key()) else {
            continue;
        };

        if node.is_leaf() {
            if node.requires_grad() {
                accumulate(node, adjoint);
            }
            continue;
        }

        let grads = local_gradients(node, &adjoint)?;
        for (input, grad) in node.inputs().iter().zip(grads) {
            if !input.requires_grad() {
                continue;
            }

            adjoints
                .entry(input.key())
                .and_modify(|acc| *acc += &grad)
                .or_insert(grad);
        }
    }

    Ok(())
}

/// Post-order of the graph reachable from `root`, inputs come before their consumers.
fn topological_order(root: &Tensor) -> Vec<Tensor> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }

        if !visited.insert(node.key()) {
            continue;
        }

        stack.push((node.clone(), true));
        for input in node.inputs() {
            if !visited.contains(&input.key()) {
                stack.push((input.clone(), false));
            }
        }
    }

    order
}

fn accumulate(leaf: &Tensor, grad: ArrayD<f32>) {
    let mut slot = leaf.0.grad.lock();
    match slot.as_mut() {
        Some(acc) => *acc += &grad,
        None => *slot = Some(grad),
    }
}

/// Gradient of `node` with respect to each of its inputs, in order.
fn local_gradients(node: &Tensor, upstream: &ArrayD<f32>) -> Result<Vec<ArrayD<f32>>> {
    let inputs = node.inputs();

    let grads = match node.op() {
        TensorOp::Leaf => Vec::new(),
        TensorOp::Add => vec![upstream.clone(), upstream.clone()],
        TensorOp::Sub => vec![upstream.clone(), upstream.mapv(|x| -x)],
        TensorOp::Mul => vec![upstream * &inputs[1].data(), upstream * &inputs[0].data()],
        TensorOp::Neg => vec![upstream.mapv(|x| -x)],
        TensorOp::Sum => {
            // the upstream gradient of a full reduction is 0-dimensional
            let value = upstream.sum();
            vec![ArrayD::from_elem(IxDyn(&inputs[0].shape()), value)]
        }
        TensorOp::MatMul => {
            let upstream = as_matrix(upstream.clone(), "matmul backward")?;
            let lhs = as_matrix(inputs[0].data(), "matmul backward")?;
            let rhs = as_matrix(inputs[1].data(), "matmul backward")?;

            vec![
                upstream.dot(&rhs.t()).into_dyn(),
                lhs.t().dot(&upstream).into_dyn(),
            ]
        }
        TensorOp::Reshape => {
            let values = upstream.iter().copied().collect();
            vec![reshaped(values, &inputs[0].shape())?]
        }
    };

    Ok(grads)
}
