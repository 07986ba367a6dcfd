//! Gradient buffers crossing the pointer boundary.
//!
//! A tensor travels as a leaf together with its `requires_grad` flag and
//! whatever gradient it has accumulated so far. Gradients computed remotely
//! are only brought back when the tensor itself is retrieved.

use autograd::{ArrayD, IxDyn, Tensor, TensorErr};
use comms::specs::object::TensorSpec;

use crate::Result;

/// Serializes a tensor together with its gradient buffer.
pub fn tensor_to_spec(tensor: &Tensor) -> TensorSpec {
    TensorSpec {
        shape: tensor.shape(),
        data: tensor.to_vec(),
        requires_grad: tensor.requires_grad(),
        grad: tensor.grad().map(|grad| grad.iter().copied().collect()),
    }
}

/// Rebuilds a leaf tensor, reattaching the gradient it was sent with.
///
/// # Errors
/// `TensorErr::InvalidShape` if the values or the gradient don't fit the shape.
pub fn tensor_from_spec(spec: TensorSpec) -> Result<Tensor> {
    let TensorSpec {
        shape,
        data,
        requires_grad,
        grad,
    } = spec;

    let data = array(&shape, data)?;
    let grad = grad.map(|grad| array(&shape, grad)).transpose()?;

    Ok(Tensor::leaf(data, requires_grad, grad))
}

fn array(shape: &[usize], values: Vec<f32>) -> Result<ArrayD<f32>> {
    let len = values.len();
    let array = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| {
        TensorErr::InvalidShape {
            shape: shape.to_vec(),
            len,
        }
    })?;

    Ok(array)
}
