//! Minimal reverse-mode autodiff over `ndarray` buffers.
//!
//! A [`Tensor`] is a reference-counted node of the computation graph. Leaves
//! own a gradient slot that is filled in by [`Tensor::backward`], so every
//! handle to the same leaf observes the accumulated gradient.

mod backward;
mod error;
mod tensor;

pub use error::{Result, TensorErr};
pub use tensor::{Tensor, TensorOp};

pub use ndarray::{ArrayD, IxDyn};
