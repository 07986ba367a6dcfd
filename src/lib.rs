//! Remote tensors: pointers that behave like the tensors they point to.
//!
//! A [`Worker`] owns a registry of tensor chains. Sending a tensor to another
//! worker leaves a [`PointerTensor`] behind, and every call on the pointer is
//! forwarded to the worker holding the data, gradients included.

pub mod chain;
pub mod config;
mod error;
pub mod gradient;
pub mod pointer;
pub mod registry;
pub mod service;
mod tensor;
pub mod transport;
mod worker;

pub use chain::{LoggingTensor, Outcome, TensorChain};
pub use error::{PointerErr, Result};
pub use pointer::{AttrPath, PointerTensor};
pub use registry::ObjectStore;
pub use tensor::{PointerOptions, WorkerTensor};
pub use transport::{RemoteWorker, Transport, VirtualWorker};
pub use worker::{Worker, connect_all};

pub use autograd::Tensor;
pub use comms::specs::{
    command::{Method, Value},
    object::{ObjectId, WorkerId},
};
