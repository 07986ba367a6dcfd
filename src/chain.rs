//! Tensor chains: a native tensor, optionally wrapped by decorators, or a pointer.

use std::fmt::{self, Display};

use autograd::Tensor;
use comms::specs::{
    command::{Method, Value},
    object::{ObjectSpec, WorkerId},
};

use crate::{
    PointerErr, Result, gradient,
    pointer::{Attr, AttrPath, PointerTensor},
};

/// A decorator that logs every call forwarded through it.
#[derive(Debug, Clone)]
pub struct LoggingTensor {
    child: Box<TensorChain>,
}

impl LoggingTensor {
    pub fn new(child: TensorChain) -> Self {
        Self {
            child: Box::new(child),
        }
    }

    pub fn child(&self) -> &TensorChain {
        &self.child
    }

    pub fn child_mut(&mut self) -> &mut TensorChain {
        &mut self.child
    }

    pub fn into_child(self) -> TensorChain {
        *self.child
    }
}

/// An object that can be registered in a worker.
///
/// Calls on a decorator are forwarded to its child, `Native` and `Pointer`
/// end the chain locally.
#[derive(Debug, Clone)]
pub enum TensorChain {
    Native(Tensor),
    Logging(LoggingTensor),
    Pointer(PointerTensor),
}

/// The result of a method call on a chain.
#[derive(Debug, Clone)]
pub enum Outcome {
    Chain(TensorChain),
    Value(Value),
}

impl TensorChain {
    /// Wraps `child` in a `LoggingTensor`.
    pub fn logging(child: TensorChain) -> Self {
        Self::Logging(LoggingTensor::new(child))
    }

    pub fn as_native(&self) -> Option<&Tensor> {
        match self {
            TensorChain::Native(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PointerTensor> {
        match self {
            TensorChain::Pointer(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TensorChain::Pointer(_))
    }

    /// The pointer at the end of the chain, looking through decorators.
    pub fn innermost_pointer(&self) -> Option<&PointerTensor> {
        match self {
            TensorChain::Pointer(ptr) => Some(ptr),
            TensorChain::Logging(logging) => logging.child().innermost_pointer(),
            TensorChain::Native(_) => None,
        }
    }

    pub fn innermost_pointer_mut(&mut self) -> Option<&mut PointerTensor> {
        match self {
            TensorChain::Pointer(ptr) => Some(ptr),
            TensorChain::Logging(logging) => logging.child_mut().innermost_pointer_mut(),
            TensorChain::Native(_) => None,
        }
    }

    /// Selects the part of the chain named by `path`.
    ///
    /// # Errors
    /// `PointerErr::AttributeNotFound` if a step doesn't exist on the selected layer.
    pub fn select(&self, path: &AttrPath) -> Result<TensorChain> {
        let not_found = || PointerErr::AttributeNotFound {
            path: path.to_string(),
        };

        let mut current = self.clone();
        for attr in path.segments() {
            current = match (attr, current) {
                (Attr::Child, TensorChain::Logging(logging)) => logging.into_child(),
                (Attr::Grad, TensorChain::Native(tensor)) => {
                    TensorChain::Native(tensor.grad_tensor().ok_or_else(not_found)?)
                }
                _ => return Err(not_found()),
            };
        }

        Ok(current)
    }

    pub fn to_spec(&self) -> ObjectSpec {
        match self {
            TensorChain::Native(tensor) => ObjectSpec::Native(gradient::tensor_to_spec(tensor)),
            TensorChain::Logging(logging) => {
                ObjectSpec::Logging(Box::new(logging.child().to_spec()))
            }
            TensorChain::Pointer(ptr) => ObjectSpec::Pointer(ptr.to_spec()),
        }
    }

    /// Rebuilds a chain received from the network, pointers in it are now held by `owner`.
    pub fn from_spec(spec: ObjectSpec, owner: &WorkerId) -> Result<Self> {
        let chain = match spec {
            ObjectSpec::Native(spec) => TensorChain::Native(gradient::tensor_from_spec(spec)?),
            ObjectSpec::Logging(child) => TensorChain::logging(Self::from_spec(*child, owner)?),
            ObjectSpec::Pointer(spec) => {
                TensorChain::Pointer(PointerTensor::from_spec(spec, owner))
            }
        };

        Ok(chain)
    }
}

impl Display for TensorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorChain::Native(tensor) => write!(f, "{tensor}"),
            TensorChain::Logging(logging) => write!(f, "[LoggingTensor] > {}", logging.child()),
            TensorChain::Pointer(ptr) => write!(f, "{ptr}"),
        }
    }
}

fn expect_args(method: &Method, args: &[Tensor], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(PointerErr::InvalidArguments {
            method: method.name().to_string(),
            expected: expected.to_string(),
            got: args.len(),
        });
    }

    Ok(())
}

/// Runs `method` on a native tensor.
///
/// # Arguments
/// * `tensor` - The receiver of the call.
/// * `method` - The method to run.
/// * `args` - The operands, already resolved to native tensors.
///
/// # Errors
/// `PointerErr::InvalidArguments` on a wrong amount of operands, or the
/// `TensorErr` raised by the operation.
pub fn apply_native(tensor: &Tensor, method: &Method, args: &[Tensor]) -> Result<Outcome> {
    let chain = |tensor: Tensor| -> Result<Outcome> {
        Ok(Outcome::Chain(TensorChain::Native(tensor)))
    };
    let value = |value: Value| -> Result<Outcome> { Ok(Outcome::Value(value)) };

    match method {
        Method::Add | Method::Sub | Method::Mul | Method::MatMul | Method::Equal => {
            expect_args(method, args, 1)?
        }
        Method::Backward if args.len() <= 1 => {}
        Method::Backward => {
            return Err(PointerErr::InvalidArguments {
                method: method.name().to_string(),
                expected: "0 or 1".to_string(),
                got: args.len(),
            });
        }
        _ => expect_args(method, args, 0)?,
    }

    match method {
        Method::Add => chain(tensor.add(&args[0])?),
        Method::Sub => chain(tensor.sub(&args[0])?),
        Method::Mul => chain(tensor.mul(&args[0])?),
        Method::MatMul => chain(tensor.matmul(&args[0])?),
        Method::Neg => chain(tensor.neg()),
        Method::Sum => chain(tensor.sum()),
        Method::Reshape { shape } => chain(tensor.reshape(shape)?),
        Method::Backward => {
            tensor.backward(args.first().map(Tensor::data))?;
            value(Value::Unit)
        }
        Method::ZeroGrad => {
            tensor.zero_grad();
            value(Value::Unit)
        }
        Method::SgdStep { lr } => {
            tensor.sgd_step(*lr);
            value(Value::Unit)
        }
        Method::Item => value(Value::Scalar(tensor.item()?)),
        Method::Shape => value(Value::Shape(tensor.shape())),
        Method::Equal => value(Value::Bool(tensor.values_eq(&args[0]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), &[values.len()]).unwrap()
    }

    #[test]
    fn test_select_child_and_grad() {
        let x = vector(&[1.0, 2.0]).with_requires_grad(true);
        x.sum().backward(None).unwrap();
        let chain = TensorChain::logging(TensorChain::Native(x));

        let grad = chain.select(&AttrPath::parse("child.grad").unwrap()).unwrap();
        assert_eq!(grad.as_native().unwrap().to_vec(), [1.0, 1.0]);

        let err = chain.select(&AttrPath::parse("grad").unwrap()).unwrap_err();
        assert!(matches!(err, PointerErr::AttributeNotFound { path } if path == "grad"));
    }

    #[test]
    fn test_spec_keeps_wrappers() {
        let ptr = PointerTensor::new(1, "bob".into(), "me".into(), Some(2), None);
        let chain = TensorChain::logging(TensorChain::Pointer(ptr));

        let back = TensorChain::from_spec(chain.to_spec(), &"alice".into()).unwrap();
        let TensorChain::Logging(logging) = back else {
            panic!("expected a logging tensor");
        };
        let ptr = logging.child().as_pointer().unwrap();
        assert_eq!(ptr.owner().as_str(), "alice");
        assert_eq!(ptr.id_at_location(), 2);
    }

    #[test]
    fn test_apply_native() {
        let x = vector(&[1.0, 2.0]);
        let y = vector(&[3.0, 4.0]);

        let Outcome::Chain(z) = apply_native(&x, &Method::Mul, &[y.clone()]).unwrap() else {
            panic!("expected a tensor");
        };
        assert_eq!(z.as_native().unwrap().to_vec(), [3.0, 8.0]);

        let Outcome::Value(shape) = apply_native(&x, &Method::Shape, &[]).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(shape, Value::Shape(vec![2]));

        let Outcome::Value(eq) = apply_native(&x, &Method::Equal, &[x.clone()]).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(eq, Value::Bool(true));
    }

    #[test]
    fn test_apply_native_checks_arity() {
        let x = vector(&[1.0]);

        let err = apply_native(&x, &Method::Add, &[]).unwrap_err();
        assert!(matches!(err, PointerErr::InvalidArguments { got: 0, .. }));

        let err = apply_native(&x, &Method::Backward, &[x.clone(), x.clone()]).unwrap_err();
        assert!(matches!(err, PointerErr::InvalidArguments { got: 2, .. }));
    }

    #[test]
    fn test_display_without_network() {
        let ptr = PointerTensor::new(12, "bob".into(), "me".into(), Some(34), None);
        let chain = TensorChain::logging(TensorChain::Pointer(ptr));

        assert_eq!(
            chain.to_string(),
            "[LoggingTensor] > [PointerTensor | me:12 -> bob:34]"
        );
    }
}
