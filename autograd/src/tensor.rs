use std::{fmt, sync::Arc};

use ndarray::{ArrayD, Ix2, IxDyn};
use parking_lot::{Mutex, RwLock};

use crate::{Result, TensorErr, backward};

/// Operations recorded in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorOp {
    Leaf,
    Add,
    Sub,
    Mul,
    Neg,
    Sum,
    MatMul,
    Reshape,
}

/// Internal node structure.
pub(crate) struct Node {
    pub(crate) op: TensorOp,
    pub(crate) inputs: Vec<Tensor>,
    pub(crate) requires_grad: bool,
    pub(crate) data: RwLock<ArrayD<f32>>,
    pub(crate) grad: Mutex<Option<ArrayD<f32>>>,
}

/// A tensor expression in the computation graph.
///
/// Cloning is cheap and yields another handle to the same node, gradients
/// accumulated through one handle are visible through all of them.
#[derive(Clone)]
pub struct Tensor(pub(crate) Arc<Node>);

impl Tensor {
    fn from_op(op: TensorOp, inputs: Vec<Tensor>, data: ArrayD<f32>) -> Self {
        let requires_grad = inputs.iter().any(Tensor::requires_grad);

        Self(Arc::new(Node {
            op,
            inputs,
            requires_grad,
            data: RwLock::new(data),
            grad: Mutex::new(None),
        }))
    }

    /// Creates a new leaf tensor.
    ///
    /// # Arguments
    /// * `data` - The values of the tensor.
    /// * `requires_grad` - Whether backward passes should accumulate into this leaf.
    /// * `grad` - An already computed gradient to attach.
    pub fn leaf(data: ArrayD<f32>, requires_grad: bool, grad: Option<ArrayD<f32>>) -> Self {
        Self(Arc::new(Node {
            op: TensorOp::Leaf,
            inputs: Vec::new(),
            requires_grad,
            data: RwLock::new(data),
            grad: Mutex::new(grad),
        }))
    }

    /// Creates a constant leaf tensor from an array.
    pub fn new(data: ArrayD<f32>) -> Self {
        Self::leaf(data, false, None)
    }

    /// Creates a constant leaf tensor from a flat vector in row major order.
    ///
    /// # Errors
    /// `TensorErr::InvalidShape` if `shape` doesn't hold exactly `data.len()` elements.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let len = data.len();
        let data = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            TensorErr::InvalidShape {
                shape: shape.to_vec(),
                len,
            }
        })?;

        Ok(Self::new(data))
    }

    /// Creates a 0-dimensional tensor.
    pub fn scalar(value: f32) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)))
    }

    /// Returns a leaf with the same values and gradient and the given `requires_grad` flag.
    ///
    /// Non leaf tensors lose their history.
    pub fn with_requires_grad(self, requires_grad: bool) -> Self {
        Self::leaf(self.data(), requires_grad, self.grad())
    }

    /// Returns a new leaf holding a copy of the values, without history nor gradient.
    pub fn detach(&self) -> Self {
        Self::new(self.data())
    }

    pub fn op(&self) -> TensorOp {
        self.0.op
    }

    pub fn is_leaf(&self) -> bool {
        self.0.op == TensorOp::Leaf
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    pub(crate) fn inputs(&self) -> &[Tensor] {
        &self.0.inputs
    }

    /// Identity of the underlying graph node.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Returns whether both handles refer to the same graph node.
    pub fn same_node(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a copy of the tensor's values.
    pub fn data(&self) -> ArrayD<f32> {
        self.0.data.read().clone()
    }

    /// Returns the tensor's values flattened in row major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.data.read().iter().copied().collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.data.read().shape().to_vec()
    }

    pub fn numel(&self) -> usize {
        self.0.data.read().len()
    }

    /// Returns the only value of a single element tensor.
    ///
    /// # Errors
    /// `TensorErr::NotScalar` if the tensor has more than one element.
    pub fn item(&self) -> Result<f32> {
        let data = self.0.data.read();
        match data.len() {
            1 => Ok(data.iter().copied().sum()),
            _ => Err(TensorErr::NotScalar {
                shape: data.shape().to_vec(),
            }),
        }
    }

    /// Returns whether both tensors have the same shape and values.
    pub fn values_eq(&self, other: &Tensor) -> bool {
        self.same_node(other) || *self.0.data.read() == *other.0.data.read()
    }

    /// Returns a copy of the accumulated gradient, if any.
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.0.grad.lock().clone()
    }

    /// Returns the accumulated gradient as a detached tensor.
    pub fn grad_tensor(&self) -> Option<Tensor> {
        self.grad().map(Tensor::new)
    }

    /// Replaces the gradient slot.
    ///
    /// # Errors
    /// `TensorErr::ShapeMismatch` if `grad` doesn't have this tensor's shape.
    pub fn set_grad(&self, grad: Option<ArrayD<f32>>) -> Result<()> {
        if let Some(grad) = &grad {
            let shape = self.shape();
            if grad.shape() != shape.as_slice() {
                return Err(TensorErr::ShapeMismatch {
                    op: "set_grad",
                    lhs: shape,
                    rhs: grad.shape().to_vec(),
                });
            }
        }

        *self.0.grad.lock() = grad;
        Ok(())
    }

    /// Fills the accumulated gradient with zeros, if present.
    pub fn zero_grad(&self) {
        if let Some(grad) = self.0.grad.lock().as_mut() {
            grad.fill(0.0);
        }
    }

    /// Applies a plain gradient descent step in place: `w -= lr * grad`.
    ///
    /// Tensors without a gradient are left untouched.
    pub fn sgd_step(&self, lr: f32) {
        let grad = self.0.grad.lock();
        if let Some(grad) = grad.as_ref() {
            self.0.data.write().scaled_add(-lr, grad);
        }
    }

    fn check_same_shape(&self, rhs: &Tensor, op: &'static str) -> Result<()> {
        let (lhs_shape, rhs_shape) = (self.shape(), rhs.shape());
        if lhs_shape != rhs_shape {
            return Err(TensorErr::ShapeMismatch {
                op,
                lhs: lhs_shape,
                rhs: rhs_shape,
            });
        }

        Ok(())
    }

    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        self.check_same_shape(rhs, "add")?;
        let data = &self.data() + &rhs.data();
        Ok(Self::from_op(TensorOp::Add, vec![self.clone(), rhs.clone()], data))
    }

    pub fn sub(&self, rhs: &Tensor) -> Result<Tensor> {
        self.check_same_shape(rhs, "sub")?;
        let data = &self.data() - &rhs.data();
        Ok(Self::from_op(TensorOp::Sub, vec![self.clone(), rhs.clone()], data))
    }

    pub fn mul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.check_same_shape(rhs, "mul")?;
        let data = &self.data() * &rhs.data();
        Ok(Self::from_op(TensorOp::Mul, vec![self.clone(), rhs.clone()], data))
    }

    pub fn neg(&self) -> Tensor {
        let data = self.data().mapv(|x| -x);
        Self::from_op(TensorOp::Neg, vec![self.clone()], data)
    }

    /// Reduces every element into a 0-dimensional tensor.
    pub fn sum(&self) -> Tensor {
        let total = self.0.data.read().sum();
        let data = ArrayD::from_elem(IxDyn(&[]), total);
        Self::from_op(TensorOp::Sum, vec![self.clone()], data)
    }

    /// Views the values in row major order with another shape.
    ///
    /// # Errors
    /// `TensorErr::InvalidShape` if `shape` doesn't hold the same amount of elements.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        let data = reshaped(self.to_vec(), shape)?;
        Ok(Self::from_op(TensorOp::Reshape, vec![self.clone()], data))
    }

    /// Matrix product of two 2-dimensional tensors.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        let lhs_data = as_matrix(self.data(), "matmul")?;
        let rhs_data = as_matrix(rhs.data(), "matmul")?;

        if lhs_data.ncols() != rhs_data.nrows() {
            return Err(TensorErr::ShapeMismatch {
                op: "matmul",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }

        let data = lhs_data.dot(&rhs_data).into_dyn();
        Ok(Self::from_op(TensorOp::MatMul, vec![self.clone(), rhs.clone()], data))
    }

    /// Back propagates from this tensor into every leaf that requires grad.
    ///
    /// # Arguments
    /// * `seed` - The gradient of the output, may be omitted for single element tensors.
    ///            A seed with the same amount of elements is reshaped to this tensor's shape.
    ///
    /// # Errors
    /// A `TensorErr` if this tensor doesn't require grad or the seed is invalid.
    pub fn backward(&self, seed: Option<ArrayD<f32>>) -> Result<()> {
        if !self.requires_grad() {
            return Err(TensorErr::DoesNotRequireGrad);
        }

        let shape = self.shape();
        let seed = match seed {
            Some(seed) => {
                let len = seed.len();
                seed.into_shape_with_order(IxDyn(&shape))
                    .map_err(|_| TensorErr::InvalidShape {
                        shape: shape.clone(),
                        len,
                    })?
            }
            None if self.numel() == 1 => ArrayD::ones(IxDyn(&shape)),
            None => return Err(TensorErr::GradSeedRequired { shape }),
        };

        backward::backward(self, seed)
    }
}

pub(crate) fn reshaped(values: Vec<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    let len = values.len();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| TensorErr::InvalidShape {
        shape: shape.to_vec(),
        len,
    })
}

pub(crate) fn as_matrix(data: ArrayD<f32>, op: &'static str) -> Result<ndarray::Array2<f32>> {
    let ndim = data.ndim();
    data.into_dimensionality::<Ix2>()
        .map_err(|_| TensorErr::NotMatrix { op, ndim })
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("op", &self.0.op)
            .field("shape", &self.shape())
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor({}", self.0.data.read())?;
        if self.0.requires_grad {
            f.write_str(", requires_grad=true")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), &[values.len()]).unwrap()
    }

    #[test]
    fn test_from_vec_rejects_invalid_shape() {
        let err = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert_eq!(
            err,
            TensorErr::InvalidShape {
                shape: vec![2, 2],
                len: 3
            }
        );
    }

    #[test]
    fn test_elementwise_ops() {
        let x = vector(&[1.0, 2.0, 3.0]);
        let y = vector(&[4.0, 5.0, 6.0]);

        assert_eq!(x.add(&y).unwrap().to_vec(), [5.0, 7.0, 9.0]);
        assert_eq!(x.sub(&y).unwrap().to_vec(), [-3.0, -3.0, -3.0]);
        assert_eq!(x.mul(&y).unwrap().to_vec(), [4.0, 10.0, 18.0]);
        assert_eq!(x.neg().to_vec(), [-1.0, -2.0, -3.0]);
        assert_eq!(x.sum().item().unwrap(), 6.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let x = vector(&[1.0, 2.0]);
        let y = vector(&[1.0, 2.0, 3.0]);

        assert!(matches!(x.add(&y), Err(TensorErr::ShapeMismatch { op: "add", .. })));
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let b = Tensor::from_vec(vec![1.0, 1.0], &[2, 1]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), [2, 1]);
        assert_eq!(c.to_vec(), [3.0, 7.0]);

        let v = vector(&[1.0, 2.0]);
        assert!(matches!(v.matmul(&b), Err(TensorErr::NotMatrix { ndim: 1, .. })));
    }

    #[test]
    fn test_reshape() {
        let x = vector(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let y = x.reshape(&[2, 3]).unwrap();
        assert_eq!(y.shape(), [2, 3]);
        assert_eq!(y.to_vec(), x.to_vec());
        assert_eq!(y.op(), TensorOp::Reshape);

        assert!(matches!(
            x.reshape(&[4, 2]),
            Err(TensorErr::InvalidShape { len: 6, .. })
        ));
    }

    #[test]
    fn test_requires_grad_propagates() {
        let x = vector(&[1.0]).with_requires_grad(true);
        let c = vector(&[2.0]);

        assert!(x.add(&c).unwrap().requires_grad());
        assert!(!c.mul(&c).unwrap().requires_grad());
    }

    #[test]
    fn test_item_requires_single_element() {
        assert_eq!(Tensor::scalar(3.5).item().unwrap(), 3.5);
        assert!(matches!(vector(&[1.0, 2.0]).item(), Err(TensorErr::NotScalar { .. })));
    }

    #[test]
    fn test_sgd_step_updates_in_place() {
        let w = vector(&[1.0, 1.0]).with_requires_grad(true);
        let alias = w.clone();
        w.mul(&w).unwrap().sum().backward(None).unwrap();
        w.sgd_step(0.5);

        assert_eq!(alias.to_vec(), [0.0, 0.0]);
    }

    #[test]
    fn test_set_grad_checks_shape() {
        let w = vector(&[1.0, 1.0]);
        let bad = ArrayD::zeros(IxDyn(&[3]));
        assert!(w.set_grad(Some(bad)).is_err());
    }
}
