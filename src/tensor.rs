use std::{
    fmt::{self, Display},
    sync::Arc,
};

use autograd::Tensor;
use comms::specs::{
    command::{Method, Value},
    object::{ObjectId, WorkerId},
};
use log::debug;

use crate::{
    PointerErr, Result,
    chain::{Outcome, TensorChain},
    pointer::{AttrPath, PointerTensor},
    registry,
    worker::Worker,
};

/// How `WorkerTensor::create_pointer_with` builds a pointer.
#[derive(Default)]
pub struct PointerOptions<'a> {
    /// The worker holding the data, defaults to the tensor's owner.
    pub location: Option<&'a WorkerId>,
    /// The id of the data there, defaults to the tensor's id.
    pub id_at_location: Option<ObjectId>,
    /// Records the pointer in its owner's registry, so other workers can point to it.
    pub register: bool,
    /// The worker holding the pointer, defaults to the tensor's owner.
    pub owner: Option<&'a Arc<Worker>>,
    /// The pointer's own id, defaults to the tensor's id when `location` is
    /// another worker and to a fresh id otherwise.
    pub ptr_id: Option<ObjectId>,
}

/// A tensor chain as seen from the worker holding it.
///
/// Every method runs through the owner, so the same calls work whether the
/// chain is a local tensor or a pointer to one living elsewhere.
#[derive(Clone)]
pub struct WorkerTensor {
    id: ObjectId,
    chain: TensorChain,
    owner: Arc<Worker>,
}

impl WorkerTensor {
    pub(crate) fn new(id: ObjectId, chain: TensorChain, owner: Arc<Worker>) -> Self {
        Self { id, chain, owner }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn chain(&self) -> &TensorChain {
        &self.chain
    }

    pub fn into_chain(self) -> TensorChain {
        self.chain
    }

    pub fn owner(&self) -> &Arc<Worker> {
        &self.owner
    }

    pub fn is_pointer(&self) -> bool {
        self.chain.is_pointer()
    }

    pub fn as_native(&self) -> Option<&Tensor> {
        self.chain.as_native()
    }

    pub fn as_pointer(&self) -> Option<&PointerTensor> {
        self.chain.as_pointer()
    }

    /// The worker holding the data, looking through decorators.
    pub fn location(&self) -> &WorkerId {
        match self.chain.innermost_pointer() {
            Some(ptr) => ptr.location(),
            None => self.owner.id(),
        }
    }

    /// The id of the data at its location.
    pub fn id_at_location(&self) -> ObjectId {
        self.chain
            .innermost_pointer()
            .map_or(self.id, PointerTensor::id_at_location)
    }

    /// Wraps this tensor in a `LoggingTensor`.
    pub fn logging(self) -> Self {
        Self {
            chain: TensorChain::logging(self.chain),
            ..self
        }
    }

    fn derive(&self, chain: TensorChain) -> Self {
        let id = match &chain {
            TensorChain::Pointer(ptr) => ptr.id(),
            _ => registry::new_id(),
        };

        Self::new(id, chain, Arc::clone(&self.owner))
    }

    /// Creates a pointer to this tensor without moving any data.
    ///
    /// # Arguments
    /// * `location` - The worker holding the data, defaults to the owner.
    /// * `id_at_location` - The id of the data there, defaults to this tensor's id.
    /// * `ptr_id` - The pointer's own id, defaults to this tensor's id when
    ///              `location` is another worker and to a fresh id otherwise.
    pub fn create_pointer(
        &self,
        location: Option<&WorkerId>,
        id_at_location: Option<ObjectId>,
        ptr_id: Option<ObjectId>,
    ) -> Self {
        self.create_pointer_with(PointerOptions {
            location,
            id_at_location,
            ptr_id,
            ..Default::default()
        })
    }

    /// Creates a pointer to this tensor, see `PointerOptions` for the defaults.
    pub fn create_pointer_with(&self, options: PointerOptions<'_>) -> Self {
        let owner = options.owner.unwrap_or(&self.owner);
        let location = options.location.unwrap_or(self.owner.id());

        let ptr_id = options.ptr_id.unwrap_or_else(|| {
            if location == self.owner.id() {
                registry::new_id()
            } else {
                self.id
            }
        });

        let ptr = PointerTensor::new(
            ptr_id,
            location.clone(),
            owner.id().clone(),
            Some(options.id_at_location.unwrap_or(self.id)),
            None,
        );

        if options.register {
            debug!(worker = owner.id().as_str(), id = ptr_id; "pointer registered");
            owner.objects().insert(ptr_id, TensorChain::Pointer(ptr.clone()));
        }

        Self::new(ptr_id, TensorChain::Pointer(ptr), Arc::clone(owner))
    }

    /// Sends this tensor to `destination` and returns a pointer to it.
    ///
    /// A local tensor leaves the owner's registry, if it was registered there,
    /// and keeps its id at `destination`. Sending a pointer asks the worker it
    /// points to to send the data onwards, yielding a pointer to a pointer.
    pub async fn send(&self, destination: &WorkerId) -> Result<Self> {
        let ptr_id = match &self.chain {
            TensorChain::Pointer(_) => registry::new_id(),
            _ => self.id,
        };

        let ptr = self
            .owner
            .send_object(self.id, self.chain.clone(), destination, ptr_id)
            .await?;

        if !self.is_pointer() && destination != self.owner.id() {
            self.owner.objects().remove(self.id);
        }

        Ok(Self::new(ptr_id, TensorChain::Pointer(ptr), Arc::clone(&self.owner)))
    }

    /// Retrieves the pointed data, which leaves the remote worker.
    ///
    /// # Errors
    /// `PointerErr::NotRemote` on a local tensor, or
    /// `PointerErr::CannotRequestTensorAttribute` if the pointer selects an attribute.
    pub async fn get(&self) -> Result<Self> {
        let (id, chain) = self.owner.fetch(&self.chain).await?;
        Ok(Self::new(id, chain, Arc::clone(&self.owner)))
    }

    /// Moves the pointed data to `destination` under the same id.
    pub async fn move_to(&mut self, destination: &WorkerId) -> Result<()> {
        let owner = Arc::clone(&self.owner);
        let ptr = self
            .chain
            .innermost_pointer_mut()
            .ok_or(PointerErr::NotRemote)?;

        owner.relocate(ptr, destination).await
    }

    /// Deletes the pointed data.
    pub async fn forget(self) -> Result<()> {
        let ptr = self.chain.innermost_pointer().ok_or(PointerErr::NotRemote)?;
        self.owner.forget(ptr).await
    }

    /// Selects the attribute `name`.
    ///
    /// On a pointer this only records the path, which is applied remotely by
    /// the next call.
    pub fn attr(&self, name: &str) -> Result<Self> {
        let chain = match &self.chain {
            TensorChain::Pointer(ptr) => TensorChain::Pointer(ptr.attr(name)?),
            chain => chain.select(&AttrPath::parse(name)?)?,
        };

        Ok(Self { chain, ..self.clone() })
    }

    pub fn set_point_to_attr(&mut self, path: Option<&str>) -> Result<()> {
        match &mut self.chain {
            TensorChain::Pointer(ptr) => ptr.set_point_to_attr(path),
            _ => Err(PointerErr::NotRemote),
        }
    }

    async fn call(&self, method: Method, args: &[&WorkerTensor]) -> Result<Outcome> {
        let args: Vec<_> = args.iter().map(|arg| arg.chain.clone()).collect();
        self.owner.invoke(&self.chain, method, &args).await
    }

    async fn call_chain(&self, method: Method, args: &[&WorkerTensor]) -> Result<Self> {
        match self.call(method, args).await? {
            Outcome::Chain(chain) => Ok(self.derive(chain)),
            Outcome::Value(_) => Err(PointerErr::UnexpectedReply("value")),
        }
    }

    async fn call_value(&self, method: Method, args: &[&WorkerTensor]) -> Result<Value> {
        match self.call(method, args).await? {
            Outcome::Value(value) => Ok(value),
            Outcome::Chain(_) => Err(PointerErr::UnexpectedReply("chain")),
        }
    }

    async fn call_unit(&self, method: Method, args: &[&WorkerTensor]) -> Result<()> {
        match self.call_value(method, args).await? {
            Value::Unit => Ok(()),
            _ => Err(PointerErr::UnexpectedReply("value")),
        }
    }

    pub async fn add(&self, rhs: &WorkerTensor) -> Result<Self> {
        self.call_chain(Method::Add, &[rhs]).await
    }

    pub async fn sub(&self, rhs: &WorkerTensor) -> Result<Self> {
        self.call_chain(Method::Sub, &[rhs]).await
    }

    pub async fn mul(&self, rhs: &WorkerTensor) -> Result<Self> {
        self.call_chain(Method::Mul, &[rhs]).await
    }

    pub async fn matmul(&self, rhs: &WorkerTensor) -> Result<Self> {
        self.call_chain(Method::MatMul, &[rhs]).await
    }

    pub async fn neg(&self) -> Result<Self> {
        self.call_chain(Method::Neg, &[]).await
    }

    pub async fn sum(&self) -> Result<Self> {
        self.call_chain(Method::Sum, &[]).await
    }

    pub async fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let method = Method::Reshape {
            shape: shape.to_vec(),
        };
        self.call_chain(method, &[]).await
    }

    /// Back propagates from this single element tensor.
    pub async fn backward(&self) -> Result<()> {
        self.call_unit(Method::Backward, &[]).await
    }

    /// Back propagates `seed` as the gradient of this tensor.
    pub async fn backward_with(&self, seed: &WorkerTensor) -> Result<()> {
        self.call_unit(Method::Backward, &[seed]).await
    }

    pub async fn zero_grad(&self) -> Result<()> {
        self.call_unit(Method::ZeroGrad, &[]).await
    }

    /// Applies `w -= lr * grad` in place.
    pub async fn sgd_step(&self, lr: f32) -> Result<()> {
        self.call_unit(Method::SgdStep { lr }, &[]).await
    }

    pub async fn item(&self) -> Result<f32> {
        match self.call_value(Method::Item, &[]).await? {
            Value::Scalar(value) => Ok(value),
            _ => Err(PointerErr::UnexpectedReply("value")),
        }
    }

    pub async fn shape(&self) -> Result<Vec<usize>> {
        match self.call_value(Method::Shape, &[]).await? {
            Value::Shape(shape) => Ok(shape),
            _ => Err(PointerErr::UnexpectedReply("value")),
        }
    }

    /// Returns whether both tensors hold the same values.
    pub async fn equal(&self, other: &WorkerTensor) -> Result<bool> {
        match self.call_value(Method::Equal, &[other]).await? {
            Value::Bool(eq) => Ok(eq),
            _ => Err(PointerErr::UnexpectedReply("value")),
        }
    }
}

impl fmt::Debug for WorkerTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTensor")
            .field("id", &self.id)
            .field("owner", self.owner.id())
            .field("chain", &self.chain)
            .finish()
    }
}

impl Display for WorkerTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chain)
    }
}
