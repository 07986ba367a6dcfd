use std::{collections::HashMap, sync::Arc};

use autograd::Tensor;
use comms::specs::{
    command::{Arg, Command, Method, Reply},
    object::{ObjectId, WorkerId},
};
use futures::{FutureExt, future::BoxFuture};
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
    PointerErr, Result,
    chain::{LoggingTensor, Outcome, TensorChain, apply_native},
    pointer::{AttrPath, PointerTensor},
    registry::{self, ObjectStore},
    tensor::WorkerTensor,
    transport::{Transport, VirtualWorker},
};

/// A named endpoint owning a registry of objects and links to its peers.
pub struct Worker {
    id: WorkerId,
    objects: ObjectStore,
    peers: RwLock<HashMap<WorkerId, Arc<dyn Transport>>>,
}

impl Worker {
    /// Creates a new `Worker` with an empty registry and no peers.
    ///
    /// # Arguments
    /// * `id` - The worker's name.
    pub fn new(id: impl Into<WorkerId>) -> Arc<Self> {
        let id = id.into();

        Arc::new(Self {
            objects: ObjectStore::new(id.clone()),
            id,
            peers: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Links `other` as an in-process peer of this worker.
    pub fn add_worker(&self, other: &Arc<Worker>) {
        let link = VirtualWorker::new(other.id().clone(), Arc::downgrade(other));
        self.connect(Arc::new(link));
    }

    pub fn add_workers(&self, others: &[Arc<Worker>]) {
        for other in others.iter().filter(|other| other.id != self.id) {
            self.add_worker(other);
        }
    }

    /// Registers a transport to reach the worker it names.
    pub fn connect(&self, transport: Arc<dyn Transport>) {
        let id = transport.id().clone();
        debug!(worker = self.id.as_str(), peer = id.as_str(); "peer linked");
        self.peers.write().insert(id, transport);
    }

    fn peer(&self, id: &WorkerId) -> Result<Arc<dyn Transport>> {
        self.peers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PointerErr::UnknownWorker(id.clone()))
    }

    /// Wraps a native tensor owned by this worker under a fresh id.
    pub fn tensor(self: &Arc<Self>, tensor: Tensor) -> WorkerTensor {
        WorkerTensor::new(registry::new_id(), TensorChain::Native(tensor), Arc::clone(self))
    }

    /// Sends `cmd` to the worker `to`, which may be this very worker.
    ///
    /// # Errors
    /// `PointerErr::UnknownWorker` if there's no link to `to`, or the
    /// failure reported by the remote worker.
    pub fn request(&self, to: &WorkerId, cmd: Command) -> BoxFuture<'_, Result<Reply>> {
        let to = to.clone();

        async move {
            debug!(worker = self.id.as_str(), to = to.as_str(); "{} request", cmd.name());

            let reply = if to == self.id {
                self.execute(cmd).await
            } else {
                self.peer(&to)?.execute(cmd).await?
            };

            match reply {
                Reply::Failure(failure) => Err(failure.into()),
                reply => Ok(reply),
            }
        }
        .boxed()
    }

    /// Serves a single command, failures are turned into a `Reply::Failure`.
    pub fn execute(&self, cmd: Command) -> BoxFuture<'_, Reply> {
        async move {
            let name = cmd.name();

            match self.handle(cmd).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(worker = self.id.as_str(), command = name; "request failed: {e}");
                    Reply::Failure(e.into())
                }
            }
        }
        .boxed()
    }

    async fn handle(&self, cmd: Command) -> Result<Reply> {
        match cmd {
            Command::Register { id, object } => {
                let object = TensorChain::from_spec(object, &self.id)?;
                self.objects.insert(id, object);
                Ok(Reply::Registered(id))
            }
            Command::Get { id } => {
                let object = self.objects.take(id)?;
                Ok(Reply::Object(object.to_spec()))
            }
            Command::Execute {
                target,
                path,
                method,
                args,
                result_id,
            } => {
                let path = path.as_deref().map(AttrPath::parse).transpose()?;
                match &path {
                    Some(path) if path.selects_copy() && method.is_in_place() => {
                        return Err(PointerErr::ReadOnlyAttribute {
                            path: path.to_string(),
                            method: method.name().to_string(),
                        });
                    }
                    _ => {}
                }

                let target = self.objects.resolve(target, path.as_ref())?;
                let args = args
                    .into_iter()
                    .map(|arg| self.resolve_arg(arg))
                    .collect::<Result<Vec<_>>>()?;

                match self.invoke(&target, method, &args).await? {
                    Outcome::Chain(chain) => {
                        self.objects.insert(result_id, chain);
                        Ok(Reply::Registered(result_id))
                    }
                    Outcome::Value(value) => Ok(Reply::Value(value)),
                }
            }
            Command::Send {
                id,
                destination,
                pointer_id,
            } => {
                let object = self.objects.take(id)?;
                let ptr = match self
                    .send_object(id, object.clone(), &destination, pointer_id)
                    .await
                {
                    Ok(ptr) => ptr,
                    Err(e) => {
                        self.objects.insert(id, object);
                        return Err(e);
                    }
                };

                self.objects.insert(pointer_id, TensorChain::Pointer(ptr));
                Ok(Reply::Registered(pointer_id))
            }
            Command::Move { id, destination } => {
                let object = self
                    .objects
                    .take(id)
                    .map_err(|_| PointerErr::LocationNotFound {
                        worker: self.id.clone(),
                        id,
                    })?;

                if destination == self.id {
                    self.objects.insert(id, object);
                    return Ok(Reply::Ack);
                }

                let register = Command::Register {
                    id,
                    object: object.to_spec(),
                };
                if let Err(e) = self.request(&destination, register).await {
                    self.objects.insert(id, object);
                    return Err(e);
                }

                Ok(Reply::Ack)
            }
            Command::Forget { id } => {
                if !self.objects.remove(id) {
                    return Err(PointerErr::ObjectNotFound {
                        worker: self.id.clone(),
                        id,
                    });
                }

                Ok(Reply::Ack)
            }
            Command::Disconnect => Ok(Reply::Ack),
        }
    }

    fn resolve_arg(&self, arg: Arg) -> Result<TensorChain> {
        match arg {
            Arg::Remote { id, path } => {
                let path = path.as_deref().map(AttrPath::parse).transpose()?;
                self.objects.resolve(id, path.as_ref())
            }
            Arg::Inline(spec) => TensorChain::from_spec(spec, &self.id),
        }
    }

    /// Runs `method` on `target`, forwarding it down the chain.
    ///
    /// Decorators log the call and rewrap tensor results, pointers forward it
    /// to the worker holding the data.
    ///
    /// # Arguments
    /// * `target` - The receiver of the call.
    /// * `method` - The method to run.
    /// * `args` - The operands, they must be local or live where `target` does.
    ///
    /// # Returns
    /// A new chain, or a plain value.
    pub fn invoke<'a>(
        &'a self,
        target: &'a TensorChain,
        method: Method,
        args: &'a [TensorChain],
    ) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            match target {
                TensorChain::Native(tensor) => {
                    let args = args
                        .iter()
                        .map(|arg| self.native_operand(arg))
                        .collect::<Result<Vec<_>>>()?;

                    apply_native(tensor, &method, &args)
                }
                TensorChain::Logging(logging) => {
                    info!(
                        worker = self.id.as_str(), method = method.name(), args = args.len();
                        "logging tensor call"
                    );

                    let args: Vec<_> = args
                        .iter()
                        .map(|arg| match arg {
                            TensorChain::Logging(logging) => logging.child().clone(),
                            other => other.clone(),
                        })
                        .collect();

                    match self.invoke(logging.child(), method, &args).await? {
                        Outcome::Chain(chain) => {
                            Ok(Outcome::Chain(TensorChain::Logging(LoggingTensor::new(chain))))
                        }
                        value => Ok(value),
                    }
                }
                TensorChain::Pointer(ptr) => self.dispatch(ptr, method, args).await,
            }
        }
        .boxed()
    }

    fn native_operand(&self, arg: &TensorChain) -> Result<Tensor> {
        match arg {
            TensorChain::Native(tensor) => Ok(tensor.clone()),
            TensorChain::Logging(logging) => self.native_operand(logging.child()),
            TensorChain::Pointer(ptr) => Err(PointerErr::LocationMismatch {
                expected: self.id.clone(),
                got: ptr.location().clone(),
            }),
        }
    }

    /// Forwards a call on a pointer to the worker holding the pointed object.
    async fn dispatch(
        &self,
        target: &PointerTensor,
        method: Method,
        args: &[TensorChain],
    ) -> Result<Outcome> {
        let location = target.location();

        let args = args
            .iter()
            .map(|arg| match arg {
                TensorChain::Pointer(ptr) if ptr.location() == location => Ok(Arg::Remote {
                    id: ptr.id_at_location(),
                    path: ptr.point_to_attr().map(str::to_string),
                }),
                TensorChain::Pointer(ptr) => Err(PointerErr::LocationMismatch {
                    expected: location.clone(),
                    got: ptr.location().clone(),
                }),
                local => Ok(Arg::Inline(local.to_spec())),
            })
            .collect::<Result<Vec<_>>>()?;

        let cmd = Command::Execute {
            target: target.id_at_location(),
            path: target.point_to_attr().map(str::to_string),
            method,
            args,
            result_id: registry::new_id(),
        };

        match self.request(location, cmd).await? {
            Reply::Registered(id) => {
                let ptr = PointerTensor::new(id, location.clone(), self.id.clone(), None, None);
                Ok(Outcome::Chain(TensorChain::Pointer(ptr)))
            }
            Reply::Value(value) => Ok(Outcome::Value(value)),
            reply => Err(PointerErr::UnexpectedReply(reply.kind())),
        }
    }

    /// Sends `object` to `destination` and returns a pointer to it.
    ///
    /// Local objects are registered at `destination` under `id`. A pointer is
    /// forwarded instead: the worker it points to sends the object onwards and
    /// keeps a pointer to it, so the returned pointer addresses that one.
    ///
    /// # Arguments
    /// * `id` - The object's id, reused at `destination`.
    /// * `object` - The object to send.
    /// * `destination` - The worker to send it to.
    /// * `pointer_id` - The id of the returned pointer.
    pub(crate) fn send_object<'a>(
        &'a self,
        id: ObjectId,
        object: TensorChain,
        destination: &'a WorkerId,
        pointer_id: ObjectId,
    ) -> BoxFuture<'a, Result<PointerTensor>> {
        async move {
            match object {
                TensorChain::Pointer(ptr) => {
                    if let Some(path) = ptr.point_to_attr() {
                        return Err(PointerErr::CannotRequestTensorAttribute {
                            path: path.to_string(),
                        });
                    }

                    let remote_pointer = registry::new_id();
                    let cmd = Command::Send {
                        id: ptr.id_at_location(),
                        destination: destination.clone(),
                        pointer_id: remote_pointer,
                    };

                    let remote_pointer = expect_registered(self.request(ptr.location(), cmd).await?)?;
                    Ok(PointerTensor::new(
                        pointer_id,
                        ptr.location().clone(),
                        self.id.clone(),
                        Some(remote_pointer),
                        None,
                    ))
                }
                object => {
                    let cmd = Command::Register {
                        id,
                        object: object.to_spec(),
                    };

                    let id = expect_registered(self.request(destination, cmd).await?)?;
                    Ok(PointerTensor::new(
                        pointer_id,
                        destination.clone(),
                        self.id.clone(),
                        Some(id),
                        None,
                    ))
                }
            }
        }
        .boxed()
    }

    /// Retrieves the object `chain` points to, looking through decorators.
    ///
    /// # Returns
    /// The object's id at its former location and the object itself.
    ///
    /// # Errors
    /// `PointerErr::NotRemote` if `chain` doesn't end in a pointer, or
    /// `PointerErr::CannotRequestTensorAttribute` if the pointer selects an attribute.
    pub(crate) fn fetch<'a>(
        &'a self,
        chain: &'a TensorChain,
    ) -> BoxFuture<'a, Result<(ObjectId, TensorChain)>> {
        async move {
            match chain {
                TensorChain::Native(_) => Err(PointerErr::NotRemote),
                TensorChain::Logging(logging) => {
                    let (id, child) = self.fetch(logging.child()).await?;
                    Ok((id, TensorChain::logging(child)))
                }
                TensorChain::Pointer(ptr) => {
                    if let Some(path) = ptr.point_to_attr() {
                        return Err(PointerErr::CannotRequestTensorAttribute {
                            path: path.to_string(),
                        });
                    }

                    let id = ptr.id_at_location();
                    match self.request(ptr.location(), Command::Get { id }).await? {
                        Reply::Object(spec) => Ok((id, TensorChain::from_spec(spec, &self.id)?)),
                        reply => Err(PointerErr::UnexpectedReply(reply.kind())),
                    }
                }
            }
        }
        .boxed()
    }

    /// Relocates the object `ptr` points to, then updates the pointer.
    ///
    /// The source is always asked, so a stale pointer fails even when
    /// `destination` is its current location.
    pub(crate) async fn relocate(&self, ptr: &mut PointerTensor, destination: &WorkerId) -> Result<()> {
        let cmd = Command::Move {
            id: ptr.id_at_location(),
            destination: destination.clone(),
        };

        match self.request(ptr.location(), cmd).await? {
            Reply::Ack => {
                ptr.relocate(destination.clone());
                Ok(())
            }
            reply => Err(PointerErr::UnexpectedReply(reply.kind())),
        }
    }

    /// Deletes the object `ptr` points to.
    pub(crate) async fn forget(&self, ptr: &PointerTensor) -> Result<()> {
        let cmd = Command::Forget {
            id: ptr.id_at_location(),
        };

        match self.request(ptr.location(), cmd).await? {
            Reply::Ack => Ok(()),
            reply => Err(PointerErr::UnexpectedReply(reply.kind())),
        }
    }
}

fn expect_registered(reply: Reply) -> Result<ObjectId> {
    match reply {
        Reply::Registered(id) => Ok(id),
        reply => Err(PointerErr::UnexpectedReply(reply.kind())),
    }
}

/// Links every worker to every other one.
pub fn connect_all(workers: &[Arc<Worker>]) {
    for worker in workers {
        worker.add_workers(workers);
    }
}

#[cfg(test)]
mod tests {
    use comms::specs::command::Value;

    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), &[values.len()]).unwrap()
    }

    #[test]
    fn test_request_to_self() {
        let me = Worker::new("me");
        let spec = TensorChain::Native(vector(&[1.0])).to_spec();

        let reply = tokio_test::block_on(me.request(
            &"me".into(),
            Command::Register {
                id: 5,
                object: spec,
            },
        ))
        .unwrap();

        assert_eq!(reply, Reply::Registered(5));
        assert!(me.objects().contains(5));
    }

    #[test]
    fn test_unknown_worker() {
        let me = Worker::new("me");
        let err = tokio_test::block_on(me.request(&"bob".into(), Command::Forget { id: 1 }))
            .unwrap_err();

        assert!(matches!(err, PointerErr::UnknownWorker(id) if id.as_str() == "bob"));
    }

    #[test]
    fn test_execute_reports_failures() {
        let bob = Worker::new("bob");
        let reply = tokio_test::block_on(bob.execute(Command::Get { id: 9 }));

        let Reply::Failure(failure) = reply else {
            panic!("expected a failure");
        };
        assert!(matches!(
            PointerErr::from(failure),
            PointerErr::ObjectNotFound { id: 9, .. }
        ));
    }

    #[test]
    fn test_execute_registers_results() {
        let bob = Worker::new("bob");
        bob.objects().insert(1, TensorChain::Native(vector(&[1.0, 2.0])));

        let reply = tokio_test::block_on(bob.execute(Command::Execute {
            target: 1,
            path: None,
            method: Method::Add,
            args: vec![Arg::Remote { id: 1, path: None }],
            result_id: 2,
        }));
        assert_eq!(reply, Reply::Registered(2));

        let sum = bob.objects().get(2).unwrap();
        assert_eq!(sum.as_native().unwrap().to_vec(), [2.0, 4.0]);

        let reply = tokio_test::block_on(bob.execute(Command::Execute {
            target: 2,
            path: None,
            method: Method::Shape,
            args: Vec::new(),
            result_id: 3,
        }));
        assert_eq!(reply, Reply::Value(Value::Shape(vec![2])));
        assert!(!bob.objects().contains(3));
    }

    #[test]
    fn test_move_of_missing_object() {
        let bob = Worker::new("bob");
        let reply = tokio_test::block_on(bob.execute(Command::Move {
            id: 4,
            destination: "alice".into(),
        }));

        let Reply::Failure(failure) = reply else {
            panic!("expected a failure");
        };
        assert!(matches!(
            PointerErr::from(failure),
            PointerErr::LocationNotFound { id: 4, .. }
        ));
    }

    #[test]
    fn test_logging_rewraps_results() {
        let me = Worker::new("me");
        let x = TensorChain::logging(TensorChain::Native(vector(&[1.0, 2.0])));

        let outcome = tokio_test::block_on(me.invoke(&x, Method::Neg, &[])).unwrap();
        let Outcome::Chain(TensorChain::Logging(logging)) = outcome else {
            panic!("expected a logging tensor");
        };
        assert_eq!(logging.child().as_native().unwrap().to_vec(), [-1.0, -2.0]);
    }

    #[test]
    fn test_native_target_rejects_pointer_operand() {
        let me = Worker::new("me");
        let x = TensorChain::Native(vector(&[1.0]));
        let ptr = TensorChain::Pointer(PointerTensor::new(1, "bob".into(), "me".into(), None, None));

        let err = tokio_test::block_on(me.invoke(&x, Method::Add, &[ptr])).unwrap_err();
        assert!(matches!(err, PointerErr::LocationMismatch { .. }));
    }
}
