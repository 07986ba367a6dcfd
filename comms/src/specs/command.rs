use serde::{Deserialize, Serialize};

use super::object::{ObjectId, ObjectSpec, WorkerId};

/// The tensor methods that can be forwarded to the worker owning the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Add,
    Sub,
    Mul,
    MatMul,
    Neg,
    Sum,
    Reshape { shape: Vec<usize> },
    Backward,
    ZeroGrad,
    SgdStep { lr: f32 },
    Item,
    Shape,
    Equal,
}

impl Method {
    /// The method's name, as used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Add => "add",
            Method::Sub => "sub",
            Method::Mul => "mul",
            Method::MatMul => "matmul",
            Method::Neg => "neg",
            Method::Sum => "sum",
            Method::Reshape { .. } => "reshape",
            Method::Backward => "backward",
            Method::ZeroGrad => "zero_grad",
            Method::SgdStep { .. } => "sgd_step",
            Method::Item => "item",
            Method::Shape => "shape",
            Method::Equal => "equal",
        }
    }

    /// Whether the method changes its receiver instead of producing a result.
    pub fn is_in_place(&self) -> bool {
        matches!(self, Method::ZeroGrad | Method::SgdStep { .. })
    }
}

/// An operand of a forwarded method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    /// An object already registered at the executing worker.
    Remote {
        id: ObjectId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// A local object shipped along with the call.
    Inline(ObjectSpec),
}

/// The requests a worker can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Takes ownership of `object` under `id`, replacing any previous entry.
    Register { id: ObjectId, object: ObjectSpec },
    /// Removes the object and returns it to the caller.
    Get { id: ObjectId },
    /// Runs `method` on the object, registering a tensor result under `result_id`.
    Execute {
        target: ObjectId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        method: Method,
        args: Vec<Arg>,
        result_id: ObjectId,
    },
    /// Sends the object onwards to `destination`, keeping a pointer to it under `pointer_id`.
    Send {
        id: ObjectId,
        destination: WorkerId,
        pointer_id: ObjectId,
    },
    /// Relocates the object to `destination` under the same id.
    Move { id: ObjectId, destination: WorkerId },
    /// Deletes the object.
    Forget { id: ObjectId },
    Disconnect,
}

impl Command {
    /// A short name for the command, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register { .. } => "register",
            Command::Get { .. } => "get",
            Command::Execute { .. } => "execute",
            Command::Send { .. } => "send",
            Command::Move { .. } => "move",
            Command::Forget { .. } => "forget",
            Command::Disconnect => "disconnect",
        }
    }
}

/// A method result that is returned by value instead of being registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Unit,
    Bool(bool),
    Scalar(f32),
    Shape(Vec<usize>),
}

/// A failure on the serving worker, kept structured so its kind survives the hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    ObjectNotFound { worker: WorkerId, id: ObjectId },
    LocationNotFound { worker: WorkerId, id: ObjectId },
    CannotRequestTensorAttribute { path: String },
    AttributeNotFound { path: String },
    ReadOnlyAttribute { path: String, method: String },
    LocationMismatch { expected: WorkerId, got: WorkerId },
    UnknownWorker { worker: WorkerId },
    NotRemote,
    InvalidArguments {
        method: String,
        expected: String,
        got: usize,
    },
    Tensor { detail: String },
    Other { detail: String },
}

/// The answer to a `Command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ack,
    Object(ObjectSpec),
    Registered(ObjectId),
    Value(Value),
    Failure(Failure),
}

impl Reply {
    /// A short name for the reply's kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Ack => "ack",
            Reply::Object(_) => "object",
            Reply::Registered(_) => "registered",
            Reply::Value(_) => "value",
            Reply::Failure(_) => "failure",
        }
    }
}
