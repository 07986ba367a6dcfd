use std::{error::Error, fmt, io};

use autograd::TensorErr;
use comms::specs::{
    command::Failure,
    object::{ObjectId, WorkerId},
};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, PointerErr>;

/// Failures of the pointer layer, both local and reported by a remote worker.
#[derive(Debug)]
pub enum PointerErr {
    ObjectNotFound {
        worker: WorkerId,
        id: ObjectId,
    },
    LocationNotFound {
        worker: WorkerId,
        id: ObjectId,
    },
    CannotRequestTensorAttribute {
        path: String,
    },
    AttributeNotFound {
        path: String,
    },
    /// An in-place method called on an attribute that is only a copy.
    ReadOnlyAttribute {
        path: String,
        method: String,
    },
    LocationMismatch {
        expected: WorkerId,
        got: WorkerId,
    },
    UnknownWorker(WorkerId),
    NotRemote,
    InvalidArguments {
        method: String,
        expected: String,
        got: usize,
    },
    UnexpectedReply(&'static str),
    /// A failure raised by a remote worker that only carries its message.
    Remote(String),
    Tensor(TensorErr),
    Io(io::Error),
}

impl fmt::Display for PointerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerErr::ObjectNotFound { worker, id } => {
                write!(f, "object {id} not found at worker {worker}")
            }
            PointerErr::LocationNotFound { worker, id } => {
                write!(f, "worker {worker} doesn't hold object {id} anymore")
            }
            PointerErr::CannotRequestTensorAttribute { path } => write!(
                f,
                "cannot get a tensor attribute, the pointer points to `{path}`"
            ),
            PointerErr::AttributeNotFound { path } => write!(f, "attribute `{path}` not found"),
            PointerErr::ReadOnlyAttribute { path, method } => {
                write!(f, "attribute `{path}` is a copy, {method} cannot change it")
            }
            PointerErr::LocationMismatch { expected, got } => write!(
                f,
                "operands must live at the same worker: expected {expected}, got {got}"
            ),
            PointerErr::UnknownWorker(worker) => write!(f, "unknown worker {worker}"),
            PointerErr::NotRemote => f.write_str("the tensor isn't a pointer to a remote object"),
            PointerErr::InvalidArguments {
                method,
                expected,
                got,
            } => write!(f, "{method} takes {expected} arguments, got {got}"),
            PointerErr::UnexpectedReply(kind) => write!(f, "unexpected reply: got {kind}"),
            PointerErr::Remote(detail) => write!(f, "remote failure: {detail}"),
            PointerErr::Tensor(e) => write!(f, "tensor error: {e}"),
            PointerErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for PointerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PointerErr::Tensor(e) => Some(e),
            PointerErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PointerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<TensorErr> for PointerErr {
    fn from(value: TensorErr) -> Self {
        Self::Tensor(value)
    }
}

impl From<Failure> for PointerErr {
    fn from(value: Failure) -> Self {
        match value {
            Failure::ObjectNotFound { worker, id } => Self::ObjectNotFound { worker, id },
            Failure::LocationNotFound { worker, id } => Self::LocationNotFound { worker, id },
            Failure::CannotRequestTensorAttribute { path } => {
                Self::CannotRequestTensorAttribute { path }
            }
            Failure::AttributeNotFound { path } => Self::AttributeNotFound { path },
            Failure::ReadOnlyAttribute { path, method } => Self::ReadOnlyAttribute { path, method },
            Failure::LocationMismatch { expected, got } => Self::LocationMismatch { expected, got },
            Failure::UnknownWorker { worker } => Self::UnknownWorker(worker),
            Failure::NotRemote => Self::NotRemote,
            Failure::InvalidArguments {
                method,
                expected,
                got,
            } => Self::InvalidArguments {
                method,
                expected,
                got,
            },
            Failure::Tensor { detail } | Failure::Other { detail } => Self::Remote(detail),
        }
    }
}

/// Wire conversion, so the error kind survives the hop back to the caller.
impl From<PointerErr> for Failure {
    fn from(value: PointerErr) -> Self {
        match value {
            PointerErr::ObjectNotFound { worker, id } => Failure::ObjectNotFound { worker, id },
            PointerErr::LocationNotFound { worker, id } => Failure::LocationNotFound { worker, id },
            PointerErr::CannotRequestTensorAttribute { path } => {
                Failure::CannotRequestTensorAttribute { path }
            }
            PointerErr::AttributeNotFound { path } => Failure::AttributeNotFound { path },
            PointerErr::ReadOnlyAttribute { path, method } => {
                Failure::ReadOnlyAttribute { path, method }
            }
            PointerErr::LocationMismatch { expected, got } => {
                Failure::LocationMismatch { expected, got }
            }
            PointerErr::UnknownWorker(worker) => Failure::UnknownWorker { worker },
            PointerErr::NotRemote => Failure::NotRemote,
            PointerErr::InvalidArguments {
                method,
                expected,
                got,
            } => Failure::InvalidArguments {
                method,
                expected,
                got,
            },
            PointerErr::Tensor(e) => Failure::Tensor {
                detail: e.to_string(),
            },
            PointerErr::Remote(detail) => Failure::Other { detail },
            other @ (PointerErr::UnexpectedReply(_) | PointerErr::Io(_)) => Failure::Other {
                detail: other.to_string(),
            },
        }
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<PointerErr> for io::Error {
    fn from(value: PointerErr) -> Self {
        match value {
            PointerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_error_kind() {
        let err = PointerErr::LocationNotFound {
            worker: "bob".into(),
            id: 3,
        };

        let back = PointerErr::from(Failure::from(err));
        assert!(matches!(
            back,
            PointerErr::LocationNotFound { ref worker, id: 3 } if worker.as_str() == "bob"
        ));
    }

    #[test]
    fn test_tensor_errors_travel_as_text() {
        let err = PointerErr::from(TensorErr::DoesNotRequireGrad);
        let failure = Failure::from(err);

        let PointerErr::Remote(detail) = PointerErr::from(failure) else {
            panic!("expected a remote failure");
        };
        assert!(detail.contains("does not require grad"));
    }
}
