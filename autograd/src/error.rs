use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire autograd crate.
pub type Result<T> = std::result::Result<T, TensorErr>;

/// The autograd crate's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorErr {
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },
    InvalidShape {
        shape: Vec<usize>,
        len: usize,
    },
    NotMatrix {
        op: &'static str,
        ndim: usize,
    },
    NotScalar {
        shape: Vec<usize>,
    },
    GradSeedRequired {
        shape: Vec<usize>,
    },
    DoesNotRequireGrad,
}

impl Display for TensorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorErr::ShapeMismatch { op, lhs, rhs } => {
                write!(f, "shape mismatch in {op}: {lhs:?} and {rhs:?}")
            }
            TensorErr::InvalidShape { shape, len } => {
                write!(f, "cannot build a tensor of shape {shape:?} from {len} values")
            }
            TensorErr::NotMatrix { op, ndim } => {
                write!(f, "{op} expects 2-dimensional operands, got {ndim} dimensions")
            }
            TensorErr::NotScalar { shape } => {
                write!(f, "expected a single element tensor, got shape {shape:?}")
            }
            TensorErr::GradSeedRequired { shape } => write!(
                f,
                "a gradient seed must be given for non scalar outputs, got shape {shape:?}"
            ),
            TensorErr::DoesNotRequireGrad => {
                f.write_str("tensor does not require grad and has no gradient graph")
            }
        }
    }
}

impl Error for TensorErr {}
