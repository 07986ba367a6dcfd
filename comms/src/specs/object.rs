use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The identifier of an object inside a worker's registry.
pub type ObjectId = u64;

/// The name of a worker, which is also its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire representation of a native tensor.
///
/// The gradient buffer travels inside the same spec as its tensor, the
/// computation history doesn't travel at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    #[serde(with = "super::floats")]
    pub data: Vec<f32>,
    pub requires_grad: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::floats::option"
    )]
    pub grad: Option<Vec<f32>>,
}

/// Wire representation of a pointer to an object living in another worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSpec {
    pub id: ObjectId,
    pub id_at_location: ObjectId,
    pub location: WorkerId,
    pub owner: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_to_attr: Option<String>,
}

/// Wire representation of a whole tensor chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectSpec {
    Native(TensorSpec),
    Logging(Box<ObjectSpec>),
    Pointer(PointerSpec),
}

impl From<TensorSpec> for ObjectSpec {
    fn from(spec: TensorSpec) -> Self {
        ObjectSpec::Native(spec)
    }
}
