use std::{
    fmt::{self, Display},
    str::FromStr,
};

use comms::specs::object::{ObjectId, PointerSpec, WorkerId};

use crate::{PointerErr, Result};

/// A single step of an attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    /// The wrapped tensor of a decorator.
    Child,
    /// The gradient buffer of a native tensor.
    ///
    /// Selecting it yields a detached copy, so in-place methods are rejected on it.
    Grad,
}

impl Attr {
    fn name(&self) -> &'static str {
        match self {
            Attr::Child => "child",
            Attr::Grad => "grad",
        }
    }
}

/// A dotted selector into a tensor chain, e.g. `child.child` or `child.grad`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath(Vec<Attr>);

impl AttrPath {
    pub fn parse(path: &str) -> Result<Self> {
        path.parse()
    }

    pub fn segments(&self) -> &[Attr] {
        &self.0
    }

    /// Whether the selected object is a copy rather than the object itself.
    pub fn selects_copy(&self) -> bool {
        self.0.contains(&Attr::Grad)
    }

    /// Appends `name` to an optional dotted path.
    ///
    /// # Errors
    /// `PointerErr::AttributeNotFound` if the resulting path isn't a valid selector.
    pub fn join(path: Option<&str>, name: &str) -> Result<String> {
        let joined = match path {
            Some(path) => format!("{path}.{name}"),
            None => name.to_string(),
        };

        Self::parse(&joined)?;
        Ok(joined)
    }
}

impl FromStr for AttrPath {
    type Err = PointerErr;

    fn from_str(path: &str) -> Result<Self> {
        let not_found = || PointerErr::AttributeNotFound {
            path: path.to_string(),
        };

        path.split('.')
            .map(|segment| match segment {
                "child" => Ok(Attr::Child),
                "grad" => Ok(Attr::Grad),
                _ => Err(not_found()),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}

impl Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(attr.name())?;
        }

        Ok(())
    }
}

/// A local handle to an object owned by another worker.
///
/// It holds no data, only the coordinates of the remote object. Dropping it
/// leaves the remote object untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerTensor {
    id: ObjectId,
    id_at_location: ObjectId,
    location: WorkerId,
    owner: WorkerId,
    point_to_attr: Option<String>,
}

impl PointerTensor {
    /// Creates a new `PointerTensor`.
    ///
    /// # Arguments
    /// * `id` - The id of the pointer itself.
    /// * `location` - The worker holding the pointed object.
    /// * `owner` - The worker holding this pointer.
    /// * `id_at_location` - The id of the pointed object, defaults to `id`.
    /// * `point_to_attr` - A dotted path selecting a nested part of the pointed object.
    pub fn new(
        id: ObjectId,
        location: WorkerId,
        owner: WorkerId,
        id_at_location: Option<ObjectId>,
        point_to_attr: Option<String>,
    ) -> Self {
        Self {
            id,
            id_at_location: id_at_location.unwrap_or(id),
            location,
            owner,
            point_to_attr,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn id_at_location(&self) -> ObjectId {
        self.id_at_location
    }

    pub fn location(&self) -> &WorkerId {
        &self.location
    }

    pub fn owner(&self) -> &WorkerId {
        &self.owner
    }

    pub fn point_to_attr(&self) -> Option<&str> {
        self.point_to_attr.as_deref()
    }

    /// Returns a pointer to the attribute `name` of the pointed object.
    pub fn attr(&self, name: &str) -> Result<Self> {
        let path = AttrPath::join(self.point_to_attr(), name)?;

        Ok(Self {
            point_to_attr: Some(path),
            ..self.clone()
        })
    }

    /// Replaces the attribute path, `None` points to the whole object again.
    pub fn set_point_to_attr(&mut self, path: Option<&str>) -> Result<()> {
        if let Some(path) = path {
            AttrPath::parse(path)?;
        }

        self.point_to_attr = path.map(str::to_string);
        Ok(())
    }

    /// The parsed attribute path, if any.
    pub fn path(&self) -> Result<Option<AttrPath>> {
        self.point_to_attr().map(AttrPath::parse).transpose()
    }

    pub(crate) fn relocate(&mut self, location: WorkerId) {
        self.location = location;
    }

    pub fn to_spec(&self) -> PointerSpec {
        PointerSpec {
            id: self.id,
            id_at_location: self.id_at_location,
            location: self.location.clone(),
            owner: self.owner.clone(),
            point_to_attr: self.point_to_attr.clone(),
        }
    }

    /// Rebuilds a pointer received from the network, now held by `owner`.
    pub fn from_spec(spec: PointerSpec, owner: &WorkerId) -> Self {
        Self {
            id: spec.id,
            id_at_location: spec.id_at_location,
            location: spec.location,
            owner: owner.clone(),
            point_to_attr: spec.point_to_attr,
        }
    }
}

impl Display for PointerTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[PointerTensor | {}:{} -> {}:{}",
            self.owner, self.id, self.location, self.id_at_location
        )?;

        if let Some(path) = &self.point_to_attr {
            write!(f, "::{path}")?;
        }

        f.write_str("]")
    }
}
