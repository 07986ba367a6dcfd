use std::collections::HashMap;

use comms::specs::object::{ObjectId, WorkerId};
use parking_lot::Mutex;

use crate::{PointerErr, Result, chain::TensorChain, pointer::AttrPath};

/// Generates a new random object id.
pub fn new_id() -> ObjectId {
    rand::random()
}

/// The objects owned by a single worker.
///
/// Every method holds the lock for its whole duration, so no caller
/// observes a half registered or half removed object.
#[derive(Debug)]
pub struct ObjectStore {
    worker: WorkerId,
    objects: Mutex<HashMap<ObjectId, TensorChain>>,
}

impl ObjectStore {
    /// Creates a new empty `ObjectStore`.
    ///
    /// # Arguments
    /// * `worker` - The worker this store belongs to, used in errors.
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `object` under a fresh id.
    ///
    /// # Returns
    /// The id of the registered object.
    pub fn register(&self, object: TensorChain) -> ObjectId {
        let mut objects = self.objects.lock();

        let mut id = new_id();
        while objects.contains_key(&id) {
            id = new_id();
        }

        objects.insert(id, object);
        id
    }

    /// Registers `object` under `id`, replacing any previous entry.
    ///
    /// # Returns
    /// The replaced object, if any.
    pub fn insert(&self, id: ObjectId, object: TensorChain) -> Option<TensorChain> {
        self.objects.lock().insert(id, object)
    }

    /// Returns a handle to the object, which stays registered.
    ///
    /// # Errors
    /// `PointerErr::ObjectNotFound` if `id` isn't registered.
    pub fn get(&self, id: ObjectId) -> Result<TensorChain> {
        self.objects
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    /// Removes the object and returns it.
    ///
    /// # Errors
    /// `PointerErr::ObjectNotFound` if `id` isn't registered.
    pub fn take(&self, id: ObjectId) -> Result<TensorChain> {
        self.objects
            .lock()
            .remove(&id)
            .ok_or_else(|| self.not_found(id))
    }

    /// Removes the object, returning whether it was registered.
    pub fn remove(&self, id: ObjectId) -> bool {
        self.objects.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// The registered ids in ascending order.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.objects.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Looks up the object and selects `path` within it.
    ///
    /// # Errors
    /// `PointerErr::ObjectNotFound` if `id` isn't registered, or
    /// `PointerErr::AttributeNotFound` if the path doesn't exist in the object.
    pub fn resolve(&self, id: ObjectId, path: Option<&AttrPath>) -> Result<TensorChain> {
        let object = self.get(id)?;
        match path {
            Some(path) => object.select(path),
            None => Ok(object),
        }
    }

    fn not_found(&self, id: ObjectId) -> PointerErr {
        PointerErr::ObjectNotFound {
            worker: self.worker.clone(),
            id,
        }
    }
}
