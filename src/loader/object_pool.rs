//! Arena of spawn-counted objects addressed by stable id.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ResourceError;

/// Stable identity of a pooled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Pooled<T> {
    name: String,
    target: T,
    spawn_count: usize,
}

/// Named objects with a spawn count each. At most one object per name.
pub struct ObjectPool<T> {
    label: &'static str,
    objects: HashMap<ObjectId, Pooled<T>>,
    by_name: HashMap<String, ObjectId>,
    next_id: u64,
}

impl<T> ObjectPool<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            objects: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 1,
        }
    }

    /// Add an object, optionally spawned once.
    pub fn register(&mut self, name: impl Into<String>, target: T, spawned: bool) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.objects.insert(
            id,
            Pooled {
                name,
                target,
                spawn_count: usize::from(spawned),
            },
        );
        id
    }

    /// Spawn the object registered under `name`.
    pub fn spawn(&mut self, name: &str) -> Option<ObjectId> {
        let id = *self.by_name.get(name)?;
        let object = self.objects.get_mut(&id)?;
        object.spawn_count += 1;
        Some(id)
    }

    pub fn unspawn(&mut self, id: ObjectId) -> Result<(), ResourceError> {
        let label = self.label;
        let object = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| ResourceError::fault(format!("{label} object {id} does not exist")))?;
        if object.spawn_count == 0 {
            return Err(ResourceError::fault(format!(
                "{label} object '{}' is not spawned",
                object.name
            )));
        }
        object.spawn_count -= 1;
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        let object = self.objects.remove(&id)?;
        if self.by_name.get(&object.name) == Some(&id) {
            self.by_name.remove(&object.name);
        }
        Some(object.target)
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(&id).map(|o| &o.target)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.objects.get_mut(&id).map(|o| &mut o.target)
    }

    pub fn name(&self, id: ObjectId) -> Option<&str> {
        self.objects.get(&id).map(|o| o.name.as_str())
    }

    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied()
    }

    pub fn spawn_count(&self, id: ObjectId) -> Option<usize> {
        self.objects.get(&id).map(|o| o.spawn_count)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
