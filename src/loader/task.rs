//! Load tasks.

use super::object_pool::ObjectId;
use crate::model::ResourceName;
use crate::scheduler::{Priority, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTaskKind {
    Asset { asset_type: Option<String> },
    Scene,
    /// Loads a dependency on behalf of the task with serial `parent`.
    Dependency { parent: u64 },
}

/// One asset, scene or dependency load.
#[derive(Debug)]
pub struct LoadTask {
    pub(super) serial: u64,
    pub(super) priority: Priority,
    pub(super) kind: LoadTaskKind,
    pub(super) asset_name: String,
    pub(super) resource: ResourceName,
    /// Direct dependency asset names.
    pub(super) dependencies: Vec<String>,
    /// Spawned dependency objects delivered so far.
    pub(super) dependency_objects: Vec<ObjectId>,
    pub(super) reported_dependencies: usize,
    pub(super) bundle: Option<ObjectId>,
    pub(super) done: bool,
}

impl LoadTask {
    pub(super) fn new(
        serial: u64,
        priority: Priority,
        kind: LoadTaskKind,
        asset_name: String,
        resource: ResourceName,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            serial,
            priority,
            kind,
            asset_name,
            resource,
            dependencies,
            dependency_objects: Vec::new(),
            reported_dependencies: 0,
            bundle: None,
            done: false,
        }
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn kind(&self) -> &LoadTaskKind {
        &self.kind
    }

    pub fn is_scene(&self) -> bool {
        self.kind == LoadTaskKind::Scene
    }

    pub fn parent(&self) -> Option<u64> {
        match self.kind {
            LoadTaskKind::Dependency { parent } => Some(parent),
            _ => None,
        }
    }

    pub(super) fn asset_type(&self) -> Option<&str> {
        match &self.kind {
            LoadTaskKind::Asset { asset_type } => asset_type.as_deref(),
            _ => None,
        }
    }

    pub(super) fn all_dependencies_reported(&self) -> bool {
        self.reported_dependencies >= self.dependencies.len()
    }
}

impl Task for LoadTask {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn description(&self) -> String {
        match &self.kind {
            LoadTaskKind::Asset { .. } => format!("asset {}", self.asset_name),
            LoadTaskKind::Scene => format!("scene {}", self.asset_name),
            LoadTaskKind::Dependency { parent } => format!("dependency {} of #{parent}", self.asset_name),
        }
    }
}
