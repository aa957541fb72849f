//! Logical asset records.

use super::name::ResourceName;

/// An individually loadable item living inside exactly one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    name: String,
    resource: ResourceName,
    dependencies: Vec<String>,
}

impl AssetInfo {
    pub fn new(name: impl Into<String>, resource: ResourceName, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            resource,
            dependencies,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Dependency asset names in manifest order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
