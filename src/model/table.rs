//! The live resource table shared by every component.

use std::collections::{BTreeMap, HashMap};

use super::asset::AssetInfo;
use super::group::{ResourceGroup, ResourceGroupCollection};
use super::name::ResourceName;
use super::resource::{ReadWriteEntry, ResourceInfo};
use crate::error::ResourceError;
use crate::manifest::{Manifest, ManifestKind, ManifestResource};

/// Assets, resources, groups and the read-write manifest image.
#[derive(Debug, Default)]
pub struct ResourceTable {
    applicable_version: Option<String>,
    internal_version: i32,
    assets: HashMap<String, AssetInfo>,
    resources: BTreeMap<ResourceName, ResourceInfo>,
    groups: BTreeMap<String, ResourceGroup>,
    read_write: BTreeMap<ResourceName, ReadWriteEntry>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applicable_version(&self) -> Option<&str> {
        self.applicable_version.as_deref()
    }

    pub fn internal_version(&self) -> i32 {
        self.internal_version
    }

    pub(crate) fn set_versions(&mut self, applicable_version: String, internal_version: i32) {
        self.applicable_version = Some(applicable_version);
        self.internal_version = internal_version;
    }

    pub fn asset(&self, name: &str) -> Option<&AssetInfo> {
        self.assets.get(name)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub(crate) fn insert_asset(&mut self, asset: AssetInfo) -> Result<(), ResourceError> {
        if self.assets.contains_key(asset.name()) {
            return Err(ResourceError::fault(format!(
                "asset '{}' is already registered",
                asset.name()
            )));
        }
        self.assets.insert(asset.name().to_string(), asset);
        Ok(())
    }

    pub fn resource(&self, name: &ResourceName) -> Option<&ResourceInfo> {
        self.resources.get(name)
    }

    pub fn resources(&self) -> &BTreeMap<ResourceName, ResourceInfo> {
        &self.resources
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn ready_resource_count(&self) -> usize {
        self.resources.values().filter(|r| r.is_ready()).count()
    }

    /// Insert a resource record. A second record for the same name is a fault.
    pub(crate) fn insert_resource(&mut self, info: ResourceInfo) -> Result<(), ResourceError> {
        if self.resources.contains_key(info.name()) {
            return Err(ResourceError::fault(format!(
                "resource '{}' is already in the table",
                info.name()
            )));
        }
        self.resources.insert(info.name().clone(), info);
        Ok(())
    }

    /// Flip a resource to ready. Returns false if unknown or already ready.
    pub(crate) fn mark_ready(&mut self, name: &ResourceName) -> bool {
        self.resources
            .get_mut(name)
            .map(ResourceInfo::mark_ready)
            .unwrap_or(false)
    }

    pub(crate) fn revoke_ready(&mut self, name: &ResourceName) {
        if let Some(info) = self.resources.get_mut(name) {
            info.revoke_ready();
        }
    }

    pub fn group(&self, name: &str) -> Option<&ResourceGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ResourceGroup> {
        self.groups.values()
    }

    /// Add a resource to a group, creating the group on first use.
    pub(crate) fn add_to_group(&mut self, group: &str, resource: &ResourceName, length: u64, compressed_length: u64) {
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| ResourceGroup::new(group))
            .add(resource.clone(), length, compressed_length);
    }

    pub fn group_collection(&self, names: &[&str]) -> Result<ResourceGroupCollection, ResourceError> {
        ResourceGroupCollection::new(names, &self.groups, &self.resources)
    }

    pub fn read_write_entry(&self, name: &ResourceName) -> Option<&ReadWriteEntry> {
        self.read_write.get(name)
    }

    pub fn read_write_entries(&self) -> &BTreeMap<ResourceName, ReadWriteEntry> {
        &self.read_write
    }

    pub(crate) fn record_read_write(&mut self, name: ResourceName, entry: ReadWriteEntry) {
        self.read_write.insert(name, entry);
    }

    pub(crate) fn forget_read_write(&mut self, name: &ResourceName) -> Option<ReadWriteEntry> {
        self.read_write.remove(name)
    }

    /// Register the assets and group memberships of every resource in
    /// `manifest` that matches the active variant. Every such resource joins
    /// the implicit all-resources group.
    pub(crate) fn add_manifest_layout(
        &mut self,
        manifest: &Manifest,
        active_variant: Option<&str>,
    ) -> Result<(), ResourceError> {
        let mut sizes = BTreeMap::new();
        for resource in &manifest.resources {
            if !resource.name.matches_variant(active_variant) {
                continue;
            }
            sizes.insert(&resource.name, (resource.length, resource.compressed_length));
            self.add_to_group("", &resource.name, resource.length, resource.compressed_length);
            for asset_name in &resource.assets {
                let dependencies = manifest
                    .asset(asset_name)
                    .map(|a| a.dependencies.clone())
                    .unwrap_or_default();
                self.insert_asset(AssetInfo::new(asset_name.clone(), resource.name.clone(), dependencies))?;
            }
        }
        for group in &manifest.groups {
            for member in &group.resources {
                if let Some(&(length, compressed_length)) = sizes.get(member) {
                    self.add_to_group(&group.name, member, length, compressed_length);
                }
            }
        }
        Ok(())
    }

    /// Build the read-write manifest from the current rows.
    pub fn read_write_manifest(&self) -> Manifest {
        read_write_manifest_from(&self.read_write)
    }
}

/// Build a read-write manifest from a set of rows.
pub fn read_write_manifest_from(rows: &BTreeMap<ResourceName, ReadWriteEntry>) -> Manifest {
    let mut manifest = Manifest::new(ManifestKind::ReadWrite);
    for (name, entry) in rows {
        manifest.resources.push(ManifestResource {
            packed_store: entry.packed_store.clone(),
            ..ManifestResource::new(name.clone(), entry.load_type, entry.length, entry.hash)
        });
    }
    manifest
}
