//! Resource groups and group collections.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::name::ResourceName;
use super::resource::ResourceInfo;
use crate::error::ResourceError;

/// Readiness snapshot of a group or collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupProgress {
    pub total_count: usize,
    pub ready_count: usize,
    pub total_length: u64,
    pub ready_length: u64,
    pub total_compressed_length: u64,
    pub ready_compressed_length: u64,
}

impl GroupProgress {
    pub fn is_ready(&self) -> bool {
        self.ready_count == self.total_count
    }

    /// Ready fraction by plaintext length; an empty group counts as done.
    pub fn progress(&self) -> f32 {
        if self.total_length == 0 {
            return 1.0;
        }
        self.ready_length as f32 / self.total_length as f32
    }
}

/// A named subset of resources. The empty name is the "all resources" group.
#[derive(Debug, Clone, Default)]
pub struct ResourceGroup {
    name: String,
    members: BTreeSet<ResourceName>,
    total_length: u64,
    total_compressed_length: u64,
}

impl ResourceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    pub fn contains(&self, resource: &ResourceName) -> bool {
        self.members.contains(resource)
    }

    pub fn members(&self) -> impl Iterator<Item = &ResourceName> {
        self.members.iter()
    }

    pub fn total_count(&self) -> usize {
        self.members.len()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn total_compressed_length(&self) -> u64 {
        self.total_compressed_length
    }

    /// Add a member and fold its sizes into the cached totals. Adding an
    /// existing member is a no-op.
    pub(crate) fn add(&mut self, resource: ResourceName, length: u64, compressed_length: u64) {
        if self.members.insert(resource) {
            self.total_length += length;
            self.total_compressed_length += compressed_length;
        }
    }

    pub fn progress(&self, resources: &BTreeMap<ResourceName, ResourceInfo>) -> GroupProgress {
        progress_of(self.members.iter(), self.total_length, self.total_compressed_length, resources)
    }
}

fn progress_of<'a>(
    members: impl Iterator<Item = &'a ResourceName>,
    total_length: u64,
    total_compressed_length: u64,
    resources: &BTreeMap<ResourceName, ResourceInfo>,
) -> GroupProgress {
    let mut p = GroupProgress {
        total_count: 0,
        ready_count: 0,
        total_length,
        ready_length: 0,
        total_compressed_length,
        ready_compressed_length: 0,
    };
    for name in members {
        p.total_count += 1;
        if let Some(info) = resources.get(name).filter(|i| i.is_ready()) {
            p.ready_count += 1;
            p.ready_length += info.length();
            p.ready_compressed_length += info.compressed_length();
        }
    }
    p
}

/// An immutable union of named groups, for bulk progress queries.
#[derive(Debug, Clone)]
pub struct ResourceGroupCollection {
    group_names: Vec<String>,
    members: BTreeSet<ResourceName>,
    total_length: u64,
    total_compressed_length: u64,
}

impl ResourceGroupCollection {
    /// Build from group names; fails on an unknown or repeated name.
    pub fn new(
        names: &[&str],
        groups: &BTreeMap<String, ResourceGroup>,
        resources: &BTreeMap<ResourceName, ResourceInfo>,
    ) -> Result<Self, ResourceError> {
        if names.is_empty() {
            return Err(ResourceError::usage("resource group collection needs at least one group"));
        }
        let mut seen = BTreeSet::new();
        let mut members = BTreeSet::new();
        for &name in names {
            if !seen.insert(name) {
                return Err(ResourceError::usage(format!(
                    "resource group '{name}' listed twice"
                )));
            }
            let group = groups.get(name).ok_or_else(|| {
                ResourceError::usage(format!("resource group '{name}' does not exist"))
            })?;
            members.extend(group.members().cloned());
        }

        let mut total_length = 0;
        let mut total_compressed_length = 0;
        for m in &members {
            if let Some(info) = resources.get(m) {
                total_length += info.length();
                total_compressed_length += info.compressed_length();
            }
        }

        Ok(Self {
            group_names: names.iter().map(|s| s.to_string()).collect(),
            members,
            total_length,
            total_compressed_length,
        })
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn total_count(&self) -> usize {
        self.members.len()
    }

    pub fn progress(&self, resources: &BTreeMap<ResourceName, ResourceInfo>) -> GroupProgress {
        progress_of(self.members.iter(), self.total_length, self.total_compressed_length, resources)
    }
}
