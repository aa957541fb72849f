//! Per-resource reconciliation record.

use crate::error::ResourceError;
use crate::manifest::ManifestResource;
use crate::model::{LoadType, ResourceName};

/// Target state from the remote manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub packed_store: Option<String>,
    pub load_type: LoadType,
    pub length: u64,
    pub hash: u32,
    pub compressed_length: u64,
    pub compressed_hash: u32,
}

impl From<&ManifestResource> for RemoteSnapshot {
    fn from(r: &ManifestResource) -> Self {
        Self {
            packed_store: r.packed_store.clone(),
            load_type: r.load_type,
            length: r.length,
            hash: r.hash,
            compressed_length: r.compressed_length,
            compressed_hash: r.compressed_hash,
        }
    }
}

impl RemoteSnapshot {
    /// True when the transfer form differs from the stored form.
    pub fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}

/// What a local tier holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub packed_store: Option<String>,
    pub load_type: LoadType,
    pub length: u64,
    pub hash: u32,
}

impl From<&ManifestResource> for LocalSnapshot {
    fn from(r: &ManifestResource) -> Self {
        Self {
            packed_store: r.packed_store.clone(),
            load_type: r.load_type,
            length: r.length,
            hash: r.hash,
        }
    }
}

impl LocalSnapshot {
    fn same_content(&self, remote: &RemoteSnapshot) -> bool {
        self.load_type == remote.load_type && self.length == remote.length && self.hash == remote.hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    /// Not reconciled yet.
    Unknown,
    /// No longer listed remotely.
    Disuse,
    /// Listed for a different variant.
    Unavailable,
    StorageInReadOnly,
    StorageInReadWrite,
    Update,
}

/// Up to three snapshots of one resource and the actions they imply.
#[derive(Debug, Clone)]
pub struct CheckInfo {
    name: ResourceName,
    remote: Option<RemoteSnapshot>,
    read_only: Option<LocalSnapshot>,
    read_write: Option<LocalSnapshot>,
    status: CheckStatus,
    need_remove: bool,
    need_move_to_disk: bool,
    need_move_to_packed_store: bool,
}

impl CheckInfo {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            remote: None,
            read_only: None,
            read_write: None,
            status: CheckStatus::Unknown,
            need_remove: false,
            need_move_to_disk: false,
            need_move_to_packed_store: false,
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn remote(&self) -> Option<&RemoteSnapshot> {
        self.remote.as_ref()
    }

    pub fn read_only(&self) -> Option<&LocalSnapshot> {
        self.read_only.as_ref()
    }

    pub fn read_write(&self) -> Option<&LocalSnapshot> {
        self.read_write.as_ref()
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn need_remove(&self) -> bool {
        self.need_remove
    }

    pub fn need_move_to_disk(&self) -> bool {
        self.need_move_to_disk
    }

    pub fn need_move_to_packed_store(&self) -> bool {
        self.need_move_to_packed_store
    }

    pub fn set_remote(&mut self, snapshot: RemoteSnapshot) -> Result<(), ResourceError> {
        set_once(&mut self.remote, snapshot, &self.name, "remote")
    }

    pub fn set_read_only(&mut self, snapshot: LocalSnapshot) -> Result<(), ResourceError> {
        set_once(&mut self.read_only, snapshot, &self.name, "read-only")
    }

    pub fn set_read_write(&mut self, snapshot: LocalSnapshot) -> Result<(), ResourceError> {
        set_once(&mut self.read_write, snapshot, &self.name, "read-write")
    }

    /// Recompute status and action flags from the snapshots. Pure with respect
    /// to the snapshots, so repeated calls give the same answer.
    pub fn refresh_status(&mut self, active_variant: Option<&str>, ignore_other_variant: bool) {
        self.need_remove = false;
        self.need_move_to_disk = false;
        self.need_move_to_packed_store = false;
        let has_read_write = self.read_write.is_some();

        let Some(remote) = &self.remote else {
            self.status = CheckStatus::Disuse;
            self.need_remove = has_read_write;
            return;
        };

        if let Some(variant) = self.name.variant() {
            if active_variant != Some(variant) {
                self.status = CheckStatus::Unavailable;
                self.need_remove = !ignore_other_variant && has_read_write;
                return;
            }
        }

        if let Some(ro) = &self.read_only {
            if ro.packed_store == remote.packed_store && ro.same_content(remote) {
                self.status = CheckStatus::StorageInReadOnly;
                self.need_remove = has_read_write;
                return;
            }
        }

        if let Some(rw) = &self.read_write {
            if rw.same_content(remote) {
                self.status = CheckStatus::StorageInReadWrite;
                if rw.packed_store != remote.packed_store {
                    self.need_move_to_disk = rw.packed_store.is_some();
                    self.need_move_to_packed_store = remote.packed_store.is_some();
                }
                return;
            }
        }

        self.status = CheckStatus::Update;
        self.need_remove = has_read_write;
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &ResourceName, which: &str) -> Result<(), ResourceError> {
    if slot.is_some() {
        return Err(ResourceError::fault(format!(
            "{which} snapshot of '{name}' set twice"
        )));
    }
    *slot = Some(value);
    Ok(())
}
