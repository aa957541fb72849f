//! Resource-level operations over the two tiers.

use std::sync::Arc;

use tracing::{debug, info};

use super::{not_found, PackedStore, Storage};
use crate::error::ResourceError;
use crate::model::{ResourceInfo, ResourceName};

/// Capacity given to packed stores created on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub max_entries: usize,
    pub max_blocks: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_blocks: 1024 * 1024,
        }
    }
}

/// Path of the transient sidecar a download collaborator may leave behind.
pub fn download_sidecar(path: &str) -> String {
    format!("{path}.download")
}

/// The read-only and read-write tiers plus packed-store housekeeping.
#[derive(Clone)]
pub struct ResourceStorage {
    read_only: Arc<dyn Storage>,
    read_write: Arc<dyn Storage>,
    limits: StorageLimits,
}

impl ResourceStorage {
    pub fn new(read_only: Arc<dyn Storage>, read_write: Arc<dyn Storage>, limits: StorageLimits) -> Self {
        Self {
            read_only,
            read_write,
            limits,
        }
    }

    pub fn read_only(&self) -> &Arc<dyn Storage> {
        &self.read_only
    }

    pub fn read_write(&self) -> &Arc<dyn Storage> {
        &self.read_write
    }

    pub fn limits(&self) -> StorageLimits {
        self.limits
    }

    pub fn tier(&self, in_read_only: bool) -> &dyn Storage {
        if in_read_only {
            self.read_only.as_ref()
        } else {
            self.read_write.as_ref()
        }
    }

    /// Read a resource's stored bytes from a tier.
    pub fn read_stored(
        &self,
        name: &ResourceName,
        packed_store: Option<&str>,
        in_read_only: bool,
    ) -> Result<Vec<u8>, ResourceError> {
        let tier = self.tier(in_read_only);
        let full_name = name.full_name();
        match packed_store {
            Some(store) => {
                let store = open_existing(tier, store)?;
                store
                    .read_entry(&full_name)?
                    .ok_or_else(|| not_found(&full_name).into())
            }
            None => Ok(tier.read(&full_name)?),
        }
    }

    pub fn read_resource(&self, info: &ResourceInfo) -> Result<Vec<u8>, ResourceError> {
        self.read_stored(info.name(), info.packed_store(), info.in_read_only())
    }

    /// Write a resource into the read-write tier, creating its packed store on
    /// demand.
    pub fn write_read_write(
        &self,
        name: &ResourceName,
        packed_store: Option<&str>,
        bytes: &[u8],
    ) -> Result<(), ResourceError> {
        let full_name = name.full_name();
        match packed_store {
            Some(store) => {
                let store = self.read_write.create_packed_store(
                    store,
                    self.limits.max_entries,
                    self.limits.max_blocks,
                )?;
                store.write_entry(&full_name, bytes)?;
            }
            None => self.read_write.write(&full_name, bytes)?,
        }
        Ok(())
    }

    /// Delete a resource from the read-write tier. Returns whether anything
    /// was removed.
    pub fn delete_read_write(&self, name: &ResourceName, packed_store: Option<&str>) -> Result<bool, ResourceError> {
        let full_name = name.full_name();
        let removed = match packed_store {
            Some(store) => match self.read_write.open_packed_store(store)? {
                Some(store) => store.delete_entry(&full_name)?,
                None => false,
            },
            None => self.read_write.delete(&full_name)?,
        };
        debug!(resource = %full_name, removed, "delete read-write resource");
        Ok(removed)
    }

    /// Extract a packed entry into a loose file.
    pub fn move_to_disk(&self, name: &ResourceName, from_store: &str) -> Result<(), ResourceError> {
        let full_name = name.full_name();
        let store = open_existing(self.read_write.as_ref(), from_store)?;
        let bytes = store
            .read_entry(&full_name)?
            .ok_or_else(|| not_found(&full_name))?;
        self.read_write.write(&full_name, &bytes)?;
        store.delete_entry(&full_name)?;
        debug!(resource = %full_name, from = from_store, "moved to disk");
        Ok(())
    }

    /// Pack a loose file into a packed store.
    pub fn move_to_packed_store(&self, name: &ResourceName, to_store: &str) -> Result<(), ResourceError> {
        let full_name = name.full_name();
        let bytes = self.read_write.read(&full_name)?;
        self.write_read_write(name, Some(to_store), &bytes)?;
        self.read_write.delete(&full_name)?;
        debug!(resource = %full_name, to = to_store, "moved to packed store");
        Ok(())
    }

    /// Destroy every read-write packed store with zero entries.
    pub fn remove_empty_packed_stores(&self) -> Result<Vec<String>, ResourceError> {
        let mut removed = Vec::new();
        for name in self.read_write.packed_store_names()? {
            let empty = self
                .read_write
                .open_packed_store(&name)?
                .map(|s| s.entry_count() == 0)
                .unwrap_or(false);
            if empty && self.read_write.delete_packed_store(&name)? {
                removed.push(name);
            }
        }
        if !removed.is_empty() {
            info!(stores = ?removed, "removed empty packed stores");
        }
        Ok(removed)
    }

    /// Swap in a new read-write manifest: write `<name>.tmp`, delete the old
    /// file, rename.
    pub fn commit_read_write_manifest(&self, name: &str, bytes: &[u8]) -> Result<(), ResourceError> {
        let tmp = format!("{name}.tmp");
        self.read_write.write(&tmp, bytes)?;
        self.read_write.delete(name)?;
        self.read_write.rename(&tmp, name)?;
        debug!(manifest = name, bytes = bytes.len(), "read-write manifest committed");
        Ok(())
    }
}

fn open_existing(tier: &dyn Storage, store: &str) -> Result<Arc<dyn PackedStore>, ResourceError> {
    tier.open_packed_store(store)?
        .ok_or_else(|| ResourceError::PackedStore(format!("packed store '{store}' does not exist")))
}
