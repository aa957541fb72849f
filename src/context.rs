//! State shared by every component during a tick.

use tracing::debug;

use crate::config::ResourceConfig;
use crate::error::ResourceError;
use crate::model::ResourceTable;
use crate::storage::{ByteFetcher, ResourceStorage};

/// Configuration, the live table, both tiers and the byte fetcher.
///
/// Owned by the manager and lent `&mut` to one component at a time.
pub struct ResourceContext {
    pub config: ResourceConfig,
    pub table: ResourceTable,
    pub storage: ResourceStorage,
    pub fetcher: Box<dyn ByteFetcher>,
}

impl ResourceContext {
    pub fn new(config: ResourceConfig, storage: ResourceStorage, fetcher: Box<dyn ByteFetcher>) -> Self {
        Self {
            config,
            table: ResourceTable::new(),
            storage,
            fetcher,
        }
    }

    /// Rewrite the read-write manifest from the table's rows.
    pub fn regenerate_read_write_manifest(&self) -> Result<(), ResourceError> {
        let manifest = self.table.read_write_manifest();
        let bytes = manifest.encode()?;
        self.storage
            .commit_read_write_manifest(&self.config.read_write_manifest_name, &bytes)?;
        debug!(entries = manifest.resources.len(), "read-write manifest regenerated");
        Ok(())
    }
}
