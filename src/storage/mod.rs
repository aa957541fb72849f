//! Tier storage and packed stores.
//!
//! A [`Storage`] is one tier (read-only base install or read-write overlay):
//! loose files addressed by relative path plus named packed stores. Both the
//! in-memory and directory-backed implementations live here; the engine only
//! talks to the traits.

mod fetch;
mod local;
mod memory;
mod repository;

use std::io;
use std::sync::Arc;

pub use fetch::{ByteFetcher, FetchError, FetchReply, FetchResult, FetchSource, TieredFetcher};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use repository::{download_sidecar, ResourceStorage, StorageLimits};

/// Accounting unit for packed store capacity.
pub const PACKED_STORE_BLOCK_SIZE: u64 = 4096;

/// One storage tier.
pub trait Storage: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Read up to `len` bytes starting at `offset`; shorter at end of file.
    fn read_range(&self, path: &str, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Create or replace a file.
    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Returns whether the file existed.
    fn delete(&self, path: &str) -> io::Result<bool>;

    fn exists(&self, path: &str) -> bool;

    /// Move a file, replacing any file at `to`.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    fn len(&self, path: &str) -> io::Result<u64>;

    fn open_packed_store(&self, name: &str) -> io::Result<Option<Arc<dyn PackedStore>>>;

    /// Create a packed store, or open it if it already exists.
    fn create_packed_store(
        &self,
        name: &str,
        max_entries: usize,
        max_blocks: usize,
    ) -> io::Result<Arc<dyn PackedStore>>;

    /// Returns whether the store existed.
    fn delete_packed_store(&self, name: &str) -> io::Result<bool>;

    fn packed_store_names(&self) -> io::Result<Vec<String>>;
}

/// A container holding many resources addressed by logical name.
///
/// Capacity (entries and blocks) is fixed when the store is created.
pub trait PackedStore: Send + Sync {
    fn name(&self) -> &str;

    fn read_entry(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    fn write_entry(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    /// Returns whether the entry existed.
    fn delete_entry(&self, name: &str) -> io::Result<bool>;

    fn entry_len(&self, name: &str) -> Option<u64>;

    fn entry_names(&self) -> Vec<String>;

    fn entry_count(&self) -> usize;

    fn max_entries(&self) -> usize;

    fn max_blocks(&self) -> usize;
}

/// Blocks occupied by an entry of `len` bytes.
pub(crate) fn blocks_for(len: u64) -> usize {
    len.div_ceil(PACKED_STORE_BLOCK_SIZE) as usize
}

/// Reject a write that would push a store over its limits.
pub(crate) fn check_capacity(
    store: &str,
    entries: usize,
    blocks: usize,
    max_entries: usize,
    max_blocks: usize,
) -> io::Result<()> {
    if entries > max_entries {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("packed store '{store}' is full: {entries} entries exceeds {max_entries}"),
        ));
    }
    if blocks > max_blocks {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("packed store '{store}' is full: {blocks} blocks exceeds {max_blocks}"),
        ));
    }
    Ok(())
}

pub(crate) fn not_found(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{what} not found"))
}
