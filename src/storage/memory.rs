//! In-memory tier storage.
//!
//! Uses parking_lot::Mutex; clones share the same backing maps, so a test or
//! a download collaborator can hold a handle to the same tier as the engine.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{blocks_for, check_capacity, not_found, PackedStore, Storage};

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, Vec<u8>>,
    stores: BTreeMap<String, Arc<MemoryPackedStore>>,
}

/// A tier held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loose file names, sorted.
    pub fn file_names(&self) -> Vec<String> {
        self.inner.lock().files.keys().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let inner = self.inner.lock();
        let bytes = inner.files.get(path).ok_or_else(|| not_found(path))?;
        let start = (offset as usize).min(bytes.len());
        let end = start.saturating_add(len).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.inner.lock().files.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> io::Result<bool> {
        Ok(self.inner.lock().files.remove(path).is_some())
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.lock().files.contains_key(path)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        let bytes = inner.files.remove(from).ok_or_else(|| not_found(from))?;
        inner.files.insert(to.to_string(), bytes);
        Ok(())
    }

    fn len(&self, path: &str) -> io::Result<u64> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| not_found(path))
    }

    fn open_packed_store(&self, name: &str) -> io::Result<Option<Arc<dyn PackedStore>>> {
        Ok(self
            .inner
            .lock()
            .stores
            .get(name)
            .map(|s| s.clone() as Arc<dyn PackedStore>))
    }

    fn create_packed_store(
        &self,
        name: &str,
        max_entries: usize,
        max_blocks: usize,
    ) -> io::Result<Arc<dyn PackedStore>> {
        let mut inner = self.inner.lock();
        let store = inner
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryPackedStore {
                    name: name.to_string(),
                    max_entries,
                    max_blocks,
                    entries: Mutex::new(BTreeMap::new()),
                })
            })
            .clone();
        Ok(store)
    }

    fn delete_packed_store(&self, name: &str) -> io::Result<bool> {
        Ok(self.inner.lock().stores.remove(name).is_some())
    }

    fn packed_store_names(&self) -> io::Result<Vec<String>> {
        Ok(self.inner.lock().stores.keys().cloned().collect())
    }
}

/// Packed store backed by a map.
pub struct MemoryPackedStore {
    name: String,
    max_entries: usize,
    max_blocks: usize,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl PackedStore for MemoryPackedStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_entry(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(name).cloned())
    }

    fn write_entry(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut entries = self.entries.lock();
        let replaced = entries.get(name).map(|b| blocks_for(b.len() as u64)).unwrap_or(0);
        let count = entries.len() + usize::from(!entries.contains_key(name));
        let used: usize = entries.values().map(|b| blocks_for(b.len() as u64)).sum();
        let blocks = used - replaced + blocks_for(bytes.len() as u64);
        check_capacity(&self.name, count, blocks, self.max_entries, self.max_blocks)?;
        entries.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete_entry(&self, name: &str) -> io::Result<bool> {
        Ok(self.entries.lock().remove(name).is_some())
    }

    fn entry_len(&self, name: &str) -> Option<u64> {
        self.entries.lock().get(name).map(|b| b.len() as u64)
    }

    fn entry_names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn max_blocks(&self) -> usize {
        self.max_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.write("x", b"1").unwrap();
        assert_eq!(b.read("x").unwrap(), b"1");
    }

    #[test]
    fn read_range_clamps_at_end() {
        let s = MemoryStorage::new();
        s.write("x", b"hello").unwrap();
        assert_eq!(s.read_range("x", 3, 10).unwrap(), b"lo");
        assert!(s.read_range("x", 9, 1).unwrap().is_empty());
    }

    #[test]
    fn rename_replaces_target() {
        let s = MemoryStorage::new();
        s.write("a", b"new").unwrap();
        s.write("b", b"old").unwrap();
        s.rename("a", "b").unwrap();
        assert!(!s.exists("a"));
        assert_eq!(s.read("b").unwrap(), b"new");
    }

    #[test]
    fn packed_store_enforces_entry_limit() {
        let s = MemoryStorage::new();
        let store = s.create_packed_store("p", 1, 16).unwrap();
        store.write_entry("a", b"1").unwrap();
        store.write_entry("a", b"22").unwrap();
        assert!(store.write_entry("b", b"3").is_err());
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn packed_store_enforces_block_limit() {
        let s = MemoryStorage::new();
        let store = s.create_packed_store("p", 8, 1).unwrap();
        store.write_entry("a", &[0u8; 4096]).unwrap();
        assert!(store.write_entry("b", b"x").is_err());
    }

    #[test]
    fn create_reopens_existing_store() {
        let s = MemoryStorage::new();
        s.create_packed_store("p", 4, 4).unwrap().write_entry("a", b"1").unwrap();
        let again = s.create_packed_store("p", 4, 4).unwrap();
        assert_eq!(again.entry_names(), vec!["a".to_string()]);
        assert!(s.delete_packed_store("p").unwrap());
        assert!(s.open_packed_store("p").unwrap().is_none());
    }
}
