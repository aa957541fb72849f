//! Directory-backed tier storage.
//!
//! Loose files map to paths under the root. A packed store `name` is the
//! directory `<root>/<name>.store/` holding one file per entry (hex-encoded
//! entry name) plus a `limits` file recording its capacity.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{blocks_for, check_capacity, not_found, PackedStore, Storage};

const STORE_SUFFIX: &str = ".store";
const LIMITS_FILE: &str = "limits";
const ENTRY_SUFFIX: &str = ".entry";

/// A tier rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tier-relative path, rejecting anything that escapes the root.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let rel = Path::new(path);
        let clean = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path '{path}' escapes the storage root"),
            ));
        }
        Ok(self.root.join(rel))
    }

    fn store_dir(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid packed store name '{name}'"),
            ));
        }
        Ok(self.root.join(format!("{name}{STORE_SUFFIX}")))
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

impl Storage for LocalStorage {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = fs::File::open(self.resolve(path)?)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        write_file(&self.resolve(path)?, bytes)
    }

    fn delete(&self, path: &str) -> io::Result<bool> {
        ignore_missing(fs::remove_file(self.resolve(path)?))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.resolve(from)?, to)
    }

    fn len(&self, path: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(path)?)?.len())
    }

    fn open_packed_store(&self, name: &str) -> io::Result<Option<Arc<dyn PackedStore>>> {
        let dir = self.store_dir(name)?;
        if !dir.is_dir() {
            return Ok(None);
        }
        let limits = fs::read_to_string(dir.join(LIMITS_FILE))?;
        let mut parts = limits.split_whitespace().map(str::parse::<usize>);
        let (Some(Ok(max_entries)), Some(Ok(max_blocks))) = (parts.next(), parts.next()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("packed store '{name}' has a corrupt limits file"),
            ));
        };
        Ok(Some(Arc::new(LocalPackedStore {
            name: name.to_string(),
            dir,
            max_entries,
            max_blocks,
        })))
    }

    fn create_packed_store(
        &self,
        name: &str,
        max_entries: usize,
        max_blocks: usize,
    ) -> io::Result<Arc<dyn PackedStore>> {
        if let Some(existing) = self.open_packed_store(name)? {
            return Ok(existing);
        }
        let dir = self.store_dir(name)?;
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(LIMITS_FILE), format!("{max_entries} {max_blocks}"))?;
        Ok(Arc::new(LocalPackedStore {
            name: name.to_string(),
            dir,
            max_entries,
            max_blocks,
        }))
    }

    fn delete_packed_store(&self, name: &str) -> io::Result<bool> {
        ignore_missing(fs::remove_dir_all(self.store_dir(name)?))
    }

    fn packed_store_names(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(STORE_SUFFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Packed store as a directory of entry files.
#[derive(Debug)]
pub struct LocalPackedStore {
    name: String,
    dir: PathBuf,
    max_entries: usize,
    max_blocks: usize,
}

impl LocalPackedStore {
    fn entry_path(&self, entry: &str) -> PathBuf {
        self.dir.join(format!("{}{ENTRY_SUFFIX}", hex::encode(entry.as_bytes())))
    }

    fn entries(&self) -> io::Result<Vec<(String, u64)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(encoded) = file_name.to_str().and_then(|n| n.strip_suffix(ENTRY_SUFFIX)) else {
                continue;
            };
            let Some(name) = hex::decode(encoded).ok().and_then(|b| String::from_utf8(b).ok()) else {
                continue;
            };
            out.push((name, entry.metadata()?.len()));
        }
        out.sort();
        Ok(out)
    }
}

impl PackedStore for LocalPackedStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_entry(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_entry(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let entries = self.entries()?;
        let exists = entries.iter().any(|(n, _)| n == name);
        let count = entries.len() + usize::from(!exists);
        let blocks: usize = entries
            .iter()
            .filter(|(n, _)| n != name)
            .map(|(_, len)| blocks_for(*len))
            .sum::<usize>()
            + blocks_for(bytes.len() as u64);
        check_capacity(&self.name, count, blocks, self.max_entries, self.max_blocks)?;
        fs::write(self.entry_path(name), bytes)
    }

    fn delete_entry(&self, name: &str) -> io::Result<bool> {
        ignore_missing(fs::remove_file(self.entry_path(name)))
    }

    fn entry_len(&self, name: &str) -> Option<u64> {
        fs::metadata(self.entry_path(name)).ok().map(|m| m.len())
    }

    fn entry_names(&self) -> Vec<String> {
        self.entries()
            .map(|e| e.into_iter().map(|(n, _)| n).collect())
            .unwrap_or_default()
    }

    fn entry_count(&self) -> usize {
        self.entries().map(|e| e.len()).unwrap_or(0)
    }

    fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn max_blocks(&self) -> usize {
        self.max_blocks
    }
}
