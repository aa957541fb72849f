//! Resource pack files.
//!
//! A pack is `[manifest_len: u32 LE][ResourcePack manifest][data]`. Resource
//! offsets in the manifest are relative to the start of `data`.

use super::{Manifest, ManifestError, ManifestKind, ManifestResource, PackInfo};
use crate::error::ResourceError;
use crate::hash::crc32;
use crate::storage::Storage;

/// Size of the leading manifest length field.
pub const PACK_LENGTH_PREFIX: u64 = 4;

/// Decoded pack header.
#[derive(Debug, Clone)]
pub struct PackHeader {
    pub manifest: Manifest,
    /// Absolute offset of the data section inside the pack file.
    pub data_offset: u64,
}

impl PackHeader {
    pub fn content_length(&self) -> u64 {
        self.manifest.pack.map(|p| p.content_length).unwrap_or(0)
    }
}

/// Read and validate the header of a pack stored at `path`.
pub fn read_pack_header(storage: &dyn Storage, path: &str) -> Result<PackHeader, ResourceError> {
    let prefix = storage.read_range(path, 0, PACK_LENGTH_PREFIX as usize)?;
    let prefix: [u8; 4] = prefix
        .as_slice()
        .try_into()
        .map_err(|_| ManifestError::Truncated { offset: 0, needed: 4 })?;
    let manifest_len = u32::from_le_bytes(prefix) as u64;
    let manifest_bytes = storage.read_range(path, PACK_LENGTH_PREFIX, manifest_len as usize)?;
    if manifest_bytes.len() as u64 != manifest_len {
        return Err(ManifestError::Truncated {
            offset: PACK_LENGTH_PREFIX as usize + manifest_bytes.len(),
            needed: (manifest_len - manifest_bytes.len() as u64) as usize,
        }
        .into());
    }
    let manifest = Manifest::decode_as(&manifest_bytes, ManifestKind::ResourcePack)?;
    let data_offset = PACK_LENGTH_PREFIX + manifest_len;
    let header = PackHeader {
        manifest,
        data_offset,
    };

    let total = storage.len(path)?;
    let data_len = total.saturating_sub(data_offset);
    if data_len != header.content_length() {
        return Err(ManifestError::PackContentLength {
            declared: header.content_length(),
            actual: data_len,
        }
        .into());
    }
    Ok(header)
}

/// Assemble a pack from resources and their stored (possibly compressed)
/// bytes. Offsets and the trailer are filled in.
pub fn build_pack(entries: Vec<(ManifestResource, Vec<u8>)>) -> Result<Vec<u8>, ManifestError> {
    let mut manifest = Manifest::new(ManifestKind::ResourcePack);
    let mut data = Vec::new();
    for (mut resource, bytes) in entries {
        resource.offset = data.len() as u64;
        data.extend_from_slice(&bytes);
        manifest.resources.push(resource);
    }
    manifest.pack = Some(PackInfo {
        content_length: data.len() as u64,
        content_hash: crc32(&data),
    });
    let header = manifest.encode()?;
    let mut out = Vec::with_capacity(4 + header.len() + data.len());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&data);
    Ok(out)
}
