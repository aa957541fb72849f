//! Binary manifest codec.
//!
//! Layout, all integers little-endian, strings as `[len: u32][utf-8]`:
//!
//! ```text
//! magic "RVMF" | version: u16 | kind: u8
//! [applicable_version: str | internal_version: i32]            versions
//! [asset_count: u32 | (name: str | dep_count: u32 | dep: u32*)*]  assets
//! resource_count: u32 | (
//!     name: str | has_variant: u8 [variant: str] | extension: str |
//!     load_type: u8 | length: u64 | hash: u32 |
//!     [compressed_length: u64 | compressed_hash: u32]          compressed
//!     [asset_count: u32 | asset: u32*]                         assets
//!     [offset: u64]                                            pack_offset
//! )*
//! [store_count: u32 | (name: str | member_count: u32 | member: u32*)*]  packed_stores
//! [group_count: u32 | (name: str | member_count: u32 | member: u32*)*]  groups
//! [content_length: u64 | content_hash: u32]                    pack_trailer
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    Manifest, ManifestAsset, ManifestError, ManifestGroup, ManifestKind, ManifestResource,
    PackInfo, MANIFEST_FORMAT_VERSION, MANIFEST_MAGIC,
};
use crate::model::{LoadType, ResourceName};

/// Little-endian writer over a growable buffer.
#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_len(&mut self, len: usize) {
        self.put_u32(len as u32);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn put_opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.put_u8(1);
                self.put_str(s);
            }
            None => self.put_u8(0),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian reader that reports truncation instead of panicking.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ManifestError> {
        if self.remaining() < n {
            return Err(ManifestError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ManifestError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ManifestError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ManifestError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32, ManifestError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn get_i32(&mut self) -> Result<i32, ManifestError> {
        self.take_array().map(i32::from_le_bytes)
    }

    pub fn get_u64(&mut self) -> Result<u64, ManifestError> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Read a count, capped by the bytes left so a hostile count cannot
    /// trigger a huge allocation.
    pub fn get_count(&mut self, min_item_size: usize) -> Result<usize, ManifestError> {
        let count = self.get_u32()? as usize;
        let max = self.remaining() / min_item_size.max(1);
        if count > max {
            return Err(ManifestError::Truncated {
                offset: self.pos,
                needed: (count - max) * min_item_size.max(1),
            });
        }
        Ok(count)
    }

    pub fn get_str(&mut self) -> Result<String, ManifestError> {
        let len = self.get_u32()? as usize;
        let start = self.pos;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ManifestError::InvalidUtf8(start))
    }

    pub fn get_opt_str(&mut self) -> Result<Option<String>, ManifestError> {
        match self.get_u8()? {
            0 => Ok(None),
            _ => self.get_str().map(Some),
        }
    }

    pub fn get_indices(&mut self, table: &'static str, len: usize) -> Result<Vec<u32>, ManifestError> {
        let count = self.get_count(4)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let index = self.get_u32()?;
            if index as usize >= len {
                return Err(ManifestError::IndexOutOfRange { table, index, len });
            }
            out.push(index);
        }
        Ok(out)
    }
}

struct RawResource {
    resource: ManifestResource,
    asset_indices: Vec<u32>,
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let mut r = ByteReader::new(bytes);
    if r.take_array::<4>()? != MANIFEST_MAGIC {
        return Err(ManifestError::BadMagic);
    }
    let version = r.get_u16()?;
    if version != MANIFEST_FORMAT_VERSION {
        return Err(ManifestError::UnsupportedVersion(version));
    }
    let kind_byte = r.get_u8()?;
    let kind = ManifestKind::from_u8(kind_byte).ok_or(ManifestError::UnknownKind(kind_byte))?;
    let sections = kind.sections();
    let mut manifest = Manifest::new(kind);

    if sections.versions {
        manifest.applicable_version = r.get_str()?;
        manifest.internal_version = r.get_i32()?;
    }

    let mut raw_assets: Vec<(String, Vec<u32>)> = Vec::new();
    if sections.assets {
        let count = r.get_count(8)?;
        raw_assets.reserve(count);
        let mut names = HashSet::with_capacity(count);
        for _ in 0..count {
            let name = r.get_str()?;
            if !names.insert(name.clone()) {
                return Err(ManifestError::DuplicateAsset(name));
            }
            let dep_count = r.get_count(4)?;
            let mut deps = Vec::with_capacity(dep_count);
            for _ in 0..dep_count {
                deps.push(r.get_u32()?);
            }
            raw_assets.push((name, deps));
        }
        for (_, deps) in &raw_assets {
            for &index in deps {
                if index as usize >= count {
                    return Err(ManifestError::IndexOutOfRange {
                        table: "asset",
                        index,
                        len: count,
                    });
                }
            }
        }
    }

    let resource_count = r.get_count(22)?;
    let mut raw_resources = Vec::with_capacity(resource_count);
    let mut seen = HashSet::with_capacity(resource_count);
    for _ in 0..resource_count {
        let name = r.get_str()?;
        let variant = r.get_opt_str()?;
        let extension = r.get_str()?;
        let load_type_byte = r.get_u8()?;
        let load_type =
            LoadType::from_u8(load_type_byte).ok_or(ManifestError::InvalidLoadType(load_type_byte))?;
        let length = r.get_u64()?;
        let hash = r.get_u32()?;
        let mut resource = ManifestResource::new(ResourceName::new(name, variant, extension), load_type, length, hash);
        if !seen.insert(resource.name.clone()) {
            return Err(ManifestError::DuplicateResource(resource.name.full_name().to_string()));
        }
        if sections.compressed {
            resource.compressed_length = r.get_u64()?;
            resource.compressed_hash = r.get_u32()?;
        }
        let asset_indices = if sections.assets {
            r.get_indices("asset", raw_assets.len())?
        } else {
            Vec::new()
        };
        if sections.pack_offset {
            resource.offset = r.get_u64()?;
        }
        raw_resources.push(RawResource {
            resource,
            asset_indices,
        });
    }

    if sections.packed_stores {
        let count = r.get_count(8)?;
        for _ in 0..count {
            let store = r.get_str()?;
            for index in r.get_indices("resource", raw_resources.len())? {
                let res = &mut raw_resources[index as usize].resource;
                if res.packed_store.is_some() {
                    return Err(ManifestError::MultiplePackedStores(res.name.full_name().to_string()));
                }
                res.packed_store = Some(store.clone());
            }
        }
    }

    if sections.groups {
        let count = r.get_count(8)?;
        for _ in 0..count {
            let name = r.get_str()?;
            let resources = r
                .get_indices("resource", raw_resources.len())?
                .into_iter()
                .map(|i| raw_resources[i as usize].resource.name.clone())
                .collect();
            manifest.groups.push(ManifestGroup { name, resources });
        }
    }

    if sections.pack_trailer {
        manifest.pack = Some(PackInfo {
            content_length: r.get_u64()?,
            content_hash: r.get_u32()?,
        });
    }

    if r.remaining() != 0 {
        return Err(ManifestError::TrailingBytes(r.remaining()));
    }

    // Each asset lives in exactly one resource.
    let mut owned = vec![false; raw_assets.len()];
    for raw in &mut raw_resources {
        for &index in &raw.asset_indices {
            let slot = &mut owned[index as usize];
            if *slot {
                return Err(ManifestError::DuplicateAsset(raw_assets[index as usize].0.clone()));
            }
            *slot = true;
            raw.resource.assets.push(raw_assets[index as usize].0.clone());
        }
    }

    let asset_names: Vec<String> = raw_assets.iter().map(|(n, _)| n.clone()).collect();
    manifest.assets = raw_assets
        .into_iter()
        .map(|(name, deps)| ManifestAsset {
            name,
            dependencies: deps.into_iter().map(|i| asset_names[i as usize].clone()).collect(),
        })
        .collect();
    manifest.resources = raw_resources.into_iter().map(|r| r.resource).collect();
    Ok(manifest)
}

pub(crate) fn encode(manifest: &Manifest) -> Result<Vec<u8>, ManifestError> {
    let sections = manifest.kind.sections();
    let mut w = ByteWriter::new();
    for b in MANIFEST_MAGIC {
        w.put_u8(b);
    }
    w.put_u16(MANIFEST_FORMAT_VERSION);
    w.put_u8(manifest.kind as u8);

    if sections.versions {
        w.put_str(&manifest.applicable_version);
        w.put_i32(manifest.internal_version);
    }

    let asset_index: HashMap<&str, u32> = manifest
        .assets
        .iter()
        .enumerate()
        .map(|(i, a)| (a.name.as_str(), i as u32))
        .collect();
    let lookup_asset = |name: &str| {
        asset_index
            .get(name)
            .copied()
            .ok_or_else(|| ManifestError::UnknownReference {
                table: "asset",
                name: name.to_string(),
            })
    };

    if sections.assets {
        w.put_len(manifest.assets.len());
        for asset in &manifest.assets {
            w.put_str(&asset.name);
            w.put_len(asset.dependencies.len());
            for dep in &asset.dependencies {
                w.put_u32(lookup_asset(dep)?);
            }
        }
    }

    let mut resource_index: HashMap<&ResourceName, u32> = HashMap::new();
    w.put_len(manifest.resources.len());
    for (i, res) in manifest.resources.iter().enumerate() {
        if resource_index.insert(&res.name, i as u32).is_some() {
            return Err(ManifestError::DuplicateResource(res.name.full_name().to_string()));
        }
        w.put_str(res.name.name());
        w.put_opt_str(res.name.variant());
        w.put_str(res.name.extension());
        w.put_u8(res.load_type.as_u8());
        w.put_u64(res.length);
        w.put_u32(res.hash);
        if sections.compressed {
            w.put_u64(res.compressed_length);
            w.put_u32(res.compressed_hash);
        }
        if sections.assets {
            w.put_len(res.assets.len());
            for asset in &res.assets {
                w.put_u32(lookup_asset(asset)?);
            }
        }
        if sections.pack_offset {
            w.put_u64(res.offset);
        }
    }

    if sections.packed_stores {
        let mut stores: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (i, res) in manifest.resources.iter().enumerate() {
            if let Some(store) = res.packed_store.as_deref() {
                stores.entry(store).or_default().push(i as u32);
            }
        }
        w.put_len(stores.len());
        for (name, members) in stores {
            w.put_str(name);
            w.put_len(members.len());
            for m in members {
                w.put_u32(m);
            }
        }
    }

    if sections.groups {
        w.put_len(manifest.groups.len());
        for group in &manifest.groups {
            w.put_str(&group.name);
            w.put_len(group.resources.len());
            for name in &group.resources {
                let index = resource_index.get(name).copied().ok_or_else(|| {
                    ManifestError::UnknownReference {
                        table: "resource",
                        name: name.full_name().to_string(),
                    }
                })?;
                w.put_u32(index);
            }
        }
    }

    if sections.pack_trailer {
        let pack = manifest.pack.ok_or(ManifestError::MissingSection("pack trailer"))?;
        w.put_u64(pack.content_length);
        w.put_u32(pack.content_hash);
    }

    Ok(w.into_inner())
}
