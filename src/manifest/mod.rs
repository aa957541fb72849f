//! Manifest model and wire format.
//!
//! Five manifest kinds share one entry schema. Which sections are present on
//! the wire depends on the kind; see [`ManifestKind`] and the codec for the
//! exact layout.

mod codec;
mod pack;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::model::{LoadType, ResourceName};

pub use pack::{build_pack, read_pack_header, PackHeader, PACK_LENGTH_PREFIX};

/// Leading magic bytes of every manifest.
pub const MANIFEST_MAGIC: [u8; 4] = *b"RVMF";

/// Current wire format version.
pub const MANIFEST_FORMAT_VERSION: u16 = 1;

/// Errors produced while decoding or encoding a manifest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("bad manifest magic")]
    BadMagic,

    #[error("unsupported manifest format version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown manifest kind byte {0}")]
    UnknownKind(u8),

    #[error("expected a {expected} manifest, found {actual}")]
    WrongKind {
        expected: ManifestKind,
        actual: ManifestKind,
    },

    #[error("manifest truncated at offset {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid UTF-8 in manifest string at offset {0}")]
    InvalidUtf8(usize),

    #[error("invalid load type byte {0}")]
    InvalidLoadType(u8),

    #[error("{table} index {index} out of range (len {len})")]
    IndexOutOfRange {
        table: &'static str,
        index: u32,
        len: usize,
    },

    #[error("duplicate resource '{0}'")]
    DuplicateResource(String),

    #[error("duplicate asset '{0}'")]
    DuplicateAsset(String),

    #[error("resource '{0}' belongs to more than one packed store")]
    MultiplePackedStores(String),

    #[error("{0} trailing bytes after manifest")]
    TrailingBytes(usize),

    #[error("reference to unknown {table} entry '{name}'")]
    UnknownReference { table: &'static str, name: String },

    #[error("missing {0} section")]
    MissingSection(&'static str),

    #[error("pack data is {actual} bytes, declared {declared}")]
    PackContentLength { declared: u64, actual: u64 },
}

/// The five manifest flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ManifestKind {
    /// Full read-only listing for package (non-updatable) mode.
    Package = 0,
    /// Authoritative remote listing.
    Updatable = 1,
    /// Snapshot of the read-only tier.
    ReadOnly = 2,
    /// Snapshot of the read-write tier.
    ReadWrite = 3,
    /// Header of a resource pack file.
    ResourcePack = 4,
}

impl ManifestKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Package,
            1 => Self::Updatable,
            2 => Self::ReadOnly,
            3 => Self::ReadWrite,
            4 => Self::ResourcePack,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Updatable => "updatable",
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::ResourcePack => "resource-pack",
        }
    }

    pub(crate) fn sections(self) -> Sections {
        let full = matches!(self, Self::Package | Self::Updatable);
        Sections {
            versions: full,
            assets: full,
            compressed: matches!(self, Self::Updatable | Self::ResourcePack),
            pack_offset: self == Self::ResourcePack,
            packed_stores: self != Self::ResourcePack,
            groups: full,
            pack_trailer: self == Self::ResourcePack,
        }
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional sections a manifest kind carries.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sections {
    pub versions: bool,
    /// Asset table plus per-resource asset indices.
    pub assets: bool,
    pub compressed: bool,
    pub pack_offset: bool,
    pub packed_stores: bool,
    pub groups: bool,
    pub pack_trailer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestAsset {
    pub name: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    pub name: ResourceName,
    pub load_type: LoadType,
    pub length: u64,
    pub hash: u32,
    pub compressed_length: u64,
    pub compressed_hash: u32,
    pub packed_store: Option<String>,
    /// Names of the assets living in this resource.
    pub assets: Vec<String>,
    /// Byte offset into a pack's data section.
    pub offset: u64,
}

impl ManifestResource {
    /// An uncompressed loose resource with no assets.
    pub fn new(name: ResourceName, load_type: LoadType, length: u64, hash: u32) -> Self {
        Self {
            name,
            load_type,
            length,
            hash,
            compressed_length: length,
            compressed_hash: hash,
            packed_store: None,
            assets: Vec::new(),
            offset: 0,
        }
    }

    /// True when the stored/transferred form differs from the plaintext form.
    pub fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestGroup {
    pub name: String,
    pub resources: Vec<ResourceName>,
}

/// Pack trailer: total data section length and its CRC-32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackInfo {
    pub content_length: u64,
    pub content_hash: u32,
}

/// A decoded manifest of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub applicable_version: String,
    pub internal_version: i32,
    pub assets: Vec<ManifestAsset>,
    pub resources: Vec<ManifestResource>,
    pub groups: Vec<ManifestGroup>,
    pub pack: Option<PackInfo>,
}

impl Manifest {
    pub fn new(kind: ManifestKind) -> Self {
        Self {
            kind,
            applicable_version: String::new(),
            internal_version: 0,
            assets: Vec::new(),
            resources: Vec::new(),
            groups: Vec::new(),
            pack: None,
        }
    }

    /// Decode a manifest of any kind.
    pub fn decode(bytes: &[u8]) -> Result<Self, ManifestError> {
        codec::decode(bytes)
    }

    /// Decode and require a specific kind.
    pub fn decode_as(bytes: &[u8], expected: ManifestKind) -> Result<Self, ManifestError> {
        let manifest = codec::decode(bytes)?;
        if manifest.kind != expected {
            return Err(ManifestError::WrongKind {
                expected,
                actual: manifest.kind,
            });
        }
        Ok(manifest)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ManifestError> {
        codec::encode(self)
    }

    pub fn resource(&self, name: &ResourceName) -> Option<&ManifestResource> {
        self.resources.iter().find(|r| &r.name == name)
    }

    pub fn asset(&self, name: &str) -> Option<&ManifestAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Distinct packed store names referenced by resources.
    pub fn packed_store_names(&self) -> BTreeSet<&str> {
        self.resources
            .iter()
            .filter_map(|r| r.packed_store.as_deref())
            .collect()
    }

    /// Resources indexed by name.
    pub fn resource_map(&self) -> BTreeMap<&ResourceName, &ManifestResource> {
        self.resources.iter().map(|r| (&r.name, r)).collect()
    }

    pub fn total_length(&self) -> u64 {
        self.resources.iter().map(|r| r.length).sum()
    }

    pub fn total_compressed_length(&self) -> u64 {
        self.resources.iter().map(|r| r.compressed_length).sum()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
