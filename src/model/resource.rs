//! Per-resource runtime records.

use super::name::ResourceName;

/// How a resource's bytes are encoded and handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadType {
    /// Plain bytes; the decoder is given the file location.
    FromFile = 0,
    FromMemory = 1,
    FromMemoryQuickDecrypt = 2,
    FromMemoryDecrypt = 3,
    /// Raw binary blob, never loaded as an asset bundle.
    FromBinary = 4,
    FromBinaryQuickDecrypt = 5,
    FromBinaryDecrypt = 6,
}

impl LoadType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::FromFile,
            1 => Self::FromMemory,
            2 => Self::FromMemoryQuickDecrypt,
            3 => Self::FromMemoryDecrypt,
            4 => Self::FromBinary,
            5 => Self::FromBinaryQuickDecrypt,
            6 => Self::FromBinaryDecrypt,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::FromBinary | Self::FromBinaryQuickDecrypt | Self::FromBinaryDecrypt
        )
    }

    pub fn is_quick_decrypt(self) -> bool {
        matches!(self, Self::FromMemoryQuickDecrypt | Self::FromBinaryQuickDecrypt)
    }

    pub fn is_decrypt(self) -> bool {
        matches!(self, Self::FromMemoryDecrypt | Self::FromBinaryDecrypt)
    }

    pub fn is_encrypted(self) -> bool {
        self.is_quick_decrypt() || self.is_decrypt()
    }
}

/// Runtime record for one resource in the live table.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    name: ResourceName,
    packed_store: Option<String>,
    load_type: LoadType,
    length: u64,
    hash: u32,
    compressed_length: u64,
    in_read_only: bool,
    ready: bool,
}

impl ResourceInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: ResourceName,
        packed_store: Option<String>,
        load_type: LoadType,
        length: u64,
        hash: u32,
        compressed_length: u64,
        in_read_only: bool,
        ready: bool,
    ) -> Self {
        Self {
            name,
            packed_store,
            load_type,
            length,
            hash,
            compressed_length,
            in_read_only,
            ready,
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Owning packed store, `None` for a loose file.
    pub fn packed_store(&self) -> Option<&str> {
        self.packed_store.as_deref()
    }

    pub fn uses_packed_store(&self) -> bool {
        self.packed_store.is_some()
    }

    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    pub fn is_binary(&self) -> bool {
        self.load_type.is_binary()
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn compressed_length(&self) -> u64 {
        self.compressed_length
    }

    pub fn in_read_only(&self) -> bool {
        self.in_read_only
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Flip to ready. Returns false if it already was.
    pub(crate) fn mark_ready(&mut self) -> bool {
        let changed = !self.ready;
        self.ready = true;
        changed
    }

    /// Drop readiness after the backing copy was found corrupt.
    pub(crate) fn revoke_ready(&mut self) {
        self.ready = false;
    }
}

/// One row of the read-write manifest image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWriteEntry {
    pub packed_store: Option<String>,
    pub load_type: LoadType,
    pub length: u64,
    pub hash: u32,
}
