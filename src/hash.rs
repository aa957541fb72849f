//! Integrity hashing and the hash-keyed XOR convention.
//!
//! Every declared hash is a CRC-32 (IEEE) over the resource's plaintext.
//! Encrypted load types store bytes XORed with the 4 little-endian bytes of
//! that same hash, over the first [`QUICK_ENCRYPT_LENGTH`] bytes ("quick")
//! or over the whole payload.

use crate::error::IntegrityError;
use crate::model::LoadType;

/// Number of leading bytes covered by the quick XOR flavour.
pub const QUICK_ENCRYPT_LENGTH: usize = 220;

/// CRC-32 of a byte slice.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// The XOR key derived from a declared hash.
pub fn xor_key(hash: u32) -> [u8; 4] {
    hash.to_le_bytes()
}

/// How many leading bytes are XOR-coded for a load type.
pub fn encoded_prefix(load_type: LoadType, len: usize) -> usize {
    if load_type.is_quick_decrypt() {
        len.min(QUICK_ENCRYPT_LENGTH)
    } else if load_type.is_decrypt() {
        len
    } else {
        0
    }
}

/// XOR `bytes[..len]` in place with the key. Applying it twice is a no-op.
pub fn xor_in_place(bytes: &mut [u8], key: [u8; 4], len: usize) {
    let len = len.min(bytes.len());
    for (i, b) in bytes[..len].iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}

/// CRC-32 over the plaintext of stored bytes, undoing the XOR coding that the
/// load type implies without copying the tail.
pub fn plaintext_crc32(stored: &[u8], load_type: LoadType, declared_hash: u32) -> u32 {
    let prefix = encoded_prefix(load_type, stored.len());
    if prefix == 0 {
        return crc32(stored);
    }
    let key = xor_key(declared_hash);
    let mut head = stored[..prefix].to_vec();
    xor_in_place(&mut head, key, prefix);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&head);
    hasher.update(&stored[prefix..]);
    hasher.finalize()
}

/// Verify stored bytes against a declared plaintext length and hash.
pub fn verify_stored(
    resource: &str,
    stored: &[u8],
    load_type: LoadType,
    length: u64,
    hash: u32,
) -> Result<(), IntegrityError> {
    if stored.len() as u64 != length {
        return Err(IntegrityError::Length {
            resource: resource.to_string(),
            expected: length,
            actual: stored.len() as u64,
        });
    }
    let actual = plaintext_crc32(stored, load_type, hash);
    if actual != hash {
        return Err(IntegrityError::Hash {
            resource: resource.to_string(),
            expected: hash,
            actual,
        });
    }
    Ok(())
}
