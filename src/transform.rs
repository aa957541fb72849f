//! Decompression and decryption collaborators.

use crate::hash::{encoded_prefix, xor_in_place, xor_key};
use crate::model::{LoadType, ResourceName};

/// Turns a resource's compressed transfer form into its stored form.
pub trait Decompressor {
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, String>;
}

/// LZ4 block format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Decompressor;

impl Decompressor for Lz4Decompressor {
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
        lz4_flex::block::decompress(input, expected_len).map_err(|e| e.to_string())
    }
}

/// Turns stored bytes of an encrypted load type into plaintext, in place.
pub trait Decryptor {
    fn decrypt(&self, resource: &ResourceName, load_type: LoadType, hash: u32, bytes: &mut [u8]);
}

/// The hash-keyed XOR convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorDecryptor;

impl Decryptor for XorDecryptor {
    fn decrypt(&self, _resource: &ResourceName, load_type: LoadType, hash: u32, bytes: &mut [u8]) {
        let len = encoded_prefix(load_type, bytes.len());
        xor_in_place(bytes, xor_key(hash), len);
    }
}
