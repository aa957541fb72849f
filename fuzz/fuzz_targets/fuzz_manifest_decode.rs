//! Fuzz target for binary manifest decoding.
//!
//! Arbitrary bytes must decode to a manifest or an error, never a panic.
//! A manifest that decodes and re-encodes must decode again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use resvault::manifest::Manifest;

fuzz_target!(|data: &[u8]| {
    let Ok(manifest) = Manifest::decode(data) else {
        return;
    };
    let _ = manifest.total_length();
    if let Ok(bytes) = manifest.encode() {
        assert!(Manifest::decode(&bytes).is_ok());
    }
});
