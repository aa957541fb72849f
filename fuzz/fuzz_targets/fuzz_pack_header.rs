//! Fuzz target for resource pack headers read through a storage tier.

#![no_main]

use libfuzzer_sys::fuzz_target;
use resvault::manifest::read_pack_header;
use resvault::storage::{MemoryStorage, Storage};

fuzz_target!(|data: &[u8]| {
    let storage = MemoryStorage::new();
    if storage.write("fuzz.pack", data).is_ok() {
        let _ = read_pack_header(&storage, "fuzz.pack");
    }
});
