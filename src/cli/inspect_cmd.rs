// Copyright 2024-2026 resvault Contributors
// SPDX-License-Identifier: Apache-2.0

//! `resvault inspect`: decode a manifest file and print its shape.

use serde::Serialize;

use crate::manifest::Manifest;

/// Summary of one decoded manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub kind: &'static str,
    pub applicable_version: String,
    pub internal_version: i32,
    pub asset_count: usize,
    pub resource_count: usize,
    pub group_count: usize,
    pub packed_store_count: usize,
    pub total_length: u64,
    pub total_compressed_length: u64,
}

impl ManifestReport {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            kind: manifest.kind.as_str(),
            applicable_version: manifest.applicable_version.clone(),
            internal_version: manifest.internal_version,
            asset_count: manifest.assets.len(),
            resource_count: manifest.resources.len(),
            group_count: manifest.groups.len(),
            packed_store_count: manifest.packed_store_names().len(),
            total_length: manifest.total_length(),
            total_compressed_length: manifest.total_compressed_length(),
        }
    }
}

/// Returns 0 on success, 1 if the file is missing or not a manifest.
pub fn run_inspect(path: &str, json: bool) -> i32 {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {}: {}", path, e);
            return 1;
        }
    };
    let manifest = match Manifest::decode(&bytes) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            return 1;
        }
    };
    let report = ManifestReport::from_manifest(&manifest);
    if json {
        return match serde_json::to_string_pretty(&report) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                eprintln!("Cannot serialise report: {}", e);
                1
            }
        };
    }
    println!("Kind:               {}", report.kind);
    if !report.applicable_version.is_empty() {
        println!("Applicable version: {}", report.applicable_version);
        println!("Internal version:   {}", report.internal_version);
    }
    println!("Assets:             {}", report.asset_count);
    println!("Resources:          {}", report.resource_count);
    println!("Groups:             {}", report.group_count);
    println!("Packed stores:      {}", report.packed_store_count);
    println!("Total length:       {}", report.total_length);
    println!("Compressed length:  {}", report.total_compressed_length);
    0
}
