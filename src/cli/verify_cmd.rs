// Copyright 2024-2026 resvault Contributors
// SPDX-License-Identifier: Apache-2.0

//! `resvault verify`: offline integrity scrub of a read-write directory.
//!
//! Corrupt resources are deleted and the read-write manifest is rewritten,
//! exactly as an in-process verification pass would do.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::{self, ResourceConfig};
use crate::context::ResourceContext;
use crate::storage::{LocalStorage, MemoryStorage, ResourceStorage, Storage, TieredFetcher};
use crate::verifier::{ResourceVerifier, VerifierEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub verified: usize,
    pub verified_bytes: u64,
    pub failures: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verify every resource listed in `dir`'s read-write manifest.
pub async fn verify_directory(dir: &str, config: ResourceConfig) -> Result<VerifyReport, String> {
    if !std::path::Path::new(dir).is_dir() {
        return Err(format!("{} is not a directory", dir));
    }
    let read_only: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let read_write: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir));
    let storage = ResourceStorage::new(read_only.clone(), read_write.clone(), config.storage_limits());
    let fetcher = Box::new(TieredFetcher::new(read_only, read_write));
    let budget = config.verify_bytes_per_tick;
    let mut ctx = ResourceContext::new(config, storage, fetcher);

    let mut verifier = ResourceVerifier::new();
    verifier
        .verify_resources(&ctx, budget, false)
        .map_err(|e| e.to_string())?;

    let mut report = VerifyReport::default();
    while !verifier.is_complete() {
        for event in verifier.tick(&mut ctx) {
            match event {
                VerifierEvent::Start { count, total_length } => {
                    info!(count, total_length, "verification started");
                }
                VerifierEvent::Success { length, .. } => {
                    report.verified += 1;
                    report.verified_bytes += length;
                }
                VerifierEvent::Failure { resource, error } => {
                    report.failures.push(format!("{}: {}", resource, error));
                }
                VerifierEvent::Complete { .. } => {}
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(report)
}

/// Returns 0 when every resource verified, 1 otherwise.
pub async fn run_verify(dir: &str) -> i32 {
    match verify_directory(dir, config::load()).await {
        Ok(report) => {
            println!(
                "Verified {} resources ({} bytes)",
                report.verified, report.verified_bytes
            );
            for failure in &report.failures {
                println!("  FAILED {}", failure);
            }
            if report.is_clean() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Verification failed: {}", e);
            1
        }
    }
}
