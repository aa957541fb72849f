//! Resource verifier.
//!
//! Cooperative integrity scrub of the read-write tier. The read-write
//! manifest is fetched, then each tick verifies resources (length and
//! plaintext hash) until the byte budget is spent. A resource that fails is
//! deleted and dropped from the list; when the pass ends with failures the
//! read-write manifest is rewritten from the survivors.
//!
//! A missing or unreadable manifest completes immediately with success.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::context::ResourceContext;
use crate::error::ResourceError;
use crate::hash::verify_stored;
use crate::manifest::{Manifest, ManifestKind};
use crate::model::{read_write_manifest_from, ReadWriteEntry, ResourceName};
use crate::reply::ReplyQueue;
use crate::storage::{FetchResult, FetchSource};
use crate::telemetry::{record_verify, ResourceSpan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierEvent {
    Start { count: usize, total_length: u64 },
    Success { resource: ResourceName, length: u64 },
    Failure { resource: ResourceName, error: String },
    Complete { success: bool },
}

enum VerifyState {
    Idle,
    Loading,
    Verifying {
        rows: Vec<(ResourceName, ReadWriteEntry)>,
        index: usize,
        failed: bool,
    },
    Done,
}

pub struct ResourceVerifier {
    replies: ReplyQueue<FetchResult>,
    state: VerifyState,
    bytes_per_tick: u64,
}

impl ResourceVerifier {
    pub fn new() -> Self {
        Self {
            replies: ReplyQueue::new(),
            state: VerifyState::Idle,
            bytes_per_tick: 1,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, VerifyState::Loading | VerifyState::Verifying { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, VerifyState::Done)
    }

    /// Resources still queued for verification.
    pub fn remaining(&self) -> usize {
        match &self.state {
            VerifyState::Verifying { rows, index, .. } => rows.len() - index,
            _ => 0,
        }
    }

    /// Start a verification pass. Refused once checking has started, since
    /// the checker's view of the read-write tier would go stale.
    pub fn verify_resources(
        &mut self,
        ctx: &ResourceContext,
        bytes_per_tick: u64,
        checking_started: bool,
    ) -> Result<(), ResourceError> {
        if checking_started {
            return Err(ResourceError::usage("cannot verify after checking has started"));
        }
        if self.is_running() {
            return Err(ResourceError::usage("verification is already running"));
        }
        self.bytes_per_tick = bytes_per_tick.max(1);
        self.state = VerifyState::Loading;
        info!(bytes_per_tick = self.bytes_per_tick, "verifying read-write resources");
        ctx.fetcher.fetch(
            FetchSource::ReadWrite(ctx.config.read_write_manifest_name.clone()),
            self.replies.fresh(),
        );
        Ok(())
    }

    pub fn tick(&mut self, ctx: &mut ResourceContext) -> Vec<VerifierEvent> {
        let mut events = Vec::new();
        if matches!(self.state, VerifyState::Loading) {
            let Some((_, result)) = self.replies.drain().pop() else {
                return events;
            };
            match load_rows(result) {
                Some(rows) => {
                    let total_length = rows.iter().map(|(_, e)| e.length).sum();
                    events.push(VerifierEvent::Start {
                        count: rows.len(),
                        total_length,
                    });
                    self.state = VerifyState::Verifying {
                        rows,
                        index: 0,
                        failed: false,
                    };
                }
                None => {
                    self.state = VerifyState::Done;
                    events.push(VerifierEvent::Complete { success: true });
                    return events;
                }
            }
        }

        let VerifyState::Verifying { rows, index, failed } = &mut self.state else {
            return events;
        };

        let _span = ResourceSpan::phase("verify").entered();
        let mut spent = 0u64;
        while *index < rows.len() && spent < self.bytes_per_tick {
            let (name, entry) = &rows[*index];
            spent += entry.length.max(1);
            match verify_one(ctx, name, entry) {
                Ok(()) => {
                    record_verify(true, entry.length);
                    events.push(VerifierEvent::Success {
                        resource: name.clone(),
                        length: entry.length,
                    });
                    *index += 1;
                }
                Err(e) => {
                    warn!(resource = %name, error = %e, "verification failed");
                    record_verify(false, entry.length);
                    if let Err(del) = ctx.storage.delete_read_write(name, entry.packed_store.as_deref()) {
                        warn!(resource = %name, error = %del, "failed to delete corrupt resource");
                    }
                    events.push(VerifierEvent::Failure {
                        resource: name.clone(),
                        error: e.to_string(),
                    });
                    rows.remove(*index);
                    *failed = true;
                }
            }
        }

        if *index < rows.len() {
            return events;
        }
        let success = !*failed;
        if !success {
            let survivors: BTreeMap<ResourceName, ReadWriteEntry> = rows.drain(..).collect();
            if let Err(e) = commit_survivors(ctx, &survivors) {
                warn!(error = %e, "failed to rewrite read-write manifest");
            }
        }
        info!(success, "verification complete");
        self.state = VerifyState::Done;
        events.push(VerifierEvent::Complete { success });
        events
    }
}

impl Default for ResourceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn load_rows(result: FetchResult) -> Option<Vec<(ResourceName, ReadWriteEntry)>> {
    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "no read-write manifest to verify");
            return None;
        }
    };
    let manifest = match Manifest::decode_as(&bytes, ManifestKind::ReadWrite) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "read-write manifest is invalid, nothing to verify");
            return None;
        }
    };
    Some(
        manifest
            .resources
            .into_iter()
            .map(|r| {
                (
                    r.name,
                    ReadWriteEntry {
                        packed_store: r.packed_store,
                        load_type: r.load_type,
                        length: r.length,
                        hash: r.hash,
                    },
                )
            })
            .collect(),
    )
}

fn verify_one(ctx: &ResourceContext, name: &ResourceName, entry: &ReadWriteEntry) -> Result<(), ResourceError> {
    let stored = ctx
        .storage
        .read_stored(name, entry.packed_store.as_deref(), false)?;
    verify_stored(&name.full_name(), &stored, entry.load_type, entry.length, entry.hash)?;
    Ok(())
}

fn commit_survivors(
    ctx: &ResourceContext,
    survivors: &BTreeMap<ResourceName, ReadWriteEntry>,
) -> Result<(), ResourceError> {
    let bytes = read_write_manifest_from(survivors).encode()?;
    ctx.storage
        .commit_read_write_manifest(&ctx.config.read_write_manifest_name, &bytes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ResourceConfig;
    use crate::hash::crc32;
    use crate::model::LoadType;
    use crate::storage::{MemoryStorage, ResourceStorage, Storage, TieredFetcher};

    fn context(rw: &MemoryStorage) -> ResourceContext {
        let config = ResourceConfig::default();
        let ro: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let rw: Arc<dyn Storage> = Arc::new(rw.clone());
        let storage = ResourceStorage::new(ro.clone(), rw.clone(), config.storage_limits());
        ResourceContext::new(config, storage, Box::new(TieredFetcher::new(ro, rw)))
    }

    fn publish(ctx: &ResourceContext, rw: &MemoryStorage, files: &[(&str, &[u8])]) {
        let rows: BTreeMap<ResourceName, ReadWriteEntry> = files
            .iter()
            .map(|(name, bytes)| {
                rw.write(&format!("{name}.dat"), bytes).unwrap();
                (
                    ResourceName::plain(*name, "dat"),
                    ReadWriteEntry {
                        packed_store: None,
                        load_type: LoadType::FromMemory,
                        length: bytes.len() as u64,
                        hash: crc32(bytes),
                    },
                )
            })
            .collect();
        rw.write(
            &ctx.config.read_write_manifest_name,
            &read_write_manifest_from(&rows).encode().unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn missing_manifest_completes_successfully() {
        let rw = MemoryStorage::new();
        let mut ctx = context(&rw);
        let mut verifier = ResourceVerifier::new();
        verifier.verify_resources(&ctx, 1024, false).unwrap();
        assert_eq!(verifier.tick(&mut ctx), vec![VerifierEvent::Complete { success: true }]);
        assert!(verifier.is_complete());
    }

    #[test]
    fn byte_budget_spreads_work_across_ticks() {
        let rw = MemoryStorage::new();
        let mut ctx = context(&rw);
        publish(&ctx, &rw, &[("a", b"aaaa"), ("b", b"bbbb")]);

        let mut verifier = ResourceVerifier::new();
        verifier.verify_resources(&ctx, 4, false).unwrap();
        let first = verifier.tick(&mut ctx);
        assert_eq!(first[0], VerifierEvent::Start { count: 2, total_length: 8 });
        assert_eq!(first.len(), 2);
        assert_eq!(verifier.remaining(), 1);

        let second = verifier.tick(&mut ctx);
        assert_eq!(second.last(), Some(&VerifierEvent::Complete { success: true }));
        assert!(rw.exists("a.dat") && rw.exists("b.dat"));
    }

    #[test]
    fn corrupt_resource_is_deleted_and_dropped() {
        let rw = MemoryStorage::new();
        let mut ctx = context(&rw);
        publish(&ctx, &rw, &[("good", b"good"), ("bad", b"bad!")]);
        rw.write("bad.dat", b"BAD!").unwrap();

        let mut verifier = ResourceVerifier::new();
        verifier.verify_resources(&ctx, u64::MAX, false).unwrap();
        let events = verifier.tick(&mut ctx);
        assert!(events
            .iter()
            .any(|e| matches!(e, VerifierEvent::Failure { resource, .. } if resource.name() == "bad")));
        assert_eq!(events.last(), Some(&VerifierEvent::Complete { success: false }));
        assert!(!rw.exists("bad.dat"));

        let manifest = Manifest::decode(&rw.read(&ctx.config.read_write_manifest_name).unwrap()).unwrap();
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.resources[0].name.name(), "good");
    }

    #[test]
    fn refused_after_check_or_while_running() {
        let rw = MemoryStorage::new();
        let ctx = context(&rw);
        let mut verifier = ResourceVerifier::new();
        assert!(verifier.verify_resources(&ctx, 1, true).unwrap_err().is_usage());
        verifier.verify_resources(&ctx, 1, false).unwrap();
        assert!(verifier.verify_resources(&ctx, 1, false).unwrap_err().is_usage());
    }
}
