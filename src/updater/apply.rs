//! Extraction of update candidates from a resource pack.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::{restore_stored, ResourceUpdater, UpdaterEvent};
use crate::checker::RemoteSnapshot;
use crate::context::ResourceContext;
use crate::error::ResourceError;
use crate::manifest::read_pack_header;
use crate::model::ResourceName;
use crate::storage::download_sidecar;
use crate::telemetry::{record_apply, ResourceSpan};

/// One resource staged for extraction from a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyInfo {
    pub name: ResourceName,
    /// Target state; the compressed fields describe the pack's copy.
    pub target: RemoteSnapshot,
    /// Offset of the resource inside the pack's data section.
    pub offset: u64,
}

pub(super) struct ApplyBatch {
    pub(super) pack_path: String,
    pub(super) data_offset: u64,
    pub(super) queue: VecDeque<ApplyInfo>,
    pub(super) failed: bool,
}

impl ResourceUpdater {
    /// Stage every candidate found in the pack at `pack_path` (relative to
    /// the read-write tier) for extraction, one per tick.
    pub fn apply_resources(&mut self, ctx: &ResourceContext, pack_path: &str) -> Result<(), ResourceError> {
        self.require_checked()?;
        if self.apply.is_some() {
            return Err(ResourceError::usage("a resource pack is already being applied"));
        }
        if self.group_update.is_some() || !self.while_playing.is_empty() {
            return Err(ResourceError::usage("cannot apply a resource pack while updating"));
        }
        if !self.in_flight.is_empty() {
            return Err(ResourceError::usage(format!(
                "cannot apply a resource pack while {} downloads are in flight",
                self.in_flight.len()
            )));
        }

        let header = read_pack_header(ctx.storage.read_write().as_ref(), pack_path)?;
        let mut queue = VecDeque::new();
        for resource in &header.manifest.resources {
            let Some(candidate) = self.candidates.get(&resource.name) else {
                continue;
            };
            let wanted = &candidate.target;
            if wanted.load_type != resource.load_type || wanted.length != resource.length || wanted.hash != resource.hash
            {
                debug!(resource = %resource.name, "pack copy does not match candidate");
                continue;
            }
            queue.push_back(ApplyInfo {
                name: resource.name.clone(),
                target: RemoteSnapshot {
                    compressed_length: resource.compressed_length,
                    compressed_hash: resource.compressed_hash,
                    ..wanted.clone()
                },
                offset: resource.offset,
            });
        }
        if queue.is_empty() {
            return Err(ResourceError::usage(format!("no resources to apply in '{pack_path}'")));
        }

        let total_length = queue.iter().map(|a| a.target.length).sum();
        info!(pack = pack_path, count = queue.len(), total_length, "applying resource pack");
        self.events.push(UpdaterEvent::ApplyStart {
            pack_path: pack_path.to_string(),
            count: queue.len(),
            total_length,
        });
        self.apply = Some(ApplyBatch {
            pack_path: pack_path.to_string(),
            data_offset: header.data_offset,
            queue,
            failed: false,
        });
        Ok(())
    }

    pub(super) fn apply_next(&mut self, ctx: &mut ResourceContext) {
        let Some(batch) = self.apply.as_mut() else {
            return;
        };
        if let Some(job) = batch.queue.pop_front() {
            let pack_path = batch.pack_path.clone();
            let data_offset = batch.data_offset;
            let _span = ResourceSpan::phase("apply").entered();
            match self.extract(ctx, &pack_path, data_offset, &job) {
                Ok(()) => {
                    debug!(resource = %job.name, "applied");
                    record_apply(true, job.target.compressed_length);
                    self.events.push(UpdaterEvent::ApplySuccess {
                        resource: job.name.clone(),
                        length: job.target.length,
                        compressed_length: job.target.compressed_length,
                    });
                    self.commit_success(ctx, &job.name, &job.target);
                }
                Err(e) => {
                    warn!(resource = %job.name, error = %e, "apply failed");
                    record_apply(false, 0);
                    if let Some(batch) = self.apply.as_mut() {
                        batch.failed = true;
                    }
                    self.events.push(UpdaterEvent::ApplyFailure {
                        resource: job.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.apply.as_ref().is_some_and(|b| b.queue.is_empty()) {
            if let Some(batch) = self.apply.take() {
                self.flush_manifest(ctx);
                info!(pack = %batch.pack_path, success = !batch.failed, "resource pack applied");
                self.events.push(UpdaterEvent::ApplyComplete {
                    pack_path: batch.pack_path,
                    success: !batch.failed,
                });
            }
        }
    }

    fn extract(
        &self,
        ctx: &ResourceContext,
        pack_path: &str,
        data_offset: u64,
        job: &ApplyInfo,
    ) -> Result<(), ResourceError> {
        let read_write = ctx.storage.read_write();
        let transferred = read_write.read_range(
            pack_path,
            data_offset + job.offset,
            job.target.compressed_length as usize,
        )?;
        let stored = restore_stored(&job.name, &job.target, transferred, self.decompressor.as_ref())?;
        ctx.storage
            .write_read_write(&job.name, job.target.packed_store.as_deref(), &stored)?;
        read_write.delete(&download_sidecar(&job.name.full_name()))?;
        Ok(())
    }
}
