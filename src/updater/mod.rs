//! Resource updater.
//!
//! Brings update candidates found by the checker into the read-write tier,
//! either by extracting them from a resource pack already on disk or by
//! downloading them through the [`DownloadManager`]. Every resource is
//! verified before it is written and marked ready.
//!
//! The read-write manifest is regenerated whenever the compressed bytes
//! committed since the last rewrite reach `generate_manifest_threshold`,
//! when a batch drains, and when the last candidate is done. A crash loses at
//! most that much unrecorded progress.
//!
//! Pack application excludes group and ad-hoc updates and vice versa;
//! starting one while the other is active is a usage error.

mod apply;
mod network;

pub use apply::ApplyInfo;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checker::RemoteSnapshot;
use crate::context::ResourceContext;
use crate::download::{DownloadEvent, DownloadManager};
use crate::error::{IntegrityError, ResourceError};
use crate::hash::{crc32, verify_stored};
use crate::model::{ReadWriteEntry, ResourceName};
use crate::reply::ReplyQueue;
use crate::transform::Decompressor;

/// A resource waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    name: ResourceName,
    target: RemoteSnapshot,
    downloading: bool,
    retry_count: usize,
}

impl UpdateInfo {
    pub fn new(name: ResourceName, target: RemoteSnapshot) -> Self {
        Self {
            name,
            target,
            downloading: false,
            retry_count: 0,
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn target(&self) -> &RemoteSnapshot {
        &self.target
    }

    /// Download destination relative to the read-write tier.
    pub fn path(&self) -> Arc<str> {
        self.name.full_name()
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdaterEvent {
    ApplyStart {
        pack_path: String,
        count: usize,
        total_length: u64,
    },
    ApplySuccess {
        resource: ResourceName,
        length: u64,
        compressed_length: u64,
    },
    ApplyFailure {
        resource: ResourceName,
        error: String,
    },
    ApplyComplete {
        pack_path: String,
        success: bool,
    },
    UpdateStart {
        resource: ResourceName,
        uri: String,
    },
    UpdateChanged {
        resource: ResourceName,
        downloaded: u64,
    },
    UpdateSuccess {
        resource: ResourceName,
        length: u64,
        compressed_length: u64,
    },
    /// `retry_count` is the count before this failure; the resource was
    /// dropped when it is not below `max_retries`.
    UpdateFailure {
        resource: ResourceName,
        retry_count: usize,
        max_retries: usize,
        error: String,
    },
    UpdateGroupComplete {
        group: String,
        success: bool,
    },
    UpdateAllComplete,
}

impl UpdaterEvent {
    /// True for an `UpdateFailure` after which the resource is not retried.
    pub fn is_final_failure(&self) -> bool {
        matches!(self, Self::UpdateFailure { retry_count, max_retries, .. } if retry_count >= max_retries)
    }
}

struct GroupUpdate {
    group: String,
    waiting: Vec<ResourceName>,
    failed: bool,
}

pub struct ResourceUpdater {
    candidates: BTreeMap<ResourceName, UpdateInfo>,
    apply: Option<apply::ApplyBatch>,
    group_update: Option<GroupUpdate>,
    while_playing: BTreeSet<ResourceName>,
    downloads: ReplyQueue<DownloadEvent>,
    in_flight: HashMap<u64, ResourceName>,
    download_manager: Box<dyn DownloadManager>,
    decompressor: Box<dyn Decompressor>,
    check_complete: bool,
    pending_manifest_bytes: u64,
    all_complete_pending: bool,
    events: Vec<UpdaterEvent>,
}

impl ResourceUpdater {
    pub fn new(download_manager: Box<dyn DownloadManager>, decompressor: Box<dyn Decompressor>) -> Self {
        Self {
            candidates: BTreeMap::new(),
            apply: None,
            group_update: None,
            while_playing: BTreeSet::new(),
            downloads: ReplyQueue::new(),
            in_flight: HashMap::new(),
            download_manager,
            decompressor,
            check_complete: false,
            pending_manifest_bytes: 0,
            all_complete_pending: false,
            events: Vec::new(),
        }
    }

    /// Register a candidate reported by the checker.
    pub fn add_candidate(&mut self, info: UpdateInfo) {
        debug!(resource = %info.name, "update candidate");
        self.candidates.insert(info.name.clone(), info);
    }

    /// Allow update operations. Called once checking has finished.
    pub fn set_check_complete(&mut self) {
        self.check_complete = true;
    }

    pub fn candidate(&self, name: &ResourceName) -> Option<&UpdateInfo> {
        self.candidates.get(name)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &UpdateInfo> {
        self.candidates.values()
    }

    pub fn is_applying(&self) -> bool {
        self.apply.is_some()
    }

    pub fn apply_waiting_count(&self) -> usize {
        self.apply.as_ref().map(|b| b.queue.len()).unwrap_or(0)
    }

    /// Group currently being updated.
    pub fn updating_group(&self) -> Option<&str> {
        self.group_update.as_ref().map(|g| g.group.as_str())
    }

    pub fn update_waiting_count(&self) -> usize {
        self.group_update.as_ref().map(|g| g.waiting.len()).unwrap_or(0)
    }

    pub fn update_waiting_while_playing_count(&self) -> usize {
        self.while_playing.len()
    }

    pub fn downloading_count(&self) -> usize {
        self.in_flight.len()
    }

    fn require_checked(&self) -> Result<(), ResourceError> {
        if !self.check_complete {
            return Err(ResourceError::usage("resources must be checked before updating"));
        }
        Ok(())
    }

    /// Drain download completions, run one pack extraction, dispatch waiting
    /// downloads.
    pub fn tick(&mut self, ctx: &mut ResourceContext) -> Vec<UpdaterEvent> {
        for (token, event) in self.downloads.drain() {
            self.handle_download_event(ctx, token, event);
        }
        self.apply_next(ctx);
        self.dispatch_group_downloads(ctx);

        if self.all_complete_pending {
            self.all_complete_pending = false;
            self.flush_manifest(ctx);
            info!("all update candidates complete");
            self.events.push(UpdaterEvent::UpdateAllComplete);
        }
        std::mem::take(&mut self.events)
    }

    /// Record a verified resource in the table and the read-write rows.
    fn commit_success(&mut self, ctx: &mut ResourceContext, name: &ResourceName, target: &RemoteSnapshot) {
        self.candidates.remove(name);
        self.while_playing.remove(name);
        ctx.table.mark_ready(name);
        ctx.table.record_read_write(
            name.clone(),
            ReadWriteEntry {
                packed_store: target.packed_store.clone(),
                load_type: target.load_type,
                length: target.length,
                hash: target.hash,
            },
        );
        self.pending_manifest_bytes += target.compressed_length;
        if self.pending_manifest_bytes >= ctx.config.generate_manifest_threshold {
            self.flush_manifest(ctx);
        }
        if self.candidates.is_empty() {
            self.all_complete_pending = true;
        }
    }

    fn flush_manifest(&mut self, ctx: &ResourceContext) {
        if let Err(e) = ctx.regenerate_read_write_manifest() {
            warn!(error = %e, "failed to regenerate read-write manifest");
        }
        self.pending_manifest_bytes = 0;
    }
}

/// Turn transferred bytes into verified stored bytes: check the transfer
/// length and, when compressed, the transfer hash; decompress; then check
/// the stored length and plaintext hash.
pub(crate) fn restore_stored(
    name: &ResourceName,
    target: &RemoteSnapshot,
    transferred: Vec<u8>,
    decompressor: &dyn Decompressor,
) -> Result<Vec<u8>, IntegrityError> {
    let resource = name.full_name();
    if transferred.len() as u64 != target.compressed_length {
        return Err(IntegrityError::CompressedLength {
            resource: resource.to_string(),
            expected: target.compressed_length,
            actual: transferred.len() as u64,
        });
    }
    let stored = if target.is_compressed() {
        let actual = crc32(&transferred);
        if actual != target.compressed_hash {
            return Err(IntegrityError::CompressedHash {
                resource: resource.to_string(),
                expected: target.compressed_hash,
                actual,
            });
        }
        decompressor
            .decompress(&transferred, target.length as usize)
            .map_err(|reason| IntegrityError::Decompress {
                resource: resource.to_string(),
                reason,
            })?
    } else {
        transferred
    };
    verify_stored(&resource, &stored, target.load_type, target.length, target.hash)?;
    Ok(stored)
}
