//! Resource checker.
//!
//! Loads the remote, read-only and read-write manifests through the byte
//! fetcher and reconciles them into per-resource actions. The remote manifest
//! is mandatory; a missing or unreadable local manifest means an empty tier.
//!
//! Fetches complete into a reply queue that [`ResourceChecker::tick`] drains.
//! Once all three have reported, a single pass populates the resource table,
//! performs moves and removals in the read-write tier, and yields one
//! [`CheckerEvent::NeedUpdate`] per resource that must be patched followed
//! by [`CheckerEvent::Complete`].

mod check_info;

pub use check_info::{CheckInfo, CheckStatus, LocalSnapshot, RemoteSnapshot};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::ResourceContext;
use crate::error::ResourceError;
use crate::manifest::{Manifest, ManifestKind};
use crate::model::{ReadWriteEntry, ResourceInfo, ResourceName};
use crate::reply::ReplyQueue;
use crate::storage::{FetchError, FetchResult, FetchSource};
use crate::telemetry::{record_check, ResourceSpan, SpanExt};
use crate::updater::UpdateInfo;

const REMOTE_TOKEN: u64 = 0;
const READ_ONLY_TOKEN: u64 = 1;
const READ_WRITE_TOKEN: u64 = 2;

/// Aggregate outcome of a check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub moved: usize,
    pub removed: usize,
    pub update_count: usize,
    pub update_total_length: u64,
    pub update_total_compressed_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerEvent {
    /// A resource must be downloaded or applied.
    NeedUpdate(UpdateInfo),
    Complete(CheckSummary),
    /// The remote manifest was unusable, or reconciliation hit a fault.
    Failed { message: String },
}

/// What a fetch delivered for one manifest slot.
enum Slot {
    Pending,
    Loaded(Manifest),
    Empty,
}

struct CheckRun {
    active_variant: Option<String>,
    ignore_other_variant: bool,
    remote: Option<Result<Manifest, String>>,
    read_only: Slot,
    read_write: Slot,
}

impl CheckRun {
    fn is_ready(&self) -> bool {
        self.remote.is_some()
            && !matches!(self.read_only, Slot::Pending)
            && !matches!(self.read_write, Slot::Pending)
    }
}

pub struct ResourceChecker {
    replies: ReplyQueue<FetchResult>,
    run: Option<CheckRun>,
    started: bool,
    complete: bool,
}

impl ResourceChecker {
    pub fn new() -> Self {
        Self {
            replies: ReplyQueue::new(),
            run: None,
            started: false,
            complete: false,
        }
    }

    /// True once `check_resources` has been called.
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// True after a successful reconciliation.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Issue the three manifest fetches.
    pub fn check_resources(
        &mut self,
        ctx: &ResourceContext,
        active_variant: Option<&str>,
        ignore_other_variant: bool,
    ) -> Result<(), ResourceError> {
        if self.started {
            return Err(ResourceError::usage("resources have already been checked"));
        }
        self.started = true;
        self.run = Some(CheckRun {
            active_variant: active_variant.map(String::from),
            ignore_other_variant,
            remote: None,
            read_only: Slot::Pending,
            read_write: Slot::Pending,
        });
        info!(
            variant = active_variant.unwrap_or(""),
            ignore_other_variant, "checking resources"
        );

        let config = &ctx.config;
        ctx.fetcher.fetch(
            FetchSource::Remote(config.remote_manifest_uri()),
            self.replies.reply(REMOTE_TOKEN),
        );
        ctx.fetcher.fetch(
            FetchSource::ReadOnly(config.read_only_manifest_name.clone()),
            self.replies.reply(READ_ONLY_TOKEN),
        );
        ctx.fetcher.fetch(
            FetchSource::ReadWrite(config.read_write_manifest_name.clone()),
            self.replies.reply(READ_WRITE_TOKEN),
        );
        Ok(())
    }

    /// Drain fetch completions; reconcile once all three have reported.
    pub fn tick(&mut self, ctx: &mut ResourceContext) -> Vec<CheckerEvent> {
        let Some(run) = self.run.as_mut() else {
            return Vec::new();
        };
        for (token, result) in self.replies.drain() {
            match token {
                REMOTE_TOKEN => run.remote = Some(decode_remote(result)),
                READ_ONLY_TOKEN => run.read_only = decode_local(result, "read-only", ManifestKind::ReadOnly),
                READ_WRITE_TOKEN => run.read_write = decode_local(result, "read-write", ManifestKind::ReadWrite),
                other => warn!(token = other, "unexpected manifest fetch completion"),
            }
        }
        if !run.is_ready() {
            return Vec::new();
        }
        let Some(run) = self.run.take() else {
            return Vec::new();
        };

        let span = ResourceSpan::phase("check");
        let _guard = span.enter();
        let result = reconcile(run, ctx);
        span.record_result(&result);
        match result {
            Ok(events) => {
                self.complete = true;
                if let Some(CheckerEvent::Complete(summary)) = events.last() {
                    record_check(summary.update_count, summary.moved, summary.removed);
                    info!(
                        moved = summary.moved,
                        removed = summary.removed,
                        update_count = summary.update_count,
                        update_total_length = summary.update_total_length,
                        "check complete"
                    );
                }
                events
            }
            Err(message) => {
                warn!(error = %message, "check failed");
                vec![CheckerEvent::Failed { message }]
            }
        }
    }
}

impl Default for ResourceChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_remote(result: FetchResult) -> Result<Manifest, String> {
    let bytes = result.map_err(|e| format!("remote manifest unavailable: {e}"))?;
    Manifest::decode_as(&bytes, ManifestKind::Updatable).map_err(|e| format!("remote manifest is invalid: {e}"))
}

fn decode_local(result: FetchResult, tier: &str, kind: ManifestKind) -> Slot {
    match result {
        Ok(bytes) => match Manifest::decode_as(&bytes, kind) {
            Ok(manifest) => Slot::Loaded(manifest),
            Err(e) => {
                warn!(tier, error = %e, "local manifest is invalid, treating tier as empty");
                Slot::Empty
            }
        },
        Err(FetchError::NotFound(_)) => {
            debug!(tier, "no local manifest");
            Slot::Empty
        }
        Err(e) => {
            warn!(tier, error = %e, "local manifest unreadable, treating tier as empty");
            Slot::Empty
        }
    }
}

/// Build every CheckInfo from the three manifests and refresh its status.
pub fn build_check_infos(
    remote: &Manifest,
    read_only: Option<&Manifest>,
    read_write: Option<&Manifest>,
    active_variant: Option<&str>,
    ignore_other_variant: bool,
) -> Result<BTreeMap<ResourceName, CheckInfo>, ResourceError> {
    let mut infos: BTreeMap<ResourceName, CheckInfo> = BTreeMap::new();
    for resource in &remote.resources {
        infos
            .entry(resource.name.clone())
            .or_insert_with(|| CheckInfo::new(resource.name.clone()))
            .set_remote(resource.into())?;
    }
    for resource in read_only.map(|m| m.resources.as_slice()).unwrap_or_default() {
        infos
            .entry(resource.name.clone())
            .or_insert_with(|| CheckInfo::new(resource.name.clone()))
            .set_read_only(resource.into())?;
    }
    for resource in read_write.map(|m| m.resources.as_slice()).unwrap_or_default() {
        infos
            .entry(resource.name.clone())
            .or_insert_with(|| CheckInfo::new(resource.name.clone()))
            .set_read_write(resource.into())?;
    }
    for info in infos.values_mut() {
        info.refresh_status(active_variant, ignore_other_variant);
    }
    Ok(infos)
}

fn reconcile(run: CheckRun, ctx: &mut ResourceContext) -> Result<Vec<CheckerEvent>, String> {
    let remote = run.remote.unwrap_or_else(|| Err("remote manifest missing".to_string()))?;
    let read_only = match run.read_only {
        Slot::Loaded(m) => Some(m),
        _ => None,
    };
    let read_write = match run.read_write {
        Slot::Loaded(m) => Some(m),
        _ => None,
    };
    let active_variant = run.active_variant.as_deref();

    let infos = build_check_infos(
        &remote,
        read_only.as_ref(),
        read_write.as_ref(),
        active_variant,
        run.ignore_other_variant,
    )
    .map_err(|e| e.to_string())?;

    ctx.table
        .set_versions(remote.applicable_version.clone(), remote.internal_version);
    ctx.table
        .add_manifest_layout(&remote, active_variant)
        .map_err(|e| e.to_string())?;

    let mut summary = CheckSummary::default();
    let mut events = Vec::new();
    for info in infos.values() {
        apply_check_info(info, ctx, &mut summary, &mut events).map_err(|e| e.to_string())?;
    }

    if summary.moved > 0 || summary.removed > 0 {
        ctx.storage.remove_empty_packed_stores().map_err(|e| e.to_string())?;
        ctx.regenerate_read_write_manifest().map_err(|e| e.to_string())?;
    }
    events.push(CheckerEvent::Complete(summary));
    Ok(events)
}

fn apply_check_info(
    info: &CheckInfo,
    ctx: &mut ResourceContext,
    summary: &mut CheckSummary,
    events: &mut Vec<CheckerEvent>,
) -> Result<(), ResourceError> {
    let name = info.name();
    let read_write_store = info.read_write().and_then(|rw| rw.packed_store.as_deref());

    if info.need_remove() {
        match ctx.storage.delete_read_write(name, read_write_store) {
            Ok(true) => summary.removed += 1,
            Ok(false) => debug!(resource = %name, "stale copy already gone"),
            Err(e) => warn!(resource = %name, error = %e, "failed to remove stale copy"),
        }
    }

    match info.status() {
        CheckStatus::Update => {
            let Some(remote) = info.remote() else {
                return Ok(());
            };
            register_update(name, remote, ctx, summary, events)?;
        }
        CheckStatus::StorageInReadOnly => {
            let Some(remote) = info.remote() else {
                return Ok(());
            };
            ctx.table.insert_resource(ResourceInfo::new(
                name.clone(),
                remote.packed_store.clone(),
                remote.load_type,
                remote.length,
                remote.hash,
                remote.compressed_length,
                true,
                true,
            ))?;
        }
        CheckStatus::StorageInReadWrite => {
            let Some(remote) = info.remote() else {
                return Ok(());
            };
            if let Err(e) = relocate(info, ctx) {
                warn!(resource = %name, error = %e, "move failed, downloading again");
                for store in [read_write_store, remote.packed_store.as_deref()] {
                    if let Err(e) = ctx.storage.delete_read_write(name, store) {
                        warn!(resource = %name, error = %e, "failed to delete copy after failed move");
                    }
                }
                summary.removed += 1;
                return register_update(name, remote, ctx, summary, events);
            }
            if info.need_move_to_disk() || info.need_move_to_packed_store() {
                summary.moved += 1;
            }
            ctx.table.insert_resource(ResourceInfo::new(
                name.clone(),
                remote.packed_store.clone(),
                remote.load_type,
                remote.length,
                remote.hash,
                remote.compressed_length,
                false,
                true,
            ))?;
            ctx.table.record_read_write(
                name.clone(),
                ReadWriteEntry {
                    packed_store: remote.packed_store.clone(),
                    load_type: remote.load_type,
                    length: remote.length,
                    hash: remote.hash,
                },
            );
        }
        CheckStatus::Unavailable if !info.need_remove() => {
            if let Some(rw) = info.read_write() {
                ctx.table.record_read_write(
                    name.clone(),
                    ReadWriteEntry {
                        packed_store: rw.packed_store.clone(),
                        load_type: rw.load_type,
                        length: rw.length,
                        hash: rw.hash,
                    },
                );
            }
        }
        CheckStatus::Unavailable | CheckStatus::Disuse | CheckStatus::Unknown => {}
    }
    Ok(())
}

fn relocate(info: &CheckInfo, ctx: &ResourceContext) -> Result<(), ResourceError> {
    let name = info.name();
    if info.need_move_to_disk() {
        if let Some(from) = info.read_write().and_then(|rw| rw.packed_store.as_deref()) {
            ctx.storage.move_to_disk(name, from)?;
        }
    }
    if info.need_move_to_packed_store() {
        if let Some(to) = info.remote().and_then(|r| r.packed_store.as_deref()) {
            ctx.storage.move_to_packed_store(name, to)?;
        }
    }
    Ok(())
}

fn register_update(
    name: &ResourceName,
    remote: &RemoteSnapshot,
    ctx: &mut ResourceContext,
    summary: &mut CheckSummary,
    events: &mut Vec<CheckerEvent>,
) -> Result<(), ResourceError> {
    ctx.table.insert_resource(ResourceInfo::new(
        name.clone(),
        remote.packed_store.clone(),
        remote.load_type,
        remote.length,
        remote.hash,
        remote.compressed_length,
        false,
        false,
    ))?;
    summary.update_count += 1;
    summary.update_total_length += remote.length;
    summary.update_total_compressed_length += remote.compressed_length;
    debug!(resource = %name, length = remote.length, "needs update");
    events.push(CheckerEvent::NeedUpdate(UpdateInfo::new(name.clone(), remote.clone())));
    Ok(())
}
