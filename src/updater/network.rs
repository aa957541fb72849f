//! Network downloads: group updates, ad-hoc updates and retry handling.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{restore_stored, GroupUpdate, ResourceUpdater, UpdaterEvent};
use crate::checker::RemoteSnapshot;
use crate::config::join_uri;
use crate::context::ResourceContext;
use crate::download::{DownloadEvent, DownloadJob, DownloadReply};
use crate::error::ResourceError;
use crate::model::{ResourceName, ResourceTable};
use crate::hash::verify_stored;
use crate::storage::{download_sidecar, Storage};
use crate::telemetry::{record_update_failure, record_update_success};

impl ResourceUpdater {
    /// Download every candidate in `group` (all candidates for the empty
    /// name). An empty selection completes immediately.
    pub fn update_resources(&mut self, table: &ResourceTable, group: &str) -> Result<(), ResourceError> {
        self.require_checked()?;
        if self.apply.is_some() {
            return Err(ResourceError::usage("cannot update while a resource pack is being applied"));
        }
        if let Some(active) = &self.group_update {
            return Err(ResourceError::usage(format!(
                "group '{}' is already being updated",
                active.group
            )));
        }

        let waiting: Vec<ResourceName> = if group.is_empty() {
            self.candidates.keys().cloned().collect()
        } else {
            let members = table
                .group(group)
                .ok_or_else(|| ResourceError::usage(format!("unknown resource group '{group}'")))?;
            self.candidates
                .keys()
                .filter(|name| members.contains(name))
                .cloned()
                .collect()
        };

        info!(group, count = waiting.len(), "updating resources");
        if waiting.is_empty() {
            self.events.push(UpdaterEvent::UpdateGroupComplete {
                group: group.to_string(),
                success: true,
            });
            return Ok(());
        }
        self.group_update = Some(GroupUpdate {
            group: group.to_string(),
            waiting,
            failed: false,
        });
        Ok(())
    }

    /// Drop every group job that has not started. In-flight downloads run to
    /// completion.
    pub fn stop_update_resources(&mut self) -> Result<(), ResourceError> {
        let Some(mut update) = self.group_update.take() else {
            return Err(ResourceError::usage("no group update is running"));
        };
        let candidates = &self.candidates;
        update
            .waiting
            .retain(|name| candidates.get(name).is_some_and(|c| c.downloading));
        info!(group = %update.group, in_flight = update.waiting.len(), "group update stopped");
        Ok(())
    }

    /// Download one candidate immediately, outside any group update.
    pub fn update_resource(&mut self, ctx: &ResourceContext, name: &ResourceName) -> Result<(), ResourceError> {
        self.require_checked()?;
        if self.apply.is_some() {
            return Err(ResourceError::usage("cannot update while a resource pack is being applied"));
        }
        if !self.candidates.contains_key(name) {
            return Err(ResourceError::usage(format!("'{name}' is not an update candidate")));
        }
        if self.while_playing.insert(name.clone()) {
            debug!(resource = %name, "update while playing");
        }
        self.issue_download(ctx, name);
        Ok(())
    }

    pub(super) fn dispatch_group_downloads(&mut self, ctx: &ResourceContext) {
        let Some(update) = &self.group_update else {
            return;
        };
        let limit = self
            .download_manager
            .free_agent_count()
            .saturating_sub(self.download_manager.waiting_task_count());
        if limit == 0 {
            return;
        }
        let ready: Vec<ResourceName> = update
            .waiting
            .iter()
            .filter(|name| self.candidates.get(*name).is_some_and(|c| !c.downloading))
            .take(limit)
            .cloned()
            .collect();
        for name in ready {
            self.issue_download(ctx, &name);
        }
    }

    fn issue_download(&mut self, ctx: &ResourceContext, name: &ResourceName) {
        let Some(info) = self.candidates.get_mut(name) else {
            return;
        };
        if info.downloading {
            return;
        }
        info.downloading = true;
        let uri = join_uri(
            &ctx.config.update_prefix_uri,
            &name.hash_qualified_name(info.target.hash, &ctx.config.remote_extension),
        );
        let job = DownloadJob {
            path: info.path().to_string(),
            uri: uri.clone(),
            resource: name.clone(),
        };
        let reply = self.downloads.fresh();
        self.in_flight.insert(reply.token(), name.clone());
        debug!(resource = %name, uri = %uri, "download issued");
        self.download_manager.add_download(job, DownloadReply::new(reply));
        self.events.push(UpdaterEvent::UpdateStart {
            resource: name.clone(),
            uri,
        });
    }

    pub(super) fn handle_download_event(&mut self, ctx: &mut ResourceContext, token: u64, event: DownloadEvent) {
        let Some(name) = self.in_flight.get(&token).cloned() else {
            debug!(token, "completion for unknown download");
            return;
        };
        match event {
            DownloadEvent::Progress { downloaded } => {
                self.events.push(UpdaterEvent::UpdateChanged {
                    resource: name,
                    downloaded,
                });
            }
            DownloadEvent::Success { .. } | DownloadEvent::Failure { .. }
                if !self.candidates.contains_key(&name) =>
            {
                self.in_flight.remove(&token);
                self.discard_stray_download(ctx, &name);
            }
            DownloadEvent::Success { length } => {
                self.in_flight.remove(&token);
                match self.finish_download(ctx, &name) {
                    Ok(target) => {
                        debug!(resource = %name, length, "downloaded");
                        record_update_success(target.compressed_length);
                        self.events.push(UpdaterEvent::UpdateSuccess {
                            resource: name.clone(),
                            length: target.length,
                            compressed_length: target.compressed_length,
                        });
                        self.commit_success(ctx, &name, &target);
                        self.settle_group(ctx, &name, false);
                    }
                    Err(e) => self.fail_download(ctx, &name, e.to_string()),
                }
            }
            DownloadEvent::Failure { message } => {
                self.in_flight.remove(&token);
                self.fail_download(ctx, &name, message);
            }
        }
    }

    /// Verify the downloaded file and move it into its final place.
    fn finish_download(
        &self,
        ctx: &ResourceContext,
        name: &ResourceName,
    ) -> Result<RemoteSnapshot, ResourceError> {
        let info = self
            .candidates
            .get(name)
            .ok_or_else(|| ResourceError::fault(format!("'{name}' is not an update candidate")))?;
        let target = info.target.clone();
        let path = info.path();
        let read_write = ctx.storage.read_write();
        let transferred = read_write.read(&path)?;
        let compressed = target.is_compressed();
        let stored = restore_stored(name, &target, transferred, self.decompressor.as_ref())?;
        match target.packed_store.as_deref() {
            Some(store) => {
                ctx.storage.write_read_write(name, Some(store), &stored)?;
                read_write.delete(&path)?;
            }
            None if compressed => read_write.write(&path, &stored)?,
            None => {}
        }
        read_write.delete(&download_sidecar(&path))?;
        Ok(target)
    }

    /// Completion for a resource that stopped being a candidate while its
    /// download was in flight. A committed loose copy at the same path is
    /// re-verified and dropped if the transfer clobbered it; any other file
    /// the transport left there is deleted.
    fn discard_stray_download(&mut self, ctx: &mut ResourceContext, name: &ResourceName) {
        let path = name.full_name();
        let read_write = Arc::clone(ctx.storage.read_write());
        remove_partial(read_write.as_ref(), &download_sidecar(&path));
        let committed = ctx
            .table
            .read_write_entry(name)
            .filter(|entry| entry.packed_store.is_none())
            .cloned();
        let Some(entry) = committed else {
            debug!(resource = %name, "discarding download for a resource that is no longer a candidate");
            remove_partial(read_write.as_ref(), &path);
            return;
        };
        let intact = read_write
            .read(&path)
            .map_err(ResourceError::from)
            .and_then(|stored| {
                verify_stored(&path, &stored, entry.load_type, entry.length, entry.hash).map_err(ResourceError::from)
            });
        if let Err(e) = intact {
            warn!(resource = %name, error = %e, "stray download replaced a committed copy");
            remove_partial(read_write.as_ref(), &path);
            ctx.table.forget_read_write(name);
            ctx.table.revoke_ready(name);
            self.flush_manifest(ctx);
        }
    }

    fn fail_download(&mut self, ctx: &ResourceContext, name: &ResourceName, error: String) {
        let read_write = ctx.storage.read_write();
        let path = name.full_name();
        remove_partial(read_write.as_ref(), &path);
        remove_partial(read_write.as_ref(), &download_sidecar(&path));

        let max_retries = ctx.config.update_retry_count;
        let Some(info) = self.candidates.get_mut(name) else {
            return;
        };
        let retry_count = info.retry_count;
        info.downloading = false;
        self.events.push(UpdaterEvent::UpdateFailure {
            resource: name.clone(),
            retry_count,
            max_retries,
            error: error.clone(),
        });

        if retry_count < max_retries {
            info.retry_count += 1;
            record_update_failure(true);
            warn!(resource = %name, retry = retry_count + 1, max_retries, error = %error, "download failed, retrying");
            if self.while_playing.contains(name) {
                self.issue_download(ctx, name);
            }
            return;
        }

        info.retry_count = 0;
        record_update_failure(false);
        warn!(resource = %name, max_retries, error = %error, "download failed, giving up");
        self.while_playing.remove(name);
        self.settle_group(ctx, name, true);
    }

    /// Take a finished or dropped resource off the group's waiting list and
    /// complete the group when the list drains.
    fn settle_group(&mut self, ctx: &ResourceContext, name: &ResourceName, failed: bool) {
        let Some(update) = self.group_update.as_mut() else {
            return;
        };
        let before = update.waiting.len();
        update.waiting.retain(|n| n != name);
        if update.waiting.len() == before {
            return;
        }
        update.failed |= failed;
        if !update.waiting.is_empty() {
            return;
        }
        if let Some(update) = self.group_update.take() {
            self.flush_manifest(ctx);
            info!(group = %update.group, success = !update.failed, "group update complete");
            self.events.push(UpdaterEvent::UpdateGroupComplete {
                group: update.group,
                success: !update.failed,
            });
        }
    }
}

fn remove_partial(storage: &dyn Storage, path: &str) {
    if let Err(e) = storage.delete(path) {
        warn!(path, error = %e, "failed to delete partial download");
    }
}
