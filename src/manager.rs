//! Resource manager.
//!
//! Owns the shared [`ResourceContext`] and every component, gates
//! operations on the configured [`ResourceMode`], and runs all of them from
//! a single [`ResourceManager::tick`]. Component events are collected into
//! one queue drained with [`ResourceManager::drain_events`].
//!
//! In update-while-playing mode, loads of resources that are not ready yet
//! are turned into ad-hoc downloads; if such a download is given up, the
//! loads waiting on it fail with `NotReady`.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::checker::{CheckerEvent, ResourceChecker};
use crate::config::{ResourceConfig, ResourceMode};
use crate::context::ResourceContext;
use crate::download::DownloadManager;
use crate::error::{LoadFailure, ResourceError};
use crate::initer::{IniterEvent, ResourceIniter};
use crate::loader::{AssetDecoder, BinaryLocation, HasAssetResult, LoaderEvent, ObjectId, ResourceLoader};
use crate::model::{GroupProgress, ResourceGroupCollection, ResourceName, ResourceTable};
use crate::scheduler::{Priority, TaskInfo};
use crate::transform::{Decompressor, Decryptor};
use crate::updater::{ResourceUpdater, UpdaterEvent};
use crate::verifier::{ResourceVerifier, VerifierEvent};

/// Any component's event, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Verifier(VerifierEvent),
    Checker(CheckerEvent),
    Updater(UpdaterEvent),
    Initer(IniterEvent),
    Loader(LoaderEvent),
}

/// Collaborators plugged into a manager.
pub struct Collaborators<D> {
    pub download_manager: Box<dyn DownloadManager>,
    pub decompressor: Box<dyn Decompressor>,
    pub decryptor: Box<dyn Decryptor>,
    pub decoder: D,
}

pub struct ResourceManager<D: AssetDecoder> {
    ctx: ResourceContext,
    checker: ResourceChecker,
    updater: ResourceUpdater,
    verifier: ResourceVerifier,
    initer: ResourceIniter,
    loader: ResourceLoader<D>,
    /// Ad-hoc update requests held until checking has completed.
    deferred_updates: Vec<ResourceName>,
    events: VecDeque<ResourceEvent>,
}

impl<D: AssetDecoder> ResourceManager<D> {
    pub fn new(ctx: ResourceContext, collaborators: Collaborators<D>) -> Self {
        let mode = ctx.config.mode;
        info!(mode = mode.as_str(), "resource manager created");
        let loader = ResourceLoader::new(
            collaborators.decoder,
            collaborators.decryptor,
            ctx.config.load_agent_count,
            mode,
        );
        Self {
            updater: ResourceUpdater::new(collaborators.download_manager, collaborators.decompressor),
            checker: ResourceChecker::new(),
            verifier: ResourceVerifier::new(),
            initer: ResourceIniter::new(),
            loader,
            ctx,
            deferred_updates: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> ResourceMode {
        self.ctx.config.mode
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &ResourceContext {
        &self.ctx
    }

    pub fn table(&self) -> &ResourceTable {
        &self.ctx.table
    }

    pub fn applicable_version(&self) -> Option<&str> {
        self.ctx.table.applicable_version()
    }

    pub fn internal_version(&self) -> i32 {
        self.ctx.table.internal_version()
    }

    pub fn checker(&self) -> &ResourceChecker {
        &self.checker
    }

    pub fn updater(&self) -> &ResourceUpdater {
        &self.updater
    }

    pub fn verifier(&self) -> &ResourceVerifier {
        &self.verifier
    }

    pub fn loader(&self) -> &ResourceLoader<D> {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut ResourceLoader<D> {
        &mut self.loader
    }

    fn require_updatable(&self, operation: &str) -> Result<(), ResourceError> {
        if !self.mode().is_updatable() {
            return Err(ResourceError::usage(format!("{operation} is not available in package mode")));
        }
        Ok(())
    }

    /// Package mode: register everything in the package manifest.
    pub fn init_resources(&mut self) -> Result<(), ResourceError> {
        if self.mode() != ResourceMode::Package {
            return Err(ResourceError::usage("init_resources is only available in package mode"));
        }
        let variant = self.ctx.config.variant.clone();
        self.initer.init_resources(&self.ctx, variant.as_deref())
    }

    /// Scrub the read-write tier. Only before checking starts.
    pub fn verify_resources(&mut self) -> Result<(), ResourceError> {
        self.require_updatable("verify_resources")?;
        let budget = self.ctx.config.verify_bytes_per_tick;
        self.verifier
            .verify_resources(&self.ctx, budget, self.checker.has_started())
    }

    pub fn check_resources(&mut self) -> Result<(), ResourceError> {
        self.require_updatable("check_resources")?;
        if self.verifier.is_running() {
            return Err(ResourceError::usage("cannot check while verification is running"));
        }
        let variant = self.ctx.config.variant.clone();
        let ignore = self.ctx.config.ignore_other_variant;
        self.checker
            .check_resources(&self.ctx, variant.as_deref(), ignore)
    }

    pub fn apply_resources(&mut self, pack_path: &str) -> Result<(), ResourceError> {
        self.require_updatable("apply_resources")?;
        self.updater.apply_resources(&self.ctx, pack_path)
    }

    /// Download every candidate in `group`; the empty name means all.
    pub fn update_resources(&mut self, group: &str) -> Result<(), ResourceError> {
        self.require_updatable("update_resources")?;
        self.updater.update_resources(&self.ctx.table, group)
    }

    pub fn stop_update_resources(&mut self) -> Result<(), ResourceError> {
        self.require_updatable("stop_update_resources")?;
        self.updater.stop_update_resources()
    }

    pub fn update_resource(&mut self, name: &ResourceName) -> Result<(), ResourceError> {
        self.require_updatable("update_resource")?;
        self.updater.update_resource(&self.ctx, name)
    }

    pub fn group_progress(&self, group: &str) -> Option<GroupProgress> {
        let table = &self.ctx.table;
        table.group(group).map(|g| g.progress(table.resources()))
    }

    pub fn group_collection(&self, groups: &[&str]) -> Result<ResourceGroupCollection, ResourceError> {
        self.ctx.table.group_collection(groups)
    }

    pub fn has_asset(&self, asset_name: &str) -> HasAssetResult {
        self.loader.has_asset(&self.ctx.table, asset_name)
    }

    pub fn load_asset(&mut self, asset_name: &str, asset_type: Option<&str>, priority: Priority) -> Result<u64, LoadFailure> {
        self.loader
            .load_asset(&self.ctx.table, asset_name, asset_type, priority)
    }

    pub fn load_scene(&mut self, scene_name: &str, priority: Priority) -> Result<u64, LoadFailure> {
        self.loader.load_scene(&self.ctx.table, scene_name, priority)
    }

    pub fn unload_asset(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        self.loader.unload_asset(object)
    }

    pub fn unload_scene(&mut self, scene_name: &str) -> Result<(), ResourceError> {
        self.loader.unload_scene(scene_name)
    }

    pub fn asset(&self, object: ObjectId) -> Option<&D::Asset> {
        self.loader.asset(object)
    }

    pub fn load_binary(&mut self, binary_name: &str) -> Result<u64, LoadFailure> {
        self.loader
            .load_binary(&self.ctx.table, self.ctx.fetcher.as_ref(), binary_name)
    }

    pub fn load_binary_from_packed_store(&self, binary_name: &str) -> Result<Vec<u8>, LoadFailure> {
        self.loader
            .load_binary_from_packed_store(&self.ctx.table, &self.ctx.storage, binary_name)
    }

    pub fn binary_length(&self, binary_name: &str) -> Option<u64> {
        self.loader.binary_length(&self.ctx.table, binary_name)
    }

    pub fn binary_path(&self, binary_name: &str) -> Option<BinaryLocation> {
        self.loader.binary_path(&self.ctx.table, binary_name)
    }

    pub fn release_unused(&mut self) -> Result<usize, ResourceError> {
        self.loader.release_unused()
    }

    pub fn force_release_asset(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        self.loader.force_release_asset(object)
    }

    pub fn force_release_resource(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        self.loader.force_release_resource(object)
    }

    pub fn load_task_infos(&self) -> Vec<TaskInfo> {
        self.loader.task_infos()
    }

    /// Run one cooperative step of every component.
    pub fn tick(&mut self) {
        for event in self.verifier.tick(&mut self.ctx) {
            self.events.push_back(ResourceEvent::Verifier(event));
        }

        for event in self.checker.tick(&mut self.ctx) {
            match &event {
                CheckerEvent::NeedUpdate(info) => self.updater.add_candidate(info.clone()),
                CheckerEvent::Complete(_) => self.updater.set_check_complete(),
                CheckerEvent::Failed { .. } => {}
            }
            self.events.push_back(ResourceEvent::Checker(event));
        }

        for event in self.initer.tick(&mut self.ctx) {
            self.events.push_back(ResourceEvent::Initer(event));
        }

        self.forward_update_requests();

        for event in self.updater.tick(&mut self.ctx) {
            if let UpdaterEvent::UpdateFailure { resource, error, .. } = &event {
                if event.is_final_failure() {
                    self.loader.fail_waiting_for(resource, error);
                }
            }
            self.events.push_back(ResourceEvent::Updater(event));
        }

        for event in self.loader.tick(&self.ctx.table, &self.ctx.storage) {
            self.events.push_back(ResourceEvent::Loader(event));
        }
    }

    pub fn drain_events(&mut self) -> Vec<ResourceEvent> {
        self.events.drain(..).collect()
    }

    /// Drop pending load work and any group update.
    pub fn shutdown(&mut self) {
        if self.updater.updating_group().is_some() {
            if let Err(e) = self.updater.stop_update_resources() {
                warn!(error = %e, "cannot stop group update");
            }
        }
        self.loader.shutdown();
        self.deferred_updates.clear();
        info!("resource manager shut down");
    }

    /// Turn the loader's on-demand requests into downloads.
    fn forward_update_requests(&mut self) {
        self.deferred_updates
            .extend(self.loader.take_update_requests());
        if self.deferred_updates.is_empty() || !self.checker.is_complete() {
            return;
        }
        for name in std::mem::take(&mut self.deferred_updates) {
            if self
                .ctx
                .table
                .resource(&name)
                .is_some_and(|info| info.is_ready())
            {
                continue;
            }
            if self.updater.candidate(&name).is_none() {
                self.loader
                    .fail_waiting_for(&name, "no update is available");
                continue;
            }
            match self.updater.update_resource(&self.ctx, &name) {
                Ok(()) => debug!(resource = %name, "on-demand update"),
                Err(e) => {
                    warn!(resource = %name, error = %e, "on-demand update refused");
                    self.loader.fail_waiting_for(&name, &e.to_string());
                }
            }
        }
    }
}
