//! Resource loader.
//!
//! Loads assets, scenes and binaries out of ready resources. Each request
//! becomes a task in a [`TaskPool`] together with one dependency task per
//! direct dependency, recursively. Loaded bundles and assets are kept in
//! spawn-counted pools so repeated loads are served from cache.
//!
//! Decoding is delegated to an [`AssetDecoder`]; its completions are
//! drained on [`ResourceLoader::tick`].

mod agent;
mod decoder;
mod object_pool;
mod state;
mod task;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use decoder::{AssetDecoder, BundleSource, DecodeReply};
pub use object_pool::{ObjectId, ObjectPool};
pub use task::{LoadTask, LoadTaskKind};

use agent::{LoadAgent, LoadEnv};
use state::{LoaderState, Outcome};

use crate::config::ResourceMode;
use crate::error::{LoadFailure, LoadResourceStatus, ResourceError};
use crate::model::{LoadType, ResourceInfo, ResourceName, ResourceTable};
use crate::reply::ReplyQueue;
use crate::scheduler::{Priority, TaskInfo, TaskPool};
use crate::storage::{ByteFetcher, FetchResult, FetchSource, ResourceStorage};
use crate::telemetry::{record_load, record_waiting_tasks, ResourceSpan};
use crate::transform::Decryptor;

/// Progress marker for a running asset or scene load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    ReadResource,
    ParseResource,
    LoadAsset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    LoadAssetSuccess {
        serial: u64,
        asset_name: String,
        object: ObjectId,
    },
    LoadAssetFailure {
        serial: u64,
        asset_name: String,
        status: LoadResourceStatus,
        message: String,
    },
    LoadAssetUpdate {
        serial: u64,
        asset_name: String,
        stage: LoadStage,
    },
    /// One direct dependency of a top-level request is in place.
    DependencyLoaded {
        serial: u64,
        asset_name: String,
        dependency: String,
        loaded: usize,
        total: usize,
    },
    LoadSceneSuccess {
        serial: u64,
        scene_name: String,
        object: ObjectId,
    },
    LoadSceneFailure {
        serial: u64,
        scene_name: String,
        status: LoadResourceStatus,
        message: String,
    },
    SceneUnloaded {
        scene_name: String,
    },
    UnloadSceneFailure {
        scene_name: String,
        message: String,
    },
    LoadBinarySuccess {
        serial: u64,
        binary_name: String,
        bytes: Vec<u8>,
    },
    LoadBinaryFailure {
        serial: u64,
        binary_name: String,
        status: LoadResourceStatus,
        message: String,
    },
}

/// Where an asset can be served from right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HasAssetResult {
    NotExist,
    NotReady,
    AssetOnDisk,
    AssetInPackedStore,
    BinaryOnDisk,
    BinaryInPackedStore,
}

/// Location of a loose binary resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLocation {
    pub in_read_only: bool,
    pub path: String,
}

struct PendingBinary {
    binary_name: String,
    resource: ResourceName,
    load_type: LoadType,
    hash: u32,
}

struct PlannedLoad {
    asset_name: String,
    resource: ResourceName,
    children: Vec<PlannedLoad>,
}

pub struct ResourceLoader<D: AssetDecoder> {
    pool: TaskPool<LoadAgent<D>>,
    state: LoaderState<D>,
    mode: ResourceMode,
    next_serial: u64,
    binaries: ReplyQueue<FetchResult>,
    pending_binaries: HashMap<u64, PendingBinary>,
    scene_replies: ReplyQueue<Result<(), String>>,
    pending_unloads: HashMap<u64, String>,
    update_requests: Vec<ResourceName>,
}

impl<D: AssetDecoder> ResourceLoader<D> {
    pub fn new(decoder: D, decryptor: Box<dyn Decryptor>, agent_count: usize, mode: ResourceMode) -> Self {
        let mut pool = TaskPool::new();
        for _ in 0..agent_count.max(1) {
            pool.add_agent(LoadAgent::new());
        }
        Self {
            pool,
            state: LoaderState::new(decoder, decryptor),
            mode,
            next_serial: 1,
            binaries: ReplyQueue::new(),
            pending_binaries: HashMap::new(),
            scene_replies: ReplyQueue::new(),
            pending_unloads: HashMap::new(),
            update_requests: Vec::new(),
        }
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    pub fn decoder(&self) -> &D {
        &self.state.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.state.decoder
    }

    pub fn total_agent_count(&self) -> usize {
        self.pool.total_agent_count()
    }

    pub fn free_agent_count(&self) -> usize {
        self.pool.free_agent_count()
    }

    pub fn working_agent_count(&self) -> usize {
        self.pool.working_agent_count()
    }

    pub fn waiting_task_count(&self) -> usize {
        self.pool.waiting_task_count()
    }

    pub fn task_infos(&self) -> Vec<TaskInfo> {
        self.pool.task_infos()
    }

    /// Resources that must be downloaded before a pending load can start.
    pub fn take_update_requests(&mut self) -> Vec<ResourceName> {
        std::mem::take(&mut self.update_requests)
    }

    pub fn asset(&self, object: ObjectId) -> Option<&D::Asset> {
        self.state.assets.get(object).map(|o| &o.target)
    }

    pub fn asset_object(&self, asset_name: &str) -> Option<ObjectId> {
        self.state.assets.id_of(asset_name)
    }

    pub fn asset_spawn_count(&self, object: ObjectId) -> Option<usize> {
        self.state.assets.spawn_count(object)
    }

    pub fn asset_object_count(&self) -> usize {
        self.state.assets.len()
    }

    pub fn resource_object(&self, resource: &ResourceName) -> Option<ObjectId> {
        self.state.bundles.id_of(&resource.full_name())
    }

    pub fn resource_spawn_count(&self, object: ObjectId) -> Option<usize> {
        self.state.bundles.spawn_count(object)
    }

    pub fn resource_object_count(&self) -> usize {
        self.state.bundles.len()
    }

    pub fn is_scene_loaded(&self, scene_name: &str) -> bool {
        self.state.scenes.contains_key(scene_name)
    }

    pub fn has_asset(&self, table: &ResourceTable, asset_name: &str) -> HasAssetResult {
        let Some(info) = table
            .asset(asset_name)
            .and_then(|a| table.resource(a.resource()))
        else {
            return HasAssetResult::NotExist;
        };
        if !info.is_ready() {
            return HasAssetResult::NotReady;
        }
        match (info.is_binary(), info.uses_packed_store()) {
            (false, false) => HasAssetResult::AssetOnDisk,
            (false, true) => HasAssetResult::AssetInPackedStore,
            (true, false) => HasAssetResult::BinaryOnDisk,
            (true, true) => HasAssetResult::BinaryInPackedStore,
        }
    }

    /// Queue an asset load. Returns the request serial.
    pub fn load_asset(
        &mut self,
        table: &ResourceTable,
        asset_name: &str,
        asset_type: Option<&str>,
        priority: Priority,
    ) -> Result<u64, LoadFailure> {
        let kind = LoadTaskKind::Asset {
            asset_type: asset_type.map(String::from),
        };
        self.submit(table, asset_name, kind, priority)
    }

    /// Queue a scene load. A scene that is loaded or loading is refused.
    pub fn load_scene(&mut self, table: &ResourceTable, scene_name: &str, priority: Priority) -> Result<u64, LoadFailure> {
        if self.state.scenes.contains_key(scene_name) || self.state.loading_assets.contains(scene_name) {
            return Err(self.reject(
                scene_name,
                LoadFailure::new(
                    LoadResourceStatus::AssetError,
                    format!("scene '{scene_name}' is already loaded"),
                ),
            ));
        }
        self.submit(table, scene_name, LoadTaskKind::Scene, priority)
    }

    /// Ask the decoder to unload a loaded scene.
    pub fn unload_scene(&mut self, scene_name: &str) -> Result<(), ResourceError> {
        if self.pending_unloads.values().any(|s| s == scene_name) {
            return Err(ResourceError::usage(format!("scene '{scene_name}' is already unloading")));
        }
        let object = *self
            .state
            .scenes
            .get(scene_name)
            .ok_or_else(|| ResourceError::usage(format!("scene '{scene_name}' is not loaded")))?;
        let scene = self
            .state
            .assets
            .get(object)
            .ok_or_else(|| ResourceError::fault(format!("scene '{scene_name}' lost its object")))?;
        let reply = self.scene_replies.fresh();
        self.pending_unloads.insert(reply.token(), scene_name.to_string());
        self.state.decoder.unload_scene(scene_name, &scene.target, reply);
        Ok(())
    }

    /// Give back one spawn of a loaded asset.
    pub fn unload_asset(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        if !self.state.assets.contains(object) {
            return Err(ResourceError::usage(format!("asset object {object} is not loaded")));
        }
        self.state.assets.unspawn(object)
    }

    /// Release every asset and resource object that nothing uses. Returns how
    /// many were released.
    pub fn release_unused(&mut self) -> Result<usize, ResourceError> {
        let released = self.state.release_unused()?;
        if released > 0 {
            debug!(released, "released unused objects");
        }
        Ok(released)
    }

    pub fn force_release_asset(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        self.state.release_asset(object)
    }

    pub fn force_release_resource(&mut self, object: ObjectId) -> Result<(), ResourceError> {
        self.state.release_bundle(object)
    }

    /// Read a loose binary through the fetcher. Returns the request serial.
    pub fn load_binary(
        &mut self,
        table: &ResourceTable,
        fetcher: &dyn ByteFetcher,
        binary_name: &str,
    ) -> Result<u64, LoadFailure> {
        let info = binary_resource(table, binary_name)?;
        if info.uses_packed_store() {
            return Err(LoadFailure::new(
                LoadResourceStatus::TypeError,
                format!("binary '{binary_name}' is in a packed store; load it from the packed store"),
            ));
        }
        let serial = self.allocate_serial();
        let path = info.name().full_name().to_string();
        let source = if info.in_read_only() {
            FetchSource::ReadOnly(path)
        } else {
            FetchSource::ReadWrite(path)
        };
        self.pending_binaries.insert(
            serial,
            PendingBinary {
                binary_name: binary_name.to_string(),
                resource: info.name().clone(),
                load_type: info.load_type(),
                hash: info.hash(),
            },
        );
        fetcher.fetch(source, self.binaries.reply(serial));
        Ok(serial)
    }

    /// Read a binary stored in a packed store, synchronously.
    pub fn load_binary_from_packed_store(
        &self,
        table: &ResourceTable,
        storage: &ResourceStorage,
        binary_name: &str,
    ) -> Result<Vec<u8>, LoadFailure> {
        let info = binary_resource(table, binary_name)?;
        if !info.uses_packed_store() {
            return Err(LoadFailure::new(
                LoadResourceStatus::TypeError,
                format!("binary '{binary_name}' is not in a packed store"),
            ));
        }
        let mut bytes = storage
            .read_resource(info)
            .map_err(|e| LoadFailure::new(LoadResourceStatus::NotExist, e.to_string()))?;
        if info.load_type().is_encrypted() {
            self.state
                .decryptor
                .decrypt(info.name(), info.load_type(), info.hash(), &mut bytes);
        }
        Ok(bytes)
    }

    /// Plaintext length of a ready binary.
    pub fn binary_length(&self, table: &ResourceTable, binary_name: &str) -> Option<u64> {
        binary_resource(table, binary_name).ok().map(|info| info.length())
    }

    /// Tier and path of a ready loose binary.
    pub fn binary_path(&self, table: &ResourceTable, binary_name: &str) -> Option<BinaryLocation> {
        let info = binary_resource(table, binary_name).ok()?;
        if info.uses_packed_store() {
            return None;
        }
        Some(BinaryLocation {
            in_read_only: info.in_read_only(),
            path: info.name().full_name().to_string(),
        })
    }

    /// Fail every waiting task that needs `resource`.
    pub fn fail_waiting_for(&mut self, resource: &ResourceName, message: &str) -> usize {
        let removed = self
            .pool
            .remove_waiting_where(|t| !t.done && &t.resource == resource);
        let count = removed.len();
        for mut task in removed {
            let message = format!("resource '{resource}' is not ready: {message}");
            self.state
                .fail_task(&mut task, LoadResourceStatus::NotReady, message);
        }
        self.settle_outcomes();
        count
    }

    pub fn tick(&mut self, table: &ResourceTable, storage: &ResourceStorage) -> Vec<LoaderEvent> {
        self.drain_bundle_replies();
        self.drain_asset_replies();
        self.drain_scene_replies();
        self.drain_binary_replies();
        self.settle_outcomes();

        let mut env = LoadEnv {
            table,
            storage,
            state: &mut self.state,
        };
        self.pool.tick(&mut env);
        self.settle_outcomes();

        record_waiting_tasks(self.pool.waiting_task_count());
        std::mem::take(&mut self.state.events)
    }

    /// Drop all pending work. Loaded objects stay pooled.
    pub fn shutdown(&mut self) {
        let dropped = self.pool.clear();
        if !dropped.is_empty() {
            info!(count = dropped.len(), "dropped pending load tasks");
        }
        self.state.loading_assets.clear();
        self.state.loading_resources.clear();
        self.state.outcomes.clear();
        self.pending_binaries.clear();
        self.pending_unloads.clear();
        self.update_requests.clear();
    }

    fn allocate_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    fn reject(&self, asset_name: &str, failure: LoadFailure) -> LoadFailure {
        debug!(asset = %asset_name, error = %failure, "load request rejected");
        record_load(failure.status);
        failure
    }

    fn submit(
        &mut self,
        table: &ResourceTable,
        asset_name: &str,
        kind: LoadTaskKind,
        priority: Priority,
    ) -> Result<u64, LoadFailure> {
        let mut path = vec![asset_name.to_string()];
        let mut updates = Vec::new();
        let plan = match self.plan(table, asset_name, &mut path, &mut updates) {
            Ok(plan) => plan,
            Err(failure) => return Err(self.reject(asset_name, failure)),
        };
        for resource in updates {
            if !self.update_requests.contains(&resource) {
                self.update_requests.push(resource);
            }
        }
        let serial = self.enqueue(plan, kind, priority);
        let _span = ResourceSpan::load(serial, asset_name).entered();
        debug!(waiting = self.pool.waiting_task_count(), "load queued");
        Ok(serial)
    }

    /// Resolve an asset and, depth first, its dependencies.
    ///
    /// Dependencies are planned whether or not the asset is pooled right now.
    fn plan(
        &self,
        table: &ResourceTable,
        asset_name: &str,
        path: &mut Vec<String>,
        updates: &mut Vec<ResourceName>,
    ) -> Result<PlannedLoad, LoadFailure> {
        let asset = table.asset(asset_name).ok_or_else(|| {
            LoadFailure::new(
                LoadResourceStatus::NotExist,
                format!("asset '{asset_name}' is not registered"),
            )
        })?;
        let info = table.resource(asset.resource()).ok_or_else(|| {
            LoadFailure::new(
                LoadResourceStatus::NotExist,
                format!("resource '{}' is not registered", asset.resource()),
            )
        })?;
        if info.is_binary() {
            return Err(LoadFailure::new(
                LoadResourceStatus::TypeError,
                format!("'{asset_name}' is a binary; load it as a binary"),
            ));
        }
        if !info.is_ready() {
            if self.mode != ResourceMode::UpdatableWhilePlaying {
                return Err(LoadFailure::new(
                    LoadResourceStatus::NotReady,
                    format!("resource '{}' is not ready", info.name()),
                ));
            }
            updates.push(info.name().clone());
        }

        let mut children = Vec::new();
        for dependency in asset.dependencies() {
            if path.iter().any(|p| p == dependency) {
                return Err(LoadFailure::new(
                    LoadResourceStatus::DependencyError,
                    format!("dependency cycle through '{dependency}'"),
                ));
            }
            path.push(dependency.clone());
            let child = self
                .plan(table, dependency, path, updates)
                .map_err(|e| {
                    LoadFailure::new(
                        LoadResourceStatus::DependencyError,
                        format!("dependency '{dependency}' of '{asset_name}': {}", e.message),
                    )
                })?;
            path.pop();
            children.push(child);
        }
        Ok(PlannedLoad {
            asset_name: asset_name.to_string(),
            resource: info.name().clone(),
            children,
        })
    }

    /// Dependency tasks enter the pool before their parent.
    fn enqueue(&mut self, plan: PlannedLoad, kind: LoadTaskKind, priority: Priority) -> u64 {
        let serial = self.allocate_serial();
        let dependencies = plan.children.iter().map(|c| c.asset_name.clone()).collect();
        for child in plan.children {
            self.enqueue(child, LoadTaskKind::Dependency { parent: serial }, priority);
        }
        self.pool.add_task(LoadTask::new(
            serial,
            priority,
            kind,
            plan.asset_name,
            plan.resource,
            dependencies,
        ));
        serial
    }

    fn drain_bundle_replies(&mut self) {
        for (serial, result) in self.state.bundle_replies.drain() {
            let Some(task) = self.pool.task_mut(serial).filter(|t| !t.done) else {
                if let Ok(bundle) = result {
                    self.state.decoder.release_bundle(&bundle);
                }
                continue;
            };
            let state = &mut self.state;
            state.loading_resources.remove(&task.resource);
            match result {
                Ok(bundle) => {
                    let id = state.bundles.register(
                        task.resource.full_name().to_string(),
                        state::BundleObject {
                            target: bundle,
                            dependencies: Default::default(),
                        },
                        true,
                    );
                    state.request_asset(task, id);
                }
                Err(message) => {
                    state.loading_assets.remove(&task.asset_name);
                    let message = format!("cannot parse resource '{}': {message}", task.resource);
                    state.fail_task(task, LoadResourceStatus::AssetError, message);
                }
            }
        }
    }

    fn drain_asset_replies(&mut self) {
        for (serial, result) in self.state.asset_replies.drain() {
            let Some(task) = self.pool.task_mut(serial).filter(|t| !t.done) else {
                if let Ok(asset) = result {
                    self.state.decoder.release_asset(&asset);
                }
                continue;
            };
            let state = &mut self.state;
            state.loading_assets.remove(&task.asset_name);
            let Some(bundle) = task.bundle else {
                warn!(serial, "asset completion without a bundle");
                continue;
            };
            match result {
                Ok(asset) => {
                    let object = state.adopt_asset(task, bundle, asset);
                    task.dependency_objects.clear();
                    state.succeed_task(task, object);
                }
                Err(message) => {
                    if let Err(e) = state.bundles.unspawn(bundle) {
                        warn!(error = %e, "bundle spawn lost");
                    }
                    let message = format!("cannot load asset '{}': {message}", task.asset_name);
                    state.fail_task(task, LoadResourceStatus::AssetError, message);
                }
            }
        }
    }

    fn drain_scene_replies(&mut self) {
        for (token, result) in self.scene_replies.drain() {
            let Some(scene_name) = self.pending_unloads.remove(&token) else {
                continue;
            };
            match result {
                Ok(()) => {
                    if let Some(object) = self.state.scenes.remove(&scene_name) {
                        if let Err(e) = self.state.assets.unspawn(object) {
                            warn!(error = %e, scene = %scene_name, "scene spawn lost");
                        }
                        if self.state.can_release_asset(object) {
                            if let Err(e) = self.state.release_asset(object) {
                                warn!(error = %e, scene = %scene_name, "cannot release scene object");
                            }
                        }
                    }
                    self.state.events.push(LoaderEvent::SceneUnloaded { scene_name });
                }
                Err(message) => self
                    .state
                    .events
                    .push(LoaderEvent::UnloadSceneFailure { scene_name, message }),
            }
        }
    }

    fn drain_binary_replies(&mut self) {
        for (serial, result) in self.binaries.drain() {
            let Some(pending) = self.pending_binaries.remove(&serial) else {
                continue;
            };
            let event = match result {
                Ok(mut bytes) => {
                    if pending.load_type.is_encrypted() {
                        self.state
                            .decryptor
                            .decrypt(&pending.resource, pending.load_type, pending.hash, &mut bytes);
                    }
                    record_load(LoadResourceStatus::Success);
                    LoaderEvent::LoadBinarySuccess {
                        serial,
                        binary_name: pending.binary_name,
                        bytes,
                    }
                }
                Err(e) => {
                    record_load(LoadResourceStatus::NotExist);
                    LoaderEvent::LoadBinaryFailure {
                        serial,
                        binary_name: pending.binary_name,
                        status: LoadResourceStatus::NotExist,
                        message: e.to_string(),
                    }
                }
            };
            self.state.events.push(event);
        }
    }

    /// Route dependency results to their parents until none are left.
    fn settle_outcomes(&mut self) {
        while !self.state.outcomes.is_empty() {
            for outcome in std::mem::take(&mut self.state.outcomes) {
                match outcome {
                    Outcome::Delivered {
                        parent,
                        dependency,
                        object,
                    } => match self.pool.task_mut(parent).filter(|t| !t.done) {
                        Some(task) => {
                            task.dependency_objects.push(object);
                            task.reported_dependencies += 1;
                            if task.parent().is_none() {
                                self.state.events.push(LoaderEvent::DependencyLoaded {
                                    serial: parent,
                                    asset_name: task.asset_name.clone(),
                                    dependency,
                                    loaded: task.reported_dependencies,
                                    total: task.dependencies.len(),
                                });
                            }
                        }
                        None => {
                            if let Err(e) = self.state.assets.unspawn(object) {
                                warn!(error = %e, "orphaned dependency spawn lost");
                            }
                        }
                    },
                    Outcome::DependencyFailed {
                        parent,
                        dependency,
                        message,
                    } => {
                        if let Some(task) = self.pool.task_mut(parent).filter(|t| !t.done) {
                            let message = format!("dependency '{dependency}' failed: {message}");
                            self.state
                                .fail_task(task, LoadResourceStatus::DependencyError, message);
                        }
                    }
                }
            }
        }
    }
}

/// A registered, ready binary resource behind `binary_name`.
fn binary_resource<'t>(table: &'t ResourceTable, binary_name: &str) -> Result<&'t ResourceInfo, LoadFailure> {
    let info = table
        .asset(binary_name)
        .and_then(|a| table.resource(a.resource()))
        .ok_or_else(|| {
            LoadFailure::new(
                LoadResourceStatus::NotExist,
                format!("binary '{binary_name}' is not registered"),
            )
        })?;
    if !info.is_binary() {
        return Err(LoadFailure::new(
            LoadResourceStatus::TypeError,
            format!("'{binary_name}' is not a binary"),
        ));
    }
    if !info.is_ready() {
        return Err(LoadFailure::new(
            LoadResourceStatus::NotReady,
            format!("binary '{binary_name}' is not ready"),
        ));
    }
    Ok(info)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
