//! Loader bookkeeping shared by the agents and the reply handlers.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use super::decoder::AssetDecoder;
use super::object_pool::{ObjectId, ObjectPool};
use super::task::{LoadTask, LoadTaskKind};
use super::{LoadStage, LoaderEvent};
use crate::error::{LoadResourceStatus, ResourceError};
use crate::model::ResourceName;
use crate::reply::ReplyQueue;
use crate::telemetry::record_load;
use crate::transform::Decryptor;

pub(crate) struct AssetObject<A> {
    pub(crate) target: A,
    /// Dependency assets this object holds one spawn of each.
    pub(crate) dependencies: Vec<ObjectId>,
    pub(crate) bundle: ObjectId,
}

pub(crate) struct BundleObject<B> {
    pub(crate) target: B,
    pub(crate) dependencies: BTreeSet<ObjectId>,
}

/// Result of a dependency task, addressed to its parent.
pub(crate) enum Outcome {
    Delivered {
        parent: u64,
        dependency: String,
        object: ObjectId,
    },
    DependencyFailed {
        parent: u64,
        dependency: String,
        message: String,
    },
}

pub(crate) struct LoaderState<D: AssetDecoder> {
    pub(crate) decoder: D,
    pub(crate) decryptor: Box<dyn Decryptor>,
    pub(crate) assets: ObjectPool<AssetObject<D::Asset>>,
    pub(crate) bundles: ObjectPool<BundleObject<D::Bundle>>,
    /// Live asset objects that depend on each asset.
    pub(crate) asset_dependency_count: HashMap<ObjectId, usize>,
    /// Live bundles that depend on each bundle.
    pub(crate) resource_dependency_count: HashMap<ObjectId, usize>,
    pub(crate) loading_assets: HashSet<String>,
    pub(crate) loading_resources: HashSet<ResourceName>,
    pub(crate) scenes: HashMap<String, ObjectId>,
    pub(crate) bundle_replies: ReplyQueue<Result<D::Bundle, String>>,
    pub(crate) asset_replies: ReplyQueue<Result<D::Asset, String>>,
    pub(crate) outcomes: Vec<Outcome>,
    pub(crate) events: Vec<LoaderEvent>,
}

impl<D: AssetDecoder> LoaderState<D> {
    pub(crate) fn new(decoder: D, decryptor: Box<dyn Decryptor>) -> Self {
        Self {
            decoder,
            decryptor,
            assets: ObjectPool::new("asset"),
            bundles: ObjectPool::new("resource"),
            asset_dependency_count: HashMap::new(),
            resource_dependency_count: HashMap::new(),
            loading_assets: HashSet::new(),
            loading_resources: HashSet::new(),
            scenes: HashMap::new(),
            bundle_replies: ReplyQueue::new(),
            asset_replies: ReplyQueue::new(),
            outcomes: Vec::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn emit_stage(&mut self, task: &LoadTask, stage: LoadStage) {
        if task.parent().is_none() {
            self.events.push(LoaderEvent::LoadAssetUpdate {
                serial: task.serial,
                asset_name: task.asset_name.clone(),
                stage,
            });
        }
    }

    /// Ask the decoder for the task's asset out of a spawned bundle.
    pub(crate) fn request_asset(&mut self, task: &mut LoadTask, bundle: ObjectId) {
        task.bundle = Some(bundle);
        self.emit_stage(task, LoadStage::LoadAsset);
        let reply = self.asset_replies.reply(task.serial);
        match self.bundles.get(bundle) {
            Some(object) => self.decoder.load_asset(
                &object.target,
                &task.asset_name,
                task.asset_type(),
                task.is_scene(),
                reply,
            ),
            None => {
                reply.send(Err(format!("bundle {bundle} vanished")));
            }
        }
    }

    /// Create the asset object for a decoded asset. The task's bundle and
    /// dependency spawns pass to the new object.
    pub(crate) fn adopt_asset(&mut self, task: &LoadTask, bundle: ObjectId, target: D::Asset) -> ObjectId {
        let mut bundle_dependencies = BTreeSet::new();
        for dependency in &task.dependency_objects {
            *self.asset_dependency_count.entry(*dependency).or_default() += 1;
            if let Some(object) = self.assets.get(*dependency) {
                if object.bundle != bundle {
                    bundle_dependencies.insert(object.bundle);
                }
            }
        }
        if let Some(object) = self.bundles.get_mut(bundle) {
            for dependency in bundle_dependencies {
                if object.dependencies.insert(dependency) {
                    *self.resource_dependency_count.entry(dependency).or_default() += 1;
                }
            }
        }
        self.assets.register(
            task.asset_name.clone(),
            AssetObject {
                target,
                dependencies: task.dependency_objects.clone(),
                bundle,
            },
            true,
        )
    }

    pub(crate) fn succeed_task(&mut self, task: &mut LoadTask, object: ObjectId) {
        task.done = true;
        match &task.kind {
            LoadTaskKind::Asset { .. } => {
                record_load(LoadResourceStatus::Success);
                self.events.push(LoaderEvent::LoadAssetSuccess {
                    serial: task.serial,
                    asset_name: task.asset_name.clone(),
                    object,
                });
            }
            LoadTaskKind::Scene => {
                record_load(LoadResourceStatus::Success);
                self.scenes.insert(task.asset_name.clone(), object);
                self.events.push(LoaderEvent::LoadSceneSuccess {
                    serial: task.serial,
                    scene_name: task.asset_name.clone(),
                    object,
                });
            }
            LoadTaskKind::Dependency { parent } => self.outcomes.push(Outcome::Delivered {
                parent: *parent,
                dependency: task.asset_name.clone(),
                object,
            }),
        }
    }

    /// Finish a task with a failure. Dependency spawns collected so far are
    /// given back.
    pub(crate) fn fail_task(&mut self, task: &mut LoadTask, status: LoadResourceStatus, message: String) {
        task.done = true;
        for dependency in std::mem::take(&mut task.dependency_objects) {
            if let Err(e) = self.assets.unspawn(dependency) {
                warn!(error = %e, "dependency spawn lost");
            }
        }
        debug!(serial = task.serial, asset = %task.asset_name, %status, %message, "load failed");
        match &task.kind {
            LoadTaskKind::Asset { .. } => {
                record_load(status);
                self.events.push(LoaderEvent::LoadAssetFailure {
                    serial: task.serial,
                    asset_name: task.asset_name.clone(),
                    status,
                    message,
                });
            }
            LoadTaskKind::Scene => {
                record_load(status);
                self.events.push(LoaderEvent::LoadSceneFailure {
                    serial: task.serial,
                    scene_name: task.asset_name.clone(),
                    status,
                    message,
                });
            }
            LoadTaskKind::Dependency { parent } => self.outcomes.push(Outcome::DependencyFailed {
                parent: *parent,
                dependency: task.asset_name.clone(),
                message,
            }),
        }
    }

    pub(crate) fn can_release_asset(&self, id: ObjectId) -> bool {
        self.assets.spawn_count(id) == Some(0) && self.asset_dependency_count.get(&id).copied().unwrap_or(0) == 0
    }

    pub(crate) fn can_release_bundle(&self, id: ObjectId) -> bool {
        self.bundles.spawn_count(id) == Some(0) && self.resource_dependency_count.get(&id).copied().unwrap_or(0) == 0
    }

    /// Drop an asset object, giving back its dependency and bundle spawns.
    pub(crate) fn release_asset(&mut self, id: ObjectId) -> Result<(), ResourceError> {
        if !self.can_release_asset(id) {
            return Err(ResourceError::fault(format!("asset object {id} is still in use")));
        }
        let object = self
            .assets
            .remove(id)
            .ok_or_else(|| ResourceError::fault(format!("asset object {id} does not exist")))?;
        self.asset_dependency_count.remove(&id);
        for dependency in &object.dependencies {
            if let Some(count) = self.asset_dependency_count.get_mut(dependency) {
                *count = count.saturating_sub(1);
            }
            self.assets.unspawn(*dependency)?;
        }
        self.bundles.unspawn(object.bundle)?;
        self.decoder.release_asset(&object.target);
        Ok(())
    }

    pub(crate) fn release_bundle(&mut self, id: ObjectId) -> Result<(), ResourceError> {
        if !self.can_release_bundle(id) {
            return Err(ResourceError::fault(format!("resource object {id} is still in use")));
        }
        let object = self
            .bundles
            .remove(id)
            .ok_or_else(|| ResourceError::fault(format!("resource object {id} does not exist")))?;
        self.resource_dependency_count.remove(&id);
        for dependency in &object.dependencies {
            if let Some(count) = self.resource_dependency_count.get_mut(dependency) {
                *count = count.saturating_sub(1);
            }
        }
        self.decoder.release_bundle(&object.target);
        Ok(())
    }

    /// Release every unused object until nothing more frees up.
    pub(crate) fn release_unused(&mut self) -> Result<usize, ResourceError> {
        let mut released = 0;
        loop {
            let assets: Vec<ObjectId> = self
                .assets
                .ids()
                .into_iter()
                .filter(|id| self.can_release_asset(*id))
                .collect();
            for id in &assets {
                self.release_asset(*id)?;
            }
            let bundles: Vec<ObjectId> = self
                .bundles
                .ids()
                .into_iter()
                .filter(|id| self.can_release_bundle(*id))
                .collect();
            for id in &bundles {
                self.release_bundle(*id)?;
            }
            if assets.is_empty() && bundles.is_empty() {
                return Ok(released);
            }
            released += assets.len() + bundles.len();
        }
    }
}
