//! Load agent: decides whether a waiting task can start and kicks off its
//! first asynchronous step.

use std::marker::PhantomData;

use tracing::warn;

use super::decoder::{AssetDecoder, BundleSource};
use super::state::LoaderState;
use super::task::LoadTask;
use super::LoadStage;
use crate::error::{LoadResourceStatus, ResourceError};
use crate::model::{ResourceInfo, ResourceTable};
use crate::scheduler::{RunTask, StartTaskStatus, TaskAgent};
use crate::storage::ResourceStorage;

/// Borrowed view handed to agents for one pool tick.
pub(crate) struct LoadEnv<'a, D: AssetDecoder> {
    pub(crate) table: &'a ResourceTable,
    pub(crate) storage: &'a ResourceStorage,
    pub(crate) state: &'a mut LoaderState<D>,
}

pub(crate) struct LoadAgent<D> {
    _decoder: PhantomData<fn() -> D>,
}

impl<D> LoadAgent<D> {
    pub(crate) fn new() -> Self {
        Self { _decoder: PhantomData }
    }
}

impl<D: AssetDecoder> TaskAgent for LoadAgent<D> {
    type Task = LoadTask;
}

impl<'a, D: AssetDecoder> RunTask<LoadEnv<'a, D>> for LoadAgent<D> {
    fn start(&mut self, task: &mut LoadTask, env: &mut LoadEnv<'a, D>) -> StartTaskStatus {
        if task.done {
            return StartTaskStatus::Done;
        }
        let Some(info) = env.table.resource(&task.resource) else {
            let message = format!("resource '{}' is not registered", task.resource);
            env.state.fail_task(task, LoadResourceStatus::NotExist, message);
            return StartTaskStatus::UnknownError;
        };
        if !info.is_ready() {
            return StartTaskStatus::HasToWait;
        }
        let state = &mut *env.state;
        if state.loading_assets.contains(&task.asset_name) {
            return StartTaskStatus::HasToWait;
        }

        if !task.is_scene() {
            if let Some(object) = state.assets.spawn(&task.asset_name) {
                for dependency in std::mem::take(&mut task.dependency_objects) {
                    if let Err(e) = state.assets.unspawn(dependency) {
                        warn!(error = %e, "dependency spawn lost");
                    }
                }
                state.succeed_task(task, object);
                return StartTaskStatus::Done;
            }
        }

        if !task.all_dependencies_reported()
            || task
                .dependency_objects
                .iter()
                .any(|d| !state.assets.contains(*d))
        {
            return StartTaskStatus::HasToWait;
        }
        if state.loading_resources.contains(&task.resource) {
            return StartTaskStatus::HasToWait;
        }

        state.loading_assets.insert(task.asset_name.clone());
        if let Some(bundle) = state.bundles.spawn(&task.resource.full_name()) {
            state.request_asset(task, bundle);
            return StartTaskStatus::CanResume;
        }

        state.loading_resources.insert(task.resource.clone());
        state.emit_stage(task, LoadStage::ReadResource);
        let source = match bundle_source(env.storage, &*state.decryptor, info) {
            Ok(source) => source,
            Err(e) => {
                state.loading_resources.remove(&task.resource);
                state.loading_assets.remove(&task.asset_name);
                let message = format!("cannot read resource '{}': {e}", task.resource);
                state.fail_task(task, LoadResourceStatus::NotExist, message);
                return StartTaskStatus::UnknownError;
            }
        };
        state.emit_stage(task, LoadStage::ParseResource);
        let reply = state.bundle_replies.reply(task.serial);
        state.decoder.parse_bundle(&task.resource, source, reply);
        StartTaskStatus::CanResume
    }
}

/// Loose plain files are handed over by path; everything else is read and
/// decrypted here.
fn bundle_source(
    storage: &ResourceStorage,
    decryptor: &dyn crate::transform::Decryptor,
    info: &ResourceInfo,
) -> Result<BundleSource, ResourceError> {
    let load_type = info.load_type();
    if !load_type.is_encrypted() && !info.uses_packed_store() {
        return Ok(BundleSource::File {
            read_only: info.in_read_only(),
            path: info.name().full_name().to_string(),
        });
    }
    let mut bytes = storage.read_resource(info)?;
    if load_type.is_encrypted() {
        decryptor.decrypt(info.name(), load_type, info.hash(), &mut bytes);
    }
    Ok(BundleSource::Memory(bytes))
}
