//! Package-mode initialiser.
//!
//! In package mode every resource ships in the read-only tier. The package
//! manifest is fetched once and each resource matching the active variant is
//! registered ready.

use tracing::{info, warn};

use crate::context::ResourceContext;
use crate::error::ResourceError;
use crate::manifest::{Manifest, ManifestKind};
use crate::model::ResourceInfo;
use crate::reply::ReplyQueue;
use crate::storage::{FetchResult, FetchSource};
use crate::telemetry::ResourceSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IniterEvent {
    Complete { resource_count: usize },
    Failed { message: String },
}

pub struct ResourceIniter {
    replies: ReplyQueue<FetchResult>,
    active_variant: Option<String>,
    started: bool,
    pending: bool,
}

impl ResourceIniter {
    pub fn new() -> Self {
        Self {
            replies: ReplyQueue::new(),
            active_variant: None,
            started: false,
            pending: false,
        }
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn init_resources(&mut self, ctx: &ResourceContext, active_variant: Option<&str>) -> Result<(), ResourceError> {
        if self.started {
            return Err(ResourceError::usage("resources have already been initialised"));
        }
        self.started = true;
        self.pending = true;
        self.active_variant = active_variant.map(String::from);
        info!(manifest = %ctx.config.package_manifest_name, "initialising package resources");
        ctx.fetcher.fetch(
            FetchSource::ReadOnly(ctx.config.package_manifest_name.clone()),
            self.replies.fresh(),
        );
        Ok(())
    }

    pub fn tick(&mut self, ctx: &mut ResourceContext) -> Vec<IniterEvent> {
        if !self.pending {
            return Vec::new();
        }
        let Some((_, result)) = self.replies.drain().pop() else {
            return Vec::new();
        };
        self.pending = false;

        let _span = ResourceSpan::phase("init").entered();
        match populate(ctx, result, self.active_variant.as_deref()) {
            Ok(resource_count) => {
                info!(resource_count, "package resources ready");
                vec![IniterEvent::Complete { resource_count }]
            }
            Err(message) => {
                warn!(error = %message, "package initialisation failed");
                vec![IniterEvent::Failed { message }]
            }
        }
    }
}

impl Default for ResourceIniter {
    fn default() -> Self {
        Self::new()
    }
}

fn populate(ctx: &mut ResourceContext, result: FetchResult, active_variant: Option<&str>) -> Result<usize, String> {
    let bytes = result.map_err(|e| format!("package manifest unavailable: {e}"))?;
    let manifest =
        Manifest::decode_as(&bytes, ManifestKind::Package).map_err(|e| format!("package manifest is invalid: {e}"))?;

    ctx.table
        .set_versions(manifest.applicable_version.clone(), manifest.internal_version);
    ctx.table
        .add_manifest_layout(&manifest, active_variant)
        .map_err(|e| e.to_string())?;

    let mut count = 0;
    for resource in manifest
        .resources
        .iter()
        .filter(|r| r.name.matches_variant(active_variant))
    {
        ctx.table
            .insert_resource(ResourceInfo::new(
                resource.name.clone(),
                resource.packed_store.clone(),
                resource.load_type,
                resource.length,
                resource.hash,
                resource.compressed_length,
                true,
                true,
            ))
            .map_err(|e| e.to_string())?;
        count += 1;
    }
    Ok(count)
}
