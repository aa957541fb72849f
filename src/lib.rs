//! resvault
//!
//! Tiered, content-addressed resource manifests for clients that run from a
//! read-only base install plus a patchable read-write overlay.
//!
//! # Components
//!
//! - **Checker**: reconciles the remote, read-only and read-write manifests
//!   into per-resource actions.
//! - **Updater**: extracts resource packs and drives network downloads, with
//!   integrity checks and incremental read-write manifest regeneration.
//! - **Verifier**: byte-budgeted integrity scrub of the read-write tier.
//! - **Loader**: dependency-ordered, deduplicated, spawn-counted loading of
//!   assets, scenes and binaries.
//! - **Initer**: package-mode bootstrap from the read-only tier.
//!
//! [`manager::ResourceManager`] owns them all and runs them from one
//! cooperative `tick()`. Nothing blocks and nothing spawns threads:
//! collaborators post completions to reply queues that each component
//! drains on its tick.

pub mod checker;
pub mod cli;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod hash;
pub mod initer;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod model;
pub mod reply;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod transform;
pub mod updater;
pub mod verifier;

pub use config::{ResourceConfig, ResourceMode};
pub use context::ResourceContext;
pub use error::{IntegrityError, LoadFailure, LoadResourceStatus, ResourceError};
pub use manager::{Collaborators, ResourceEvent, ResourceManager};
pub use model::{AssetInfo, LoadType, ResourceInfo, ResourceName, ResourceTable};
