//! Runtime configuration loading from environment variables or TOML.
//!
//! All configuration values are loaded from `RESVAULT_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `RESVAULT_MODE` | updatable | `package`, `updatable` or `updatable-while-playing` |
//! | `RESVAULT_VARIANT` | (none) | Active resource variant |
//! | `RESVAULT_IGNORE_OTHER_VARIANT` | false | Keep foreign-variant files in the read-write tier |
//! | `RESVAULT_UPDATE_PREFIX_URI` | (empty) | Base URI for remote manifest and resources |
//! | `RESVAULT_REMOTE_MANIFEST` | remote_manifest.dat | Remote manifest file name |
//! | `RESVAULT_READ_ONLY_MANIFEST` | local_manifest.dat | Read-only tier manifest name |
//! | `RESVAULT_READ_WRITE_MANIFEST` | local_manifest.dat | Read-write tier manifest name |
//! | `RESVAULT_PACKAGE_MANIFEST` | package_manifest.dat | Package-mode manifest name |
//! | `RESVAULT_REMOTE_EXTENSION` | dat | Extension of hash-qualified remote files |
//! | `RESVAULT_UPDATE_RETRY_COUNT` | 3 | Retries per resource download |
//! | `RESVAULT_GENERATE_MANIFEST_THRESHOLD` | 1048576 | Bytes between read-write manifest rewrites |
//! | `RESVAULT_VERIFY_BYTES_PER_TICK` | 2097152 | Verifier byte budget per tick |
//! | `RESVAULT_LOAD_AGENT_COUNT` | 3 | Concurrent load agents |
//! | `RESVAULT_PACKED_STORE_MAX_ENTRIES` | 1024 | Entries per packed store created on demand |
//! | `RESVAULT_PACKED_STORE_MAX_BLOCKS` | 1048576 | Blocks per packed store created on demand |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageLimits;

/// How resources are sourced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceMode {
    /// Everything comes from the read-only package manifest.
    Package,
    /// Checker + updater; loads of not-ready resources are rejected.
    #[default]
    Updatable,
    /// Like `Updatable`, but a load of a not-ready resource triggers an
    /// on-demand update.
    UpdatableWhilePlaying,
}

impl ResourceMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "package" => Some(Self::Package),
            "updatable" => Some(Self::Updatable),
            "updatable-while-playing" | "updatable_while_playing" => Some(Self::UpdatableWhilePlaying),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Updatable => "updatable",
            Self::UpdatableWhilePlaying => "updatable-while-playing",
        }
    }

    pub fn is_updatable(self) -> bool {
        self != Self::Package
    }
}

pub const DEFAULT_UPDATE_RETRY_COUNT: usize = 3;
pub const DEFAULT_GENERATE_MANIFEST_THRESHOLD: u64 = 1024 * 1024;
pub const DEFAULT_VERIFY_BYTES_PER_TICK: u64 = 2 * 1024 * 1024;
pub const DEFAULT_LOAD_AGENT_COUNT: usize = 3;

/// All engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub mode: ResourceMode,
    pub variant: Option<String>,
    pub ignore_other_variant: bool,
    pub update_prefix_uri: String,
    pub remote_manifest_name: String,
    pub read_only_manifest_name: String,
    pub read_write_manifest_name: String,
    pub package_manifest_name: String,
    pub remote_extension: String,
    pub update_retry_count: usize,
    pub generate_manifest_threshold: u64,
    pub verify_bytes_per_tick: u64,
    pub load_agent_count: usize,
    pub packed_store_max_entries: usize,
    pub packed_store_max_blocks: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            mode: ResourceMode::default(),
            variant: None,
            ignore_other_variant: false,
            update_prefix_uri: String::new(),
            remote_manifest_name: "remote_manifest.dat".to_string(),
            read_only_manifest_name: "local_manifest.dat".to_string(),
            read_write_manifest_name: "local_manifest.dat".to_string(),
            package_manifest_name: "package_manifest.dat".to_string(),
            remote_extension: "dat".to_string(),
            update_retry_count: DEFAULT_UPDATE_RETRY_COUNT,
            generate_manifest_threshold: DEFAULT_GENERATE_MANIFEST_THRESHOLD,
            verify_bytes_per_tick: DEFAULT_VERIFY_BYTES_PER_TICK,
            load_agent_count: DEFAULT_LOAD_AGENT_COUNT,
            packed_store_max_entries: StorageLimits::default().max_entries,
            packed_store_max_blocks: StorageLimits::default().max_blocks,
        }
    }
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub mode: &'static str,
    pub variant: Option<String>,
    pub ignore_other_variant: bool,
    pub update_prefix_uri: String,
    pub remote_manifest_name: String,
    pub read_only_manifest_name: String,
    pub read_write_manifest_name: String,
    pub package_manifest_name: String,
    pub remote_extension: String,
    pub update_retry_count: usize,
    pub generate_manifest_threshold: u64,
    pub verify_bytes_per_tick: u64,
    pub load_agent_count: usize,
    pub packed_store_max_entries: usize,
    pub packed_store_max_blocks: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`1`/`true`/`yes`, `0`/`false`/`no`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no") => false,
        _ => default,
    }
}

fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val,
        _ => default.to_string(),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> ResourceConfig {
    let defaults = ResourceConfig::default();
    let mode = std::env::var("RESVAULT_MODE")
        .ok()
        .and_then(|v| ResourceMode::parse(&v))
        .unwrap_or(defaults.mode);
    let variant = std::env::var("RESVAULT_VARIANT")
        .ok()
        .filter(|v| !v.trim().is_empty());

    let config = ResourceConfig {
        mode,
        variant,
        ignore_other_variant: parse_bool("RESVAULT_IGNORE_OTHER_VARIANT", defaults.ignore_other_variant),
        update_prefix_uri: std::env::var("RESVAULT_UPDATE_PREFIX_URI").unwrap_or_default(),
        remote_manifest_name: parse_string("RESVAULT_REMOTE_MANIFEST", &defaults.remote_manifest_name),
        read_only_manifest_name: parse_string("RESVAULT_READ_ONLY_MANIFEST", &defaults.read_only_manifest_name),
        read_write_manifest_name: parse_string("RESVAULT_READ_WRITE_MANIFEST", &defaults.read_write_manifest_name),
        package_manifest_name: parse_string("RESVAULT_PACKAGE_MANIFEST", &defaults.package_manifest_name),
        remote_extension: parse_string("RESVAULT_REMOTE_EXTENSION", &defaults.remote_extension),
        update_retry_count: parse_usize("RESVAULT_UPDATE_RETRY_COUNT", defaults.update_retry_count),
        generate_manifest_threshold: parse_u64(
            "RESVAULT_GENERATE_MANIFEST_THRESHOLD",
            defaults.generate_manifest_threshold,
        ),
        verify_bytes_per_tick: parse_u64("RESVAULT_VERIFY_BYTES_PER_TICK", defaults.verify_bytes_per_tick),
        load_agent_count: parse_usize("RESVAULT_LOAD_AGENT_COUNT", defaults.load_agent_count),
        packed_store_max_entries: parse_usize(
            "RESVAULT_PACKED_STORE_MAX_ENTRIES",
            defaults.packed_store_max_entries,
        ),
        packed_store_max_blocks: parse_usize(
            "RESVAULT_PACKED_STORE_MAX_BLOCKS",
            defaults.packed_store_max_blocks,
        ),
    };
    config.with_floors()
}

/// Parse a TOML config. Absent keys take their defaults.
pub fn from_toml_str(text: &str) -> Result<ResourceConfig, ConfigError> {
    let config: ResourceConfig = toml::from_str(text)?;
    Ok(config.with_floors())
}

impl ResourceConfig {
    /// Clamp values that would stall the engine.
    fn with_floors(mut self) -> Self {
        self.verify_bytes_per_tick = self.verify_bytes_per_tick.max(1);
        self.load_agent_count = self.load_agent_count.max(1);
        self.packed_store_max_entries = self.packed_store_max_entries.max(1);
        self.packed_store_max_blocks = self.packed_store_max_blocks.max(1);
        self
    }

    pub fn storage_limits(&self) -> StorageLimits {
        StorageLimits {
            max_entries: self.packed_store_max_entries,
            max_blocks: self.packed_store_max_blocks,
        }
    }

    /// Remote URI of the authoritative manifest.
    pub fn remote_manifest_uri(&self) -> String {
        join_uri(&self.update_prefix_uri, &self.remote_manifest_name)
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            mode: self.mode.as_str(),
            variant: self.variant.clone(),
            ignore_other_variant: self.ignore_other_variant,
            update_prefix_uri: self.update_prefix_uri.clone(),
            remote_manifest_name: self.remote_manifest_name.clone(),
            read_only_manifest_name: self.read_only_manifest_name.clone(),
            read_write_manifest_name: self.read_write_manifest_name.clone(),
            package_manifest_name: self.package_manifest_name.clone(),
            remote_extension: self.remote_extension.clone(),
            update_retry_count: self.update_retry_count,
            generate_manifest_threshold: self.generate_manifest_threshold,
            verify_bytes_per_tick: self.verify_bytes_per_tick,
            load_agent_count: self.load_agent_count,
            packed_store_max_entries: self.packed_store_max_entries,
            packed_store_max_blocks: self.packed_store_max_blocks,
        }
    }
}

/// Join a prefix and a relative path with exactly one `/`.
pub fn join_uri(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/'))
}
