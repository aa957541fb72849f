// Copyright 2024-2026 resvault Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration from environment variables or a TOML
//! file; no resource tier is touched.

use crate::config::{self, EffectiveConfig, ResourceConfig};

/// Print effective config as key-value pairs (or JSON) to stdout.
pub fn run_show(json: bool) -> i32 {
    let cfg = config::load().effective_config();
    emit(&cfg, json)
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults(json: bool) -> i32 {
    let cfg = ResourceConfig::default().effective_config();
    emit(&cfg, json)
}

/// Parse a TOML config file and report what it resolves to.
///
/// Returns 0 if valid, 1 if the file cannot be read or parsed, or if it
/// selects an update mode without an update prefix.
pub fn run_validate(path: &str) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Cannot read {}: {}", path, e);
            return 1;
        }
    };
    let cfg = match config::from_toml_str(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    if cfg.mode.is_updatable() && cfg.update_prefix_uri.is_empty() {
        eprintln!("WARNING: mode '{}' needs update_prefix_uri", cfg.mode.as_str());
        return 1;
    }
    println!("Configuration is valid.");
    0
}

fn emit(cfg: &EffectiveConfig, json: bool) -> i32 {
    if !json {
        print_config(cfg);
        return 0;
    }
    match serde_json::to_string_pretty(cfg) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Cannot serialise configuration: {}", e);
            1
        }
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("RESVAULT_MODE={}", cfg.mode);
    println!("RESVAULT_VARIANT={}", cfg.variant.as_deref().unwrap_or(""));
    println!("RESVAULT_IGNORE_OTHER_VARIANT={}", cfg.ignore_other_variant);
    println!("RESVAULT_UPDATE_PREFIX_URI={}", cfg.update_prefix_uri);
    println!("RESVAULT_REMOTE_MANIFEST={}", cfg.remote_manifest_name);
    println!("RESVAULT_READ_ONLY_MANIFEST={}", cfg.read_only_manifest_name);
    println!("RESVAULT_READ_WRITE_MANIFEST={}", cfg.read_write_manifest_name);
    println!("RESVAULT_PACKAGE_MANIFEST={}", cfg.package_manifest_name);
    println!("RESVAULT_REMOTE_EXTENSION={}", cfg.remote_extension);
    println!("RESVAULT_UPDATE_RETRY_COUNT={}", cfg.update_retry_count);
    println!("RESVAULT_GENERATE_MANIFEST_THRESHOLD={}", cfg.generate_manifest_threshold);
    println!("RESVAULT_VERIFY_BYTES_PER_TICK={}", cfg.verify_bytes_per_tick);
    println!("RESVAULT_LOAD_AGENT_COUNT={}", cfg.load_agent_count);
    println!("RESVAULT_PACKED_STORE_MAX_ENTRIES={}", cfg.packed_store_max_entries);
    println!("RESVAULT_PACKED_STORE_MAX_BLOCKS={}", cfg.packed_store_max_blocks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_accepts_package_mode() {
        let file = write_config("mode = \"package\"\n");
        assert_eq!(run_validate(file.path().to_str().unwrap()), 0);
    }

    #[test]
    fn test_validate_requires_prefix_for_updates() {
        let file = write_config("mode = \"updatable\"\n");
        assert_eq!(run_validate(file.path().to_str().unwrap()), 1);
        let file = write_config("mode = \"updatable\"\nupdate_prefix_uri = \"https://cdn.example.com/1.0\"\n");
        assert_eq!(run_validate(file.path().to_str().unwrap()), 0);
    }

    #[test]
    fn test_validate_rejects_bad_toml() {
        let file = write_config("update_retry_count = \"three\"\n");
        assert_eq!(run_validate(file.path().to_str().unwrap()), 1);
        assert_eq!(run_validate("/nonexistent/resvault.toml"), 1);
    }

    #[test]
    fn test_defaults_print_in_both_formats() {
        assert_eq!(run_defaults(false), 0);
        assert_eq!(run_defaults(true), 0);
    }
}
