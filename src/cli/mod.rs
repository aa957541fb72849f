// Copyright 2024-2026 resvault Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the `resvault` binary.
//!
//! ## Usage
//!
//! ```bash
//! resvault inspect local_manifest.dat --json   # Summarise a manifest file
//! resvault verify /var/lib/game/rw             # Scrub a read-write tier, exits 0 when clean
//! resvault config show                         # Effective configuration
//! ```

pub mod config_cmd;
pub mod inspect_cmd;
pub mod verify_cmd;

pub use inspect_cmd::{run_inspect, ManifestReport};
pub use verify_cmd::{run_verify, VerifyReport};
