//! resvault entry point.
//!
//! Offline tooling over resource manifests and tiers:
//! - Manifest inspection
//! - Read-write tier verification
//! - Configuration display and validation
//!
//! ## CLI Subcommands
//!
//! - `resvault inspect <FILE>` - Summarise a manifest (exit 0/1)
//! - `resvault verify <DIR>` - Scrub a read-write directory (exit 0/1)
//! - `resvault config show|defaults|validate` - Configuration

use std::process::ExitCode;

use resvault::cli::{config_cmd, run_inspect, run_verify};
use resvault::telemetry::{init_logging, LogConfig, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    if let Err(e) = init_logging(&LogConfig::from_env(LogFormat::Pretty)) {
        eprintln!("Logging disabled: {}", e);
    }

    let json_output = args.iter().skip(2).any(|a| a == "--json");
    match command {
        "inspect" => {
            let Some(path) = positional(&args) else {
                print_command_help("inspect");
                return ExitCode::FAILURE;
            };
            exit_code(run_inspect(path, json_output))
        }
        "verify" => {
            let Some(dir) = positional(&args) else {
                print_command_help("verify");
                return ExitCode::FAILURE;
            };
            exit_code(run_verify(dir).await)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => exit_code(config_cmd::run_show(json_output)),
                "defaults" => exit_code(config_cmd::run_defaults(json_output)),
                "validate" => {
                    let Some(path) = flag_value(&args, "--file") else {
                        eprintln!("config validate requires --file PATH");
                        print_command_help("config");
                        return ExitCode::FAILURE;
                    };
                    exit_code(config_cmd::run_validate(path))
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("resvault {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// First argument after the command that is not a flag.
fn positional(args: &[String]) -> Option<&str> {
    args.iter()
        .skip(2)
        .map(|s| s.as_str())
        .find(|a| !a.starts_with("--"))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn print_usage() {
    eprintln!(
        "resvault {} - Tiered resource manifest tooling

USAGE:
    resvault <COMMAND> [OPTIONS]

COMMANDS:
    inspect <FILE>  Summarise a manifest file
    verify <DIR>    Verify a read-write resource directory
    config          Show or validate configuration
    version         Print version
    help [COMMAND]  Show help

ENVIRONMENT:
    RESVAULT_MODE               package | updatable | updatable-while-playing
    RESVAULT_VARIANT            Active resource variant
    RESVAULT_UPDATE_PREFIX_URI  Remote origin for updates
    RESVAULT_LOG                Log filter (default: info)
    RESVAULT_LOG_FORMAT         json | pretty (default: pretty)

Run 'resvault help <COMMAND>' for details.",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_command_help(command: &str) {
    match command {
        "inspect" => {
            eprintln!(
                "resvault inspect - Summarise a manifest file

USAGE:
    resvault inspect <FILE> [--json]

Decodes any manifest kind (package, updatable, read-only, read-write,
resource pack) and prints its versions, counts and total lengths.

EXIT CODES:
    0  Manifest decoded
    1  File missing or not a valid manifest

EXAMPLES:
    resvault inspect remote_manifest.dat
    resvault inspect local_manifest.dat --json
"
            );
        }
        "verify" => {
            eprintln!(
                "resvault verify - Verify a read-write resource directory

USAGE:
    resvault verify <DIR>

Checks every resource listed in the directory's read-write manifest for
length and hash. Corrupt resources are deleted and the manifest is
rewritten without them.

EXIT CODES:
    0  Every resource verified
    1  At least one resource failed, or the directory is unusable

EXAMPLES:
    resvault verify /var/lib/game/rw
"
            );
        }
        "config" => {
            eprintln!(
                "resvault config - Manage configuration

USAGE:
    resvault config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration (env overrides applied)
    defaults       Show default configuration
    validate       Validate a TOML configuration file

OPTIONS:
    --json         Output in JSON format
    --file PATH    Configuration file path (validate)

EXAMPLES:
    resvault config show
    resvault config defaults --json
    resvault config validate --file resvault.toml
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'resvault help' for general usage.",
                command
            );
        }
    }
}
