//! CLI argument parsing for cachelock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Cachelock: crash-safe cross-process locks for cache files.
///
/// Every target is guarded by a `<name>.lock` file that records whether the
/// last writer finished cleanly and who holds the lock right now.
#[derive(Parser, Debug)]
#[command(name = "cachelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the lock timeout from the config, in milliseconds.
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for cachelock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a lock on a target and hold it.
    ///
    /// Waits for other owners to release it, optionally rewrites the target
    /// under the lock, then holds the lock for the requested time.
    Hold(HoldArgs),

    /// Show the state of the lock file guarding a target.
    ///
    /// Reports whether the last writer finished cleanly, the published
    /// owner, and whether the lock is currently held. Never takes the lock.
    Inspect(InspectArgs),

    /// Ask the owner listening on a port to release a target.
    Ping(PingArgs),
}

/// Arguments for the `hold` command.
#[derive(Args, Debug)]
pub struct HoldArgs {
    /// File or directory to lock.
    pub target: PathBuf,

    /// Take a shared lock instead of an exclusive one.
    #[arg(long)]
    pub shared: bool,

    /// Operation name recorded as the lock owner's activity.
    #[arg(long, default_value = "hold")]
    pub operation: String,

    /// Replace the target's contents with this text while holding the lock.
    #[arg(long, conflicts_with = "shared")]
    pub write: Option<String>,

    /// How long to hold the lock after acquiring it, in milliseconds.
    #[arg(long = "hold-ms", default_value_t = 0)]
    pub hold_ms: u64,

    /// Release early when another process asks for the lock.
    #[arg(long = "release-on-contention")]
    pub release_on_contention: bool,
}

/// Arguments for the `inspect` command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File or directory whose lock file to inspect.
    pub target: PathBuf,

    /// Print the status as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `ping` command.
#[derive(Args, Debug)]
pub struct PingArgs {
    /// Port the lock owner listens on.
    pub port: u16,

    /// Target the owner holds.
    pub target: PathBuf,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
