//! Command implementations for cachelock.
//!
//! This module loads the configuration shared by every command and routes
//! each command to its handler.

mod hold;
mod inspect;
mod ping;

use crate::cli::{Cli, Command};
use cachelock::config::Config;
use cachelock::error::Result;
use std::path::Path;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.timeout_ms)?;
    config.apply_global_excludes();

    match cli.command {
        Command::Hold(args) => hold::cmd_hold(&config, args),
        Command::Inspect(args) => inspect::cmd_inspect(args),
        Command::Ping(args) => ping::cmd_ping(args),
    }
}

/// Load the config file if one was given and apply command-line overrides.
fn load_config(path: Option<&Path>, timeout_ms: Option<u64>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(timeout_ms) = timeout_ms {
        config.lock_timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}
