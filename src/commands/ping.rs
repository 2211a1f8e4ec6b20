//! Implementation of the `cachelock ping` command.

use crate::cli::PingArgs;
use cachelock::error::Result;
use cachelock::fs::canonicalize_target;
use cachelock::locks::FileLockCommunicator;

/// Send one contention ping for a target to the owner on `port`.
///
/// Owners register their locks under canonical paths, so the target is
/// canonicalized before sending.
pub fn cmd_ping(args: PingArgs) -> Result<()> {
    let target = canonicalize_target(&args.target)?;
    FileLockCommunicator::ping_owner(args.port, &target)?;
    println!("Pinged owner on port {} for {}", args.port, target.display());
    Ok(())
}
