//! Implementation of the `cachelock hold` command.

use crate::cli::HoldArgs;
use cachelock::config::Config;
use cachelock::error::Result;
use cachelock::locks::{
    ContendedAction, DefaultFileLockListener, DefaultProcessMetaDataProvider, FileLockListener,
    FileLockManager, LockMode, NoOpFileLockListener,
};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Acquire the lock, optionally rewrite the target, and hold the lock.
pub fn cmd_hold(config: &Config, args: HoldArgs) -> Result<()> {
    let listener: Arc<dyn FileLockListener> = if config.contention_pings {
        Arc::new(DefaultFileLockListener::new())
    } else {
        Arc::new(NoOpFileLockListener)
    };
    let manager =
        FileLockManager::from_config(config, Arc::new(DefaultProcessMetaDataProvider), listener);

    let (contended_tx, contended_rx) = mpsc::channel();
    let contended_tx = Mutex::new(contended_tx);
    let when_contended: ContendedAction = Arc::new(move || {
        tracing::info!("another process is waiting for the lock");
        let _ = contended_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(());
    });

    let mode = if args.shared {
        LockMode::Shared
    } else {
        LockMode::Exclusive
    };
    let display_name = args.target.display().to_string();
    let mut lock = manager.lock(
        &args.target,
        mode,
        &display_name,
        &args.operation,
        when_contended,
    )?;

    println!("Acquired {} lock on {}", lock.mode(), lock.target().display());
    if lock.is_integrity_violated() {
        println!("  Warning: previous owner did not unlock cleanly");
    }

    if let Some(text) = &args.write {
        let target = lock.target().to_path_buf();
        lock.write_file(|| Ok(std::fs::write(&target, text)?))?;
        println!("  Wrote {} bytes to {}", text.len(), target.display());
    }

    let released_early = hold_lock(
        &contended_rx,
        Duration::from_millis(args.hold_ms),
        args.release_on_contention,
    );
    if released_early {
        println!("  Releasing early: another process asked for the lock");
    }

    lock.close();
    println!("Released lock on {}", lock.target().display());
    Ok(())
}

/// Wait out `duration`, returning `true` if contention cut it short.
fn hold_lock(contended: &Receiver<()>, duration: Duration, release_on_contention: bool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match contended.recv_timeout(remaining) {
            Ok(()) if release_on_contention => return true,
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => {
                // No listener kept the callback; nobody can ask us to leave.
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                return false;
            }
        }
    }
}
