//! Listeners that react to contention pings for locks held by this process.

use super::communicator::FileLockCommunicator;
use super::types::ContendedAction;
use crate::error::{CacheLockError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Receives contention pings on behalf of a [`FileLockManager`](super::FileLockManager).
pub trait FileLockListener: Send + Sync {
    /// Port to advertise in the information region of new locks, if any.
    fn reserve_port(&self) -> Result<Option<u16>>;

    /// A lock on `target` is now held; run `when_contended` when it is pinged.
    fn lock_created(&self, target: &Path, when_contended: ContendedAction);

    /// The lock on `target` has been released.
    fn lock_closed(&self, target: &Path);
}

/// Listener that advertises no port. Waiters fall back to plain polling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpFileLockListener;

impl FileLockListener for NoOpFileLockListener {
    fn reserve_port(&self) -> Result<Option<u16>> {
        Ok(None)
    }

    fn lock_created(&self, _target: &Path, _when_contended: ContendedAction) {}

    fn lock_closed(&self, _target: &Path) {}
}

type ContendedActions = Arc<Mutex<HashMap<PathBuf, ContendedAction>>>;

/// A started communicator and the thread draining it.
struct ReceiveWorker {
    communicator: Arc<FileLockCommunicator>,
    worker: JoinHandle<()>,
}

impl ReceiveWorker {
    fn shut_down(self) -> Result<()> {
        let stopped = self.communicator.stop();
        if self.worker.join().is_err() {
            tracing::warn!("file lock listener thread panicked");
        }
        match stopped {
            // Already stopped through another handle.
            Err(CacheLockError::CommunicatorNotStarted) => Ok(()),
            other => other,
        }
    }
}

/// Listener backed by a [`FileLockCommunicator`] and a background thread.
///
/// The communicator is started on the first [`reserve_port`](FileLockListener::reserve_port)
/// call and stopped by [`stop`](Self::stop) or on drop. A later
/// `reserve_port` after a stop, or after the receive loop died on a socket
/// error, starts a fresh communicator, possibly on a different port.
#[derive(Default)]
pub struct DefaultFileLockListener {
    contended_actions: ContendedActions,
    receiver: Mutex<Option<ReceiveWorker>>,
}

impl DefaultFileLockListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the receive loop and wait for its thread to exit.
    pub fn stop(&self) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match receiver {
            Some(receiver) => receiver.shut_down(),
            None => Ok(()),
        }
    }

    fn ensure_started(&self) -> Result<u16> {
        let mut receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = receiver.as_ref()
            && !running.worker.is_finished()
        {
            return running.communicator.port();
        }
        if let Some(dead) = receiver.take() {
            tracing::debug!("restarting file lock listener");
            if let Err(e) = dead.shut_down() {
                tracing::warn!("failed to clean up file lock listener: {}", e);
            }
        }

        let communicator = Arc::new(FileLockCommunicator::new());
        communicator.start()?;
        let port = communicator.port()?;
        let worker = {
            let communicator = Arc::clone(&communicator);
            let actions = Arc::clone(&self.contended_actions);
            thread::Builder::new()
                .name("file-lock-listener".to_string())
                .spawn(move || receive_loop(&communicator, &actions))?
        };
        tracing::debug!(port, "started file lock listener");
        *receiver = Some(ReceiveWorker {
            communicator,
            worker,
        });
        Ok(port)
    }
}

impl FileLockListener for DefaultFileLockListener {
    fn reserve_port(&self) -> Result<Option<u16>> {
        self.ensure_started().map(Some)
    }

    fn lock_created(&self, target: &Path, when_contended: ContendedAction) {
        self.contended_actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.to_path_buf(), when_contended);
    }

    fn lock_closed(&self, target: &Path) {
        self.contended_actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target);
    }
}

impl Drop for DefaultFileLockListener {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("failed to stop file lock listener: {}", e);
        }
    }
}

fn receive_loop(communicator: &FileLockCommunicator, actions: &ContendedActions) {
    loop {
        match communicator.receive() {
            Ok(Some(target)) => {
                let action = actions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&target)
                    .cloned();
                match action {
                    Some(action) => {
                        tracing::debug!(path = %target.display(), "lock requested by another process");
                        action();
                    }
                    None => {
                        tracing::debug!(path = %target.display(), "ping for a lock this process does not hold");
                    }
                }
            }
            Ok(None) => break,
            Err(CacheLockError::Io(e)) => {
                tracing::warn!("file lock listener stopped after socket failure: {}", e);
                break;
            }
            Err(e) => tracing::warn!("ignoring contention ping: {}", e),
        }
    }
}
