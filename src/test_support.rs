use crate::error::Result;
use crate::locks::{
    ContendedAction, FileLockListener, FileLockManager, NoOpFileLockListener,
    ProcessMetaDataProvider,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Metadata provider with a fixed identity, so tests can tell owners apart.
pub(crate) struct FixedMetaData {
    pid: String,
}

impl FixedMetaData {
    pub(crate) fn new(pid: &str) -> Arc<Self> {
        Arc::new(Self {
            pid: pid.to_string(),
        })
    }
}

impl ProcessMetaDataProvider for FixedMetaData {
    fn process_identifier(&self) -> String {
        self.pid.clone()
    }

    fn process_display_name(&self) -> String {
        format!("test@{}", self.pid)
    }
}

/// Listener that records the calls it receives and advertises a fixed port.
#[derive(Default)]
pub(crate) struct RecordingListener {
    port: Option<u16>,
    reservations: AtomicUsize,
    created: Mutex<Vec<PathBuf>>,
    closed: Mutex<Vec<PathBuf>>,
}

impl RecordingListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_port(port: u16) -> Arc<Self> {
        Arc::new(Self {
            port: Some(port),
            ..Self::default()
        })
    }

    pub(crate) fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }

    pub(crate) fn created(&self) -> Vec<PathBuf> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn closed(&self) -> Vec<PathBuf> {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FileLockListener for RecordingListener {
    fn reserve_port(&self) -> Result<Option<u16>> {
        self.reservations.fetch_add(1, Ordering::SeqCst);
        Ok(self.port)
    }

    fn lock_created(&self, target: &Path, _when_contended: ContendedAction) {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_path_buf());
    }

    fn lock_closed(&self, target: &Path) {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_path_buf());
    }
}

/// Manager with a short timeout and no contention listener.
pub(crate) fn quiet_manager(pid: &str, timeout: Duration) -> FileLockManager {
    FileLockManager::with_timeout(FixedMetaData::new(pid), Arc::new(NoOpFileLockListener), timeout)
}

/// Callback for tests that do not care about contention.
pub(crate) fn ignore_contention() -> ContendedAction {
    Arc::new(|| {})
}
