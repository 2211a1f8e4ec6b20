//! Tests for the locks subsystem.

use super::*;
use crate::error::CacheLockError;
use crate::test_support::{FixedMetaData, RecordingListener, ignore_contention, quiet_manager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SHORT_TIMEOUT: Duration = Duration::from_millis(500);

fn target_in(dir: &TempDir, name: &str) -> PathBuf {
    std::fs::canonicalize(dir.path()).unwrap().join(name)
}

fn lock_exclusive(manager: &FileLockManager, target: &Path, operation: &str) -> FileLock {
    manager
        .lock(target, LockMode::Exclusive, "test cache", operation, ignore_contention())
        .unwrap()
}

/// Leave `target` behind with a clean lock file, as a completed write would.
fn write_cleanly(target: &Path, contents: &str) {
    let manager = quiet_manager("setup", SHORT_TIMEOUT);
    let mut lock = lock_exclusive(&manager, target, "setup");
    lock.write_file(|| Ok(std::fs::write(target, contents)?)).unwrap();
    lock.close();
}

#[test]
fn test_exclusive_lock_creates_sibling_lock_file() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let lock = lock_exclusive(&manager, &target, "compile");

    assert_eq!(lock.mode(), LockMode::Exclusive);
    assert_eq!(lock.target(), target);
    assert_eq!(lock.lock_file(), target.with_file_name("cache.bin.lock"));
    assert!(lock.is_lock_file(&target.with_file_name("cache.bin.lock")));
    assert!(lock.lock_file().exists());
}

#[test]
fn test_directory_lock_file_lives_inside_directory() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "modules");
    std::fs::create_dir(&target).unwrap();
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let lock = lock_exclusive(&manager, &target, "compile");

    assert_eq!(lock.lock_file(), target.join("modules.lock"));
}

#[test]
fn test_missing_parent_directories_are_created() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "a/b/cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let lock = lock_exclusive(&manager, &target, "compile");

    assert!(lock.lock_file().exists());
    assert_eq!(lock.lock_file().parent(), target.parent());
}

#[test]
fn test_lock_file_layout_after_exclusive_acquire() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("42", SHORT_TIMEOUT);

    let lock = lock_exclusive(&manager, &target, "op");
    let bytes = std::fs::read(lock.lock_file()).unwrap();

    assert_eq!(
        bytes,
        vec![1, 0, 3, 0xff, 0xff, 0xff, 0xff, 0, 2, b'4', b'2', 0, 2, b'o', b'p'],
    );
}

#[test]
fn test_new_lock_file_is_not_unlocked_cleanly() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let mut lock = lock_exclusive(&manager, &target, "compile");

    assert!(lock.is_integrity_violated());
    assert!(!lock.unlocked_cleanly().unwrap());
    assert!(matches!(
        lock.read_file(|| Ok(())),
        Err(CacheLockError::FileIntegrityViolated { .. })
    ));
    assert!(matches!(
        lock.update_file(|| Ok(())),
        Err(CacheLockError::FileIntegrityViolated { .. })
    ));

    lock.write_file(|| Ok(std::fs::write(&target, b"fresh")?)).unwrap();
    assert!(!lock.is_integrity_violated());
    let contents = lock.read_file(|| Ok(std::fs::read(&target)?)).unwrap();
    assert_eq!(contents, b"fresh");
}

#[test]
fn test_new_lock_file_under_shared_lock_is_not_unlocked_cleanly() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let lock = manager
        .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
        .unwrap();

    assert_eq!(lock.mode(), LockMode::Shared);
    assert!(lock.is_integrity_violated());
    assert_eq!(std::fs::metadata(lock.lock_file()).unwrap().len(), 0);
}

#[test]
fn test_clean_write_is_seen_by_next_acquisition() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    write_cleanly(&target, "v1");

    let manager = quiet_manager("2", SHORT_TIMEOUT);
    let lock = manager
        .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
        .unwrap();

    assert!(!lock.is_integrity_violated());
    assert!(lock.unlocked_cleanly().unwrap());
    let contents = lock.read_file(|| Ok(std::fs::read_to_string(&target)?)).unwrap();
    assert_eq!(contents, "v1");
}

#[test]
fn test_update_builds_on_clean_contents() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "counter.txt");
    write_cleanly(&target, "1");

    let manager = quiet_manager("2", SHORT_TIMEOUT);
    let mut lock = lock_exclusive(&manager, &target, "increment");
    let next = lock
        .update_file(|| {
            let current: u32 = std::fs::read_to_string(&target)?.trim().parse()?;
            std::fs::write(&target, (current + 1).to_string())?;
            Ok(current + 1)
        })
        .unwrap();

    assert_eq!(next, 2);
    assert!(lock.unlocked_cleanly().unwrap());
}

#[test]
fn test_failed_write_leaves_target_dirty_for_next_holder() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    write_cleanly(&target, "v1");

    {
        let manager = quiet_manager("crashing", SHORT_TIMEOUT);
        let mut lock = lock_exclusive(&manager, &target, "write");
        let err = lock
            .write_file(|| -> anyhow::Result<()> {
                std::fs::write(&target, "half")?;
                anyhow::bail!("simulated crash")
            })
            .unwrap_err();
        assert!(matches!(err, CacheLockError::Action(_)));
        assert_eq!(err.to_string(), "simulated crash");
        assert!(lock.is_integrity_violated());
        lock.close();
    }

    let manager = quiet_manager("recovering", SHORT_TIMEOUT);
    let mut lock = lock_exclusive(&manager, &target, "recover");
    assert!(lock.is_integrity_violated());
    assert!(matches!(
        lock.read_file(|| Ok(())),
        Err(CacheLockError::FileIntegrityViolated { .. })
    ));
    assert!(matches!(
        lock.update_file(|| Ok(())),
        Err(CacheLockError::FileIntegrityViolated { .. })
    ));

    // A full rewrite restores trust in the target.
    lock.write_file(|| Ok(std::fs::write(&target, "v2")?)).unwrap();
    lock.close();

    let lock = quiet_manager("reader", SHORT_TIMEOUT)
        .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
        .unwrap();
    assert!(!lock.is_integrity_violated());
}

#[test]
fn test_failed_update_leaves_target_dirty_for_next_holder() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "counter.txt");
    write_cleanly(&target, "1");

    {
        let manager = quiet_manager("crashing", SHORT_TIMEOUT);
        let mut lock = lock_exclusive(&manager, &target, "increment");
        let err = lock
            .update_file(|| -> anyhow::Result<()> {
                std::fs::write(&target, "")?;
                anyhow::bail!("interrupted before writing the new count")
            })
            .unwrap_err();
        assert!(matches!(err, CacheLockError::Action(_)));
        assert!(lock.is_integrity_violated());
        assert!(!lock.unlocked_cleanly().unwrap());
        lock.close();
    }

    let manager = quiet_manager("next", SHORT_TIMEOUT);
    let mut lock = lock_exclusive(&manager, &target, "increment");
    assert!(lock.is_integrity_violated());
    assert!(matches!(
        lock.update_file(|| Ok(())),
        Err(CacheLockError::FileIntegrityViolated { .. })
    ));
}

#[test]
fn test_shared_lock_cannot_write() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    write_cleanly(&target, "v1");

    let manager = quiet_manager("1", SHORT_TIMEOUT);
    let mut lock = manager
        .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
        .unwrap();

    assert!(matches!(
        lock.write_file(|| Ok(())),
        Err(CacheLockError::InsufficientLockMode)
    ));
    assert!(matches!(
        lock.update_file(|| Ok(())),
        Err(CacheLockError::InsufficientLockMode)
    ));
    // The state region was never touched.
    assert!(lock.unlocked_cleanly().unwrap());
}

#[test]
fn test_mode_none_is_rejected() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let listener = RecordingListener::new();
    let manager = FileLockManager::with_timeout(FixedMetaData::new("1"), listener.clone(), SHORT_TIMEOUT);

    let err = manager
        .lock(&target, LockMode::None, "test cache", "none", ignore_contention())
        .unwrap_err();

    assert!(matches!(err, CacheLockError::UnsupportedLockMode(LockMode::None)));
    assert!(!target.with_file_name("cache.bin.lock").exists());
    assert!(!manager.is_locked(&target).unwrap());
    assert_eq!(listener.reservations(), 0);
}

#[test]
fn test_second_lock_in_same_process_fails_immediately() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let listener = RecordingListener::new();
    let manager = FileLockManager::with_timeout(FixedMetaData::new("1"), listener.clone(), SHORT_TIMEOUT);

    let mut first = lock_exclusive(&manager, &target, "first");

    // A different spelling of the same path is still the same target.
    let alias = target.parent().unwrap().join(".").join("cache.bin");
    let err = manager
        .lock(&alias, LockMode::Shared, "test cache", "second", ignore_contention())
        .unwrap_err();
    assert!(matches!(err, CacheLockError::AlreadyLockedByProcess { .. }));
    assert_eq!(listener.reservations(), 1);
    assert!(!first.is_closed());

    first.close();
    let second = manager
        .lock(&alias, LockMode::Shared, "test cache", "second", ignore_contention())
        .unwrap();
    assert_eq!(second.mode(), LockMode::Shared);
}

#[test]
fn test_listener_sees_created_and_closed() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let listener = RecordingListener::new();
    let manager = FileLockManager::with_timeout(FixedMetaData::new("1"), listener.clone(), SHORT_TIMEOUT);

    let mut lock = lock_exclusive(&manager, &target, "compile");
    assert_eq!(listener.created(), vec![target.clone()]);
    assert!(listener.closed().is_empty());

    lock.close();
    assert_eq!(listener.closed(), vec![target]);
}

#[test]
fn test_registry_is_released_when_acquisition_fails() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let lock_file = target.with_file_name("cache.bin.lock");
    std::fs::write(&lock_file, [9u8, 1]).unwrap();
    let listener = RecordingListener::new();
    let manager = FileLockManager::with_timeout(FixedMetaData::new("1"), listener.clone(), SHORT_TIMEOUT);

    let err = manager
        .lock(&target, LockMode::Exclusive, "test cache", "compile", ignore_contention())
        .unwrap_err();
    assert!(matches!(err, CacheLockError::CorruptLockFile { .. }));
    assert!(!manager.is_locked(&target).unwrap());
    assert!(listener.created().is_empty());

    std::fs::write(&lock_file, [1u8, 1]).unwrap();
    let lock = lock_exclusive(&manager, &target, "compile");
    assert!(!lock.is_integrity_violated());
}

#[test]
fn test_corrupt_lock_file_is_rejected_for_shared_locks() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    std::fs::write(target.with_file_name("cache.bin.lock"), [2u8]).unwrap();
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let err = manager
        .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
        .unwrap_err();
    assert!(matches!(err, CacheLockError::CorruptLockFile { .. }));
}

#[test]
fn test_close_twice_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let listener = RecordingListener::new();
    let manager = FileLockManager::with_timeout(FixedMetaData::new("1"), listener.clone(), SHORT_TIMEOUT);

    let mut lock = lock_exclusive(&manager, &target, "compile");
    lock.close();
    lock.close();
    drop(lock);

    assert_eq!(listener.closed().len(), 1);
}

#[test]
fn test_operations_after_close_fail() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let mut lock = lock_exclusive(&manager, &target, "compile");
    lock.close();

    assert!(lock.is_closed());
    assert!(matches!(lock.read_file(|| Ok(())), Err(CacheLockError::LockClosed)));
    assert!(matches!(lock.write_file(|| Ok(())), Err(CacheLockError::LockClosed)));
    assert!(matches!(lock.update_file(|| Ok(())), Err(CacheLockError::LockClosed)));
    assert!(matches!(lock.unlocked_cleanly(), Err(CacheLockError::LockClosed)));
}

#[test]
fn test_exclusive_close_discards_owner_info() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    let mut lock = lock_exclusive(&manager, &target, "compile");
    let lock_file = lock.lock_file().to_path_buf();
    assert!(std::fs::metadata(&lock_file).unwrap().len() > STATE_REGION_SIZE);

    lock.close();
    assert_eq!(std::fs::metadata(&lock_file).unwrap().len(), INFORMATION_REGION_POS);
}

#[test]
fn test_drop_releases_lock() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);

    {
        let _lock = lock_exclusive(&manager, &target, "compile");
        assert!(manager.is_locked(&target).unwrap());
    }

    assert!(!manager.is_locked(&target).unwrap());
    assert_eq!(
        std::fs::metadata(target.with_file_name("cache.bin.lock")).unwrap().len(),
        STATE_REGION_SIZE
    );
}

#[test]
fn test_manager_uses_configured_timeout() {
    let config = crate::config::Config::from_yaml("lock_timeout_ms: 1234").unwrap();
    let manager = FileLockManager::from_config(
        &config,
        FixedMetaData::new("1"),
        Arc::new(NoOpFileLockListener),
    );
    assert_eq!(manager.lock_timeout(), Duration::from_millis(1234));

    let manager = FileLockManager::new(FixedMetaData::new("1"), Arc::new(NoOpFileLockListener));
    assert_eq!(manager.lock_timeout(), DEFAULT_LOCK_TIMEOUT);
}

#[cfg(target_os = "linux")]
#[test]
fn test_inspect_missing_lock_file() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");

    let status = inspect_lock(&target).unwrap();

    assert!(!status.exists);
    assert_eq!(status.held, None);
    assert_eq!(status.owner, None);
}

#[cfg(target_os = "linux")]
#[test]
fn test_inspect_released_lock() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    write_cleanly(&target, "v1");

    let status = inspect_lock(&target).unwrap();

    assert!(status.exists);
    assert_eq!(status.clean, Some(true));
    assert_eq!(status.held, None);
    assert_eq!(status.owner, None);
}

#[cfg(not(target_os = "linux"))]
#[test]
fn test_inspect_is_refused_with_process_owned_locks() {
    let dir = TempDir::new().unwrap();
    let target = target_in(&dir, "cache.bin");
    let manager = quiet_manager("1", SHORT_TIMEOUT);
    let mut lock = lock_exclusive(&manager, &target, "compile");

    let err = inspect_lock(&target).unwrap_err();
    assert!(matches!(
        err,
        CacheLockError::Io(ref e) if e.kind() == std::io::ErrorKind::Unsupported
    ));

    // The held lock is still usable.
    lock.write_file(|| Ok(std::fs::write(&target, "v1")?)).unwrap();
    assert!(lock.unlocked_cleanly().unwrap());
}

// The tests below use a second manager as a stand-in for another process.
// Open-file-description locks make that work inside one process on Linux.

#[cfg(target_os = "linux")]
mod contention {
    use super::*;
    use crate::locks::region;
    use std::fs::{File, OpenOptions};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    /// Take the information-region lock through a descriptor of our own.
    fn hold_information_region(lock_file: &Path) -> File {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(lock_file)
            .unwrap();
        let granted = region::try_lock(
            &file,
            LockMode::Exclusive,
            INFORMATION_REGION_POS,
            INFORMATION_REGION_SIZE,
        )
        .unwrap();
        assert_eq!(granted, Some(LockMode::Exclusive));
        file
    }

    #[test]
    fn test_busy_information_region_fails_within_lock_timeout() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        write_cleanly(&target, "v1");
        let holder = hold_information_region(&target.with_file_name("cache.bin.lock"));
        let manager = quiet_manager("1", SHORT_TIMEOUT);

        let started = Instant::now();
        let err = manager
            .lock(&target, LockMode::Exclusive, "test cache", "compile", ignore_contention())
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            matches!(err, CacheLockError::InformationRegionTimeout { .. }),
            "got {:?}",
            err
        );
        assert!(elapsed < SHORT_TIMEOUT + Duration::from_secs(1), "took {:?}", elapsed);
        assert!(!manager.is_locked(&target).unwrap());

        drop(holder);
        let lock = lock_exclusive(&manager, &target, "compile");
        assert!(!lock.is_integrity_violated());
    }

    #[test]
    fn test_close_does_not_wait_for_busy_information_region() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        let manager = quiet_manager("1", SHORT_TIMEOUT);
        let mut lock = lock_exclusive(&manager, &target, "compile");
        let lock_file = lock.lock_file().to_path_buf();
        let holder = hold_information_region(&lock_file);

        let started = Instant::now();
        lock.close();

        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert!(lock.is_closed());
        assert!(!manager.is_locked(&target).unwrap());
        // The owner record could not be discarded and is left behind.
        assert!(std::fs::metadata(&lock_file).unwrap().len() > INFORMATION_REGION_POS);

        drop(holder);
        let next = quiet_manager("2", SHORT_TIMEOUT);
        let relocked = lock_exclusive(&next, &target, "next");
        assert_eq!(relocked.mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_owner_info_round_trips_through_lock_file() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        let manager = FileLockManager::with_timeout(
            FixedMetaData::new("X"),
            RecordingListener::with_port(40123),
            SHORT_TIMEOUT,
        );

        let _lock = lock_exclusive(&manager, &target, "Y");
        let status = inspect_lock(&target).unwrap();

        assert_eq!(status.held, Some(LockMode::Exclusive));
        assert_eq!(status.clean, Some(false));
        assert_eq!(
            status.owner,
            Some(OwnerInfo {
                port: Some(40123),
                pid: "X".to_string(),
                operation: "Y".to_string(),
            })
        );
    }

    #[test]
    fn test_long_owner_details_are_truncated() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        let long_pid = "p".repeat(500);
        let long_operation = "o".repeat(341);
        let manager = quiet_manager(&long_pid, SHORT_TIMEOUT);

        let _lock = lock_exclusive(&manager, &target, &long_operation);
        let owner = inspect_lock(&target).unwrap().owner.unwrap();

        assert_eq!(owner.pid, "p".repeat(INFORMATION_REGION_DESCR_CHUNK_LIMIT));
        assert_eq!(owner.operation, "o".repeat(INFORMATION_REGION_DESCR_CHUNK_LIMIT));
        assert_eq!(owner.port, None);
    }

    #[test]
    fn test_shared_holders_are_reported_by_inspect() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        write_cleanly(&target, "v1");
        let manager = quiet_manager("1", SHORT_TIMEOUT);

        let _lock = manager
            .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
            .unwrap();

        assert_eq!(inspect_lock(&target).unwrap().held, Some(LockMode::Shared));
    }

    #[test]
    fn test_timeout_reports_the_owner() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        let owner = quiet_manager("owner-pid", SHORT_TIMEOUT);
        let waiter = quiet_manager("waiter-pid", SHORT_TIMEOUT);

        let _held = lock_exclusive(&owner, &target, "compile java");

        let started = Instant::now();
        let err = waiter
            .lock(&target, LockMode::Exclusive, "test cache", "resolve", ignore_contention())
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= SHORT_TIMEOUT, "gave up after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
        match err {
            CacheLockError::LockTimeout {
                display_name,
                owner_pid,
                owner_operation,
                our_pid,
                our_operation,
                lock_file,
            } => {
                assert_eq!(display_name, "test cache");
                assert_eq!(owner_pid, "owner-pid");
                assert_eq!(owner_operation, "compile java");
                assert_eq!(our_pid, "waiter-pid");
                assert_eq!(our_operation, "resolve");
                assert_eq!(lock_file, target.with_file_name("cache.bin.lock"));
            }
            other => panic!("expected LockTimeout, got {:?}", other),
        }
        assert!(!waiter.is_locked(&target).unwrap());
    }

    #[test]
    fn test_shared_locks_coexist_but_exclude_writers() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");
        write_cleanly(&target, "v1");

        let first = quiet_manager("reader-1", SHORT_TIMEOUT);
        let second = quiet_manager("reader-2", SHORT_TIMEOUT);
        let writer = quiet_manager("writer", SHORT_TIMEOUT);

        let _a = first
            .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
            .unwrap();
        let _b = second
            .lock(&target, LockMode::Shared, "test cache", "read", ignore_contention())
            .unwrap();

        let err = writer
            .lock(&target, LockMode::Exclusive, "test cache", "write", ignore_contention())
            .unwrap_err();
        match err {
            // Shared holders never publish owner details.
            CacheLockError::LockTimeout { owner_pid, .. } => assert_eq!(owner_pid, "unknown"),
            other => panic!("expected LockTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_waiter_pings_the_owner_port() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");

        let communicator = Arc::new(FileLockCommunicator::new());
        communicator.start().unwrap();
        let owner = FileLockManager::with_timeout(
            FixedMetaData::new("owner"),
            RecordingListener::with_port(communicator.port().unwrap()),
            SHORT_TIMEOUT,
        );
        // Any advertised port enables pinging on the waiting side.
        let waiter = FileLockManager::with_timeout(
            FixedMetaData::new("waiter"),
            RecordingListener::with_port(1),
            SHORT_TIMEOUT,
        );

        let _held = lock_exclusive(&owner, &target, "compile");

        let receiver = {
            let communicator = Arc::clone(&communicator);
            thread::spawn(move || communicator.receive())
        };
        let err = waiter
            .lock(&target, LockMode::Exclusive, "test cache", "resolve", ignore_contention())
            .unwrap_err();
        assert!(matches!(err, CacheLockError::LockTimeout { .. }));

        let pinged = receiver.join().unwrap().unwrap();
        assert_eq!(pinged, Some(target));
        communicator.stop().unwrap();
    }

    #[test]
    fn test_contended_owner_can_release_to_waiter() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir, "cache.bin");

        let owner = FileLockManager::with_timeout(
            FixedMetaData::new("owner"),
            Arc::new(DefaultFileLockListener::new()),
            Duration::from_secs(5),
        );
        let waiter = FileLockManager::with_timeout(
            FixedMetaData::new("waiter"),
            Arc::new(DefaultFileLockListener::new()),
            Duration::from_secs(10),
        );

        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let mut held = owner
            .lock(
                &target,
                LockMode::Exclusive,
                "test cache",
                "compile",
                Arc::new(move || {
                    let _ = tx.lock().unwrap().send(());
                }),
            )
            .unwrap();

        let waiting = {
            let target = target.clone();
            thread::spawn(move || {
                waiter
                    .lock(&target, LockMode::Exclusive, "test cache", "resolve", ignore_contention())
                    .map(|lock| lock.mode())
            })
        };

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        held.close();

        let granted = waiting.join().unwrap().unwrap();
        assert_eq!(granted, LockMode::Exclusive);
    }
}
