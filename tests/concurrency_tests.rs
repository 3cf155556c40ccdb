use mmap_shared_cache::{
    AccessMode, CacheConfig, CacheError, CrossProcessLock, SharedCache,
    traits::{CacheReader, CacheWriter},
};
use std::sync::{
    Arc, Barrier,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const HEADER: u64 = 1024 * 1024;

fn config_in(dir: &tempfile::TempDir) -> CacheConfig {
    CacheConfig::in_directory(dir.path())
        .with_capacity(HEADER + 64 * 1024)
        .with_header_size(HEADER)
        .with_flush_on_write(false)
}

/// Every thread opens its own handle, so each one holds a separate lock file
/// descriptor and behaves like a separate process.
#[test]
fn concurrent_writers_from_independent_handles() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = config_in(&dir);

    let writers = 8;
    let per_writer = 25;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let config = config.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let cache = SharedCache::open(config).expect("Failed to open cache");
                barrier.wait();
                for i in 0..per_writer {
                    let key = format!("writer{}-key{}", w, i);
                    let value = format!("value from writer {} #{}", w, i);
                    cache.set(&key, value.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }

    let cache = SharedCache::open(config).unwrap();
    assert_eq!(cache.len().unwrap(), writers * per_writer);
    for w in 0..writers {
        for i in 0..per_writer {
            let key = format!("writer{}-key{}", w, i);
            let expected = format!("value from writer {} #{}", w, i);
            assert_eq!(cache.get(&key).unwrap(), expected.as_bytes());
        }
    }
}

#[test]
fn overwrites_of_one_key_never_tear() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = config_in(&dir);

    SharedCache::open(config.clone())
        .unwrap()
        .set("shared", &[0u8; 64])
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (1..=4u8)
        .map(|fill| {
            let config = config.clone();
            thread::spawn(move || {
                let cache = SharedCache::open(config).unwrap();
                for round in 0..50usize {
                    // Alternate sizes to exercise growth, shrink and reuse.
                    let len = 16 + (round % 4) * 16;
                    cache.set("shared", &vec![fill; len]).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let config = config.clone();
        let done = done.clone();
        thread::spawn(move || {
            let cache = SharedCache::open(config).unwrap();
            while !done.load(Ordering::Acquire) {
                let value = cache.get("shared").unwrap();
                let first = value[0];
                assert!(
                    value.iter().all(|&b| b == first),
                    "Observed a torn value: {:?}",
                    value
                );
            }
        })
    };

    for writer in writers {
        writer.join().expect("Writer thread panicked");
    }
    done.store(true, Ordering::Release);
    reader.join().expect("Reader thread panicked");
}

#[test]
fn clear_is_observed_by_other_handles() {
    let dir = tempdir().expect("Failed to create temp dir");
    let first = SharedCache::open(config_in(&dir)).unwrap();
    let second = SharedCache::open(config_in(&dir)).unwrap();

    first.set("a", b"alpha").unwrap();
    assert_eq!(second.get("a").unwrap(), b"alpha");

    second.clear().unwrap();
    assert!(matches!(first.get("a"), Err(CacheError::NotFound { .. })));

    // The handle that did not clear has re-mapped the new file.
    first.set("b", b"beta").unwrap();
    assert_eq!(second.get("b").unwrap(), b"beta");
    assert_eq!(second.keys().unwrap(), vec!["b"]);
}

#[test]
fn lock_timeout_surfaces_as_lock_failure() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = SharedCache::open(
        config_in(&dir).with_lock_timeout(Some(Duration::from_millis(50))),
    )
    .unwrap();
    cache.set("k", b"v").unwrap();

    let holder = CrossProcessLock::open(&cache.lock_path(), None, AccessMode::ReadWrite).unwrap();
    let guard = holder.acquire().unwrap();

    let err = cache.get("k").unwrap_err();
    assert!(err.is_lock_failure(), "unexpected error: {err}");

    drop(guard);
    assert_eq!(cache.get("k").unwrap(), b"v");
}

#[test]
fn blocked_writer_proceeds_once_lock_is_released() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = SharedCache::open(config_in(&dir)).unwrap();

    let holder = CrossProcessLock::open(&cache.lock_path(), None, AccessMode::ReadWrite).unwrap();
    let guard = holder.acquire().unwrap();

    let writer = {
        let cache = cache.clone();
        thread::spawn(move || cache.set("late", b"arrival"))
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!writer.is_finished(), "Writer ran while the lock was held");

    drop(guard);
    writer.join().unwrap().unwrap();
    assert_eq!(cache.get("late").unwrap(), b"arrival");
}

#[cfg(unix)]
#[test]
fn handle_recovers_after_backing_file_is_restored() {
    let dir = tempdir().expect("Failed to create temp dir");
    let first = SharedCache::open(config_in(&dir)).unwrap();
    first.set("a", b"alpha").unwrap();

    // Something else takes the file's place for a while.
    let data_path = first.data_path();
    std::fs::remove_file(&data_path).unwrap();
    std::fs::create_dir(&data_path).unwrap();

    let err = first.get("a").unwrap_err();
    assert!(!matches!(err, CacheError::Closed), "unexpected error: {err}");

    std::fs::remove_dir(&data_path).unwrap();
    let second = SharedCache::open(config_in(&dir)).unwrap();
    second.set("b", b"beta").unwrap();

    assert_eq!(first.get("b").unwrap(), b"beta");
    assert!(matches!(first.get("a"), Err(CacheError::NotFound { .. })));
}

#[cfg(unix)]
#[test]
fn failed_clear_does_not_leave_handle_closed() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = SharedCache::open(config_in(&dir)).unwrap();
    cache.set("a", b"alpha").unwrap();

    let data_path = cache.data_path();
    std::fs::remove_file(&data_path).unwrap();
    std::fs::create_dir(&data_path).unwrap();

    // The directory cannot be removed as a file, so clear fails after unmapping.
    let err = cache.clear().unwrap_err();
    assert!(!matches!(err, CacheError::Closed), "unexpected error: {err}");

    std::fs::remove_dir(&data_path).unwrap();
    cache.set("b", b"beta").unwrap();
    assert_eq!(cache.get("b").unwrap(), b"beta");
    assert_eq!(cache.keys().unwrap(), vec!["b"]);
}
