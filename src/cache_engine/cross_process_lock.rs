use crate::cache_engine::config::AccessMode;
use crate::cache_engine::constants::LOCK_RETRY_INTERVAL;
use crate::cache_engine::error::{CacheError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Named lock shared by every process that opens the same cache.
///
/// Backed by an advisory exclusive lock on `<directory>/<map_name>.lock`.
/// The operating system drops the lock when the owning process exits, so a
/// crashed holder never leaves the lock abandoned. The lock file itself is
/// never removed.
///
/// Locks are held per open file handle: two `CrossProcessLock`s on the same
/// path exclude each other even inside one process, but a single instance
/// must not be shared between threads without outside synchronization.
#[derive(Debug)]
pub struct CrossProcessLock {
    file: File,
    path: PathBuf,
    timeout: Option<Duration>,
}

impl CrossProcessLock {
    /// Opens (creating if necessary) the lock file at `path`.
    ///
    /// Read-only handles open an existing lock file read-only, so readers
    /// work in directories they cannot write to. Advisory locks do not need
    /// a writable descriptor.
    pub fn open(
        path: &Path,
        timeout: Option<Duration>,
        access_mode: AccessMode,
    ) -> Result<Self> {
        if !access_mode.is_writable() {
            match OpenOptions::new().read(true).open(path) {
                Ok(file) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("No lock file at {}; creating it.", path.display());
                }
                Err(e) => return Err(CacheError::io_at("open lock file", path, e)),
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::io_at("create lock directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CacheError::io_at("open lock file", path, e))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            timeout,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Blocks until the lock is held, or until the configured timeout passes.
    ///
    /// # Errors
    /// `LockFailure` on timeout or if the OS refuses the lock.
    pub fn acquire(&self) -> Result<CrossProcessLockGuard<'_>> {
        let started = Instant::now();

        let Some(timeout) = self.timeout else {
            self.file
                .lock_exclusive()
                .map_err(|e| self.failure(started.elapsed(), e.to_string()))?;
            return Ok(CrossProcessLockGuard { lock: self });
        };

        let mut contended = false;
        loop {
            match self.file.try_lock_exclusive() {
                Ok(()) => {
                    if contended {
                        debug!(
                            "Acquired {} after waiting {:?}.",
                            self.path.display(),
                            started.elapsed()
                        );
                    }
                    return Ok(CrossProcessLockGuard { lock: self });
                }
                Err(e) if is_contended(&e) => {
                    contended = true;
                    let waited = started.elapsed();
                    if waited >= timeout {
                        warn!("Timed out after {:?} waiting for {}.", waited, self.path.display());
                        return Err(self.failure(waited, "timed out waiting for lock".into()));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(self.failure(started.elapsed(), e.to_string())),
            }
        }
    }

    fn failure(&self, waited: Duration, reason: String) -> CacheError {
        CacheError::LockFailure {
            path: self.path.clone(),
            waited,
            reason,
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Holds the cross-process lock; releases it on drop.
#[derive(Debug)]
pub struct CrossProcessLockGuard<'a> {
    lock: &'a CrossProcessLock,
}

impl Drop for CrossProcessLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock.file) {
            warn!("Failed to release {}: {}", self.lock.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_handle_times_out_while_held() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("cache.lock");

        let holder = CrossProcessLock::open(&path, None, AccessMode::ReadWrite).unwrap();
        let waiter = CrossProcessLock::open(&path, Some(Duration::from_millis(50)), AccessMode::ReadWrite).unwrap();

        let guard = holder.acquire().unwrap();
        let err = waiter.acquire().unwrap_err();
        assert!(err.is_lock_failure(), "unexpected error: {err}");

        drop(guard);
        assert!(waiter.acquire().is_ok());
    }

    #[test]
    fn test_lock_is_released_on_drop() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("cache.lock");
        let lock = CrossProcessLock::open(&path, Some(Duration::from_millis(50)), AccessMode::ReadWrite).unwrap();

        for _ in 0..3 {
            let _guard = lock.acquire().unwrap();
        }
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_handle_locks_write_protected_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("cache.lock");
        let writer = CrossProcessLock::open(&path, None, AccessMode::ReadWrite).unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();
        if OpenOptions::new().write(true).open(&path).is_ok() {
            // Privileged users ignore file permissions; nothing to check.
            return;
        }

        assert!(CrossProcessLock::open(&path, None, AccessMode::ReadWrite).is_err());

        let reader = CrossProcessLock::open(
            &path,
            Some(Duration::from_millis(50)),
            AccessMode::ReadOnly,
        )
        .unwrap();

        let guard = writer.acquire().unwrap();
        assert!(reader.acquire().unwrap_err().is_lock_failure());
        drop(guard);
        assert!(reader.acquire().is_ok());
    }
}
