use crate::cache_engine::constants::*;
use crate::cache_engine::error::{CacheError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Whether the shared region may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// Options recognised when opening a [`crate::SharedCache`].
///
/// Every process that wants to share a cache must agree on `directory`,
/// `file_name`, `map_name`, `capacity` and `header_size`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the backing file and the lock file.
    pub directory: PathBuf,
    /// Name of the backing file inside `directory`.
    pub file_name: String,
    /// Name used to address the cache across processes (names the lock file).
    pub map_name: String,
    /// Total size of the backing file in bytes.
    pub capacity: u64,
    /// Size of the header zone in bytes.
    pub header_size: u64,
    /// Read-write or read-only mapping.
    pub access_mode: AccessMode,
    /// Upper bound on waiting for the cross-process lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Flush dirty pages to disk after every mutation.
    pub flush_on_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            map_name: DEFAULT_MAP_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
            header_size: DEFAULT_HEADER_SIZE,
            access_mode: AccessMode::ReadWrite,
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
            flush_on_write: true,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `directory`.
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self::default().with_directory(directory)
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_map_name(mut self, map_name: impl Into<String>) -> Self {
        self.map_name = map_name.into();
        self
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_header_size(mut self, header_size: u64) -> Self {
        self.header_size = header_size;
        self
    }

    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_flush_on_write(mut self, flush_on_write: bool) -> Self {
        self.flush_on_write = flush_on_write;
        self
    }

    /// Full path of the backing file.
    pub fn data_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Full path of the lock file (`<directory>/<map_name>.lock`).
    pub fn lock_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}", self.map_name, LOCK_FILE_EXTENSION))
    }

    /// Size of the data zone (`capacity - header_size`).
    #[inline]
    pub fn data_zone_size(&self) -> u64 {
        self.capacity.saturating_sub(self.header_size)
    }

    /// Checks the configuration for values that cannot produce a usable region.
    pub fn validate(&self) -> Result<()> {
        validate_name("file name", &self.file_name)?;
        validate_name("map name", &self.map_name)?;

        if self.header_size == 0 {
            return Err(CacheError::InvalidConfig(
                "header size must be greater than zero".into(),
            ));
        }

        if self.header_size >= self.capacity {
            return Err(CacheError::InvalidConfig(format!(
                "header size ({}) must be smaller than capacity ({})",
                self.header_size, self.capacity
            )));
        }

        if usize::try_from(self.capacity).is_err() {
            return Err(CacheError::InvalidConfig(format!(
                "capacity {} cannot be mapped on this platform",
                self.capacity
            )));
        }

        Ok(())
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::InvalidConfig(format!("{what} must not be empty")));
    }

    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CacheError::InvalidConfig(format!(
            "{what} {name:?} must be a plain file name"
        )));
    }

    Ok(())
}
