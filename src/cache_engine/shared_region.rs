use crate::cache_engine::config::AccessMode;
use crate::cache_engine::error::{CacheError, Result};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

enum Mapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            Mapping::ReadWrite(mmap) => mmap,
            Mapping::ReadOnly(mmap) => mmap,
        }
    }
}

/// Identity of the file behind a mapping, used to notice that the file on
/// disk was replaced by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(_metadata: &fs::Metadata) -> Self {
        Self {}
    }
}

/// Fixed-capacity memory-mapped backing file.
///
/// The whole file is mapped at once; its size always equals `capacity`.
/// All accesses are bounds-checked against that capacity.
pub struct SharedRegion {
    path: PathBuf,
    map_name: String,
    capacity: u64,
    access_mode: AccessMode,
    file: Option<File>,
    mapping: Option<Mapping>,
    identity: FileIdentity,
    closed: bool,
}

impl SharedRegion {
    /// Opens (creating if needed, in read-write mode) the backing file at
    /// `path` and maps `capacity` bytes of it.
    ///
    /// # Errors
    /// - `InvalidConfig` if an existing, non-empty file has a different size.
    /// - `IoAt` if the file cannot be created, sized or mapped.
    pub fn open(
        path: &Path,
        map_name: &str,
        capacity: u64,
        access_mode: AccessMode,
    ) -> Result<Self> {
        let map_len = usize::try_from(capacity).map_err(|_| {
            CacheError::InvalidConfig(format!("capacity {capacity} exceeds address space"))
        })?;

        if access_mode.is_writable() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| CacheError::io_at("create cache directory", parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(access_mode.is_writable())
            .create(access_mode.is_writable())
            .truncate(false)
            .open(path)
            .map_err(|e| CacheError::io_at("open backing file", path, e))?;

        let metadata = file
            .metadata()
            .map_err(|e| CacheError::io_at("stat backing file", path, e))?;

        let file_len = metadata.len();
        if file_len == 0 && access_mode.is_writable() {
            file.set_len(capacity)
                .map_err(|e| CacheError::io_at("size backing file", path, e))?;
            info!(
                "Created shared region '{}' at {} ({} bytes).",
                map_name,
                path.display(),
                capacity
            );
        } else if file_len != capacity {
            return Err(CacheError::InvalidConfig(format!(
                "backing file {} is {} bytes but capacity is {} bytes",
                path.display(),
                file_len,
                capacity
            )));
        } else {
            debug!("Opened existing shared region '{}' at {}.", map_name, path.display());
        }

        // Safety: the file stays open for the lifetime of the mapping and is
        // never truncated while mapped; concurrent writers in other processes
        // are serialized by the cross-process lock.
        let mapping = unsafe {
            match access_mode {
                AccessMode::ReadWrite => MmapOptions::new()
                    .len(map_len)
                    .map_mut(&file)
                    .map(Mapping::ReadWrite),
                AccessMode::ReadOnly => MmapOptions::new()
                    .len(map_len)
                    .map(&file)
                    .map(Mapping::ReadOnly),
            }
        }
        .map_err(|e| CacheError::io_at("map backing file", path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            map_name: map_name.to_string(),
            capacity,
            access_mode,
            file: Some(file),
            mapping: Some(mapping),
            identity: FileIdentity::of(&metadata),
            closed: false,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Whether a mapping is currently held. A region whose re-map failed is
    /// unmapped without being closed.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Whether [`Self::close`] was called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_bounds(&self, offset: u64, len: u64) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(offset as usize..end as usize),
            _ => Err(CacheError::OutOfBounds {
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }

    fn mapping(&self) -> Result<&Mapping> {
        self.mapping.as_ref().ok_or(CacheError::Closed)
    }

    fn mapping_mut(&mut self) -> Result<&mut MmapMut> {
        match self.mapping.as_mut() {
            Some(Mapping::ReadWrite(mmap)) => Ok(mmap),
            Some(Mapping::ReadOnly(_)) => Err(CacheError::ReadOnly),
            None => Err(CacheError::Closed),
        }
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let range = self.check_bounds(offset, len)?;
        Ok(&self.mapping()?.as_slice()[range])
    }

    /// Copies `len` bytes starting at `offset` out of the mapping.
    pub fn read_bytes(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.slice(offset, len).map(<[u8]>::to_vec)
    }

    /// Copies `bytes` into the mapping at `offset`.
    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let range = self.check_bounds(offset, bytes.len() as u64)?;
        self.mapping_mut()?[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Sets `len` bytes starting at `offset` to `byte`.
    pub fn fill(&mut self, offset: u64, len: u64, byte: u8) -> Result<()> {
        let range = self.check_bounds(offset, len)?;
        self.mapping_mut()?[range].fill(byte);
        Ok(())
    }

    /// Flushes dirty pages in the given range to the backing file.
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        let range = self.check_bounds(offset, len)?;
        match self.mapping()? {
            Mapping::ReadWrite(mmap) => mmap
                .flush_range(range.start, range.len())
                .map_err(|e| CacheError::io_at("flush shared region", &self.path, e)),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    /// Returns `true` when the file at `path` is no longer the file this
    /// region has mapped (deleted, or replaced by another process).
    pub fn is_stale(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(metadata) => FileIdentity::of(&metadata) != self.identity,
            Err(_) => true,
        }
    }

    /// Maps the file currently at `path` again. The existing mapping is only
    /// replaced once the new one is established.
    pub fn reopen(&mut self) -> Result<()> {
        let fresh = Self::open(&self.path, &self.map_name, self.capacity, self.access_mode)?;
        *self = fresh;
        Ok(())
    }

    /// Unmaps and deletes the backing file, then creates a fresh, zero-filled
    /// one in its place.
    pub fn recreate(&mut self) -> Result<()> {
        if !self.access_mode.is_writable() {
            return Err(CacheError::ReadOnly);
        }

        self.unmap();

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io_at("delete backing file", &self.path, e)),
        }

        info!("Recreating shared region '{}' at {}.", self.map_name, self.path.display());
        self.reopen()
    }

    /// Releases the mapping and the file handle. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
        self.unmap();
    }

    fn unmap(&mut self) {
        if let Some(Mapping::ReadWrite(mmap)) = self.mapping.take() {
            if let Err(e) = mmap.flush() {
                debug!("Flush on close of {} failed: {}", self.path.display(), e);
            }
        }
        self.file = None;
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        self.unmap();
    }
}
