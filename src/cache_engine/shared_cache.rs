use crate::cache_engine::config::{AccessMode, CacheConfig};
use crate::cache_engine::constants::FILL_BYTE;
use crate::cache_engine::cross_process_lock::CrossProcessLock;
use crate::cache_engine::error::{CacheError, Result, Zone};
use crate::cache_engine::free_list_allocator::FreeListAllocator;
use crate::cache_engine::index_table::{CacheEntry, HeaderCodec, IndexTable};
use crate::cache_engine::shared_region::SharedRegion;
use crate::cache_engine::traits::{CacheReader, CacheWriter};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Point-in-time occupancy figures for a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Total size of the backing file.
    pub capacity: u64,
    /// Size of the header zone.
    pub header_size: u64,
    /// Size of the data zone.
    pub data_zone_size: u64,
    /// Bytes of the header zone taken by the serialized index.
    pub header_bytes_used: u64,
    /// Number of live keys.
    pub entries: usize,
    /// Bytes of the data zone referenced by live keys.
    pub live_bytes: u64,
    /// Number of holes below the watermark.
    pub free_blocks: usize,
    /// Bytes available for new values (holes plus the untouched tail).
    pub free_bytes: u64,
    /// End of the highest live range.
    pub watermark: u64,
}

/// Mutable view of the shared region as seen by this process.
struct CacheState {
    region: SharedRegion,
    index: IndexTable,
    allocator: FreeListAllocator,
}

impl CacheState {
    /// Re-maps the region if the backing file was replaced (or an earlier
    /// re-map failed), then reloads the index from the header and derives
    /// free space from it.
    fn refresh(&mut self, codec: &HeaderCodec) -> Result<()> {
        if !self.region.is_mapped() {
            info!(
                "Retrying mapping of {} after an earlier failure.",
                self.region.path().display()
            );
            self.region.reopen()?;
        } else if self.region.is_stale() {
            info!(
                "Backing file {} was replaced by another process; re-mapping.",
                self.region.path().display()
            );
            self.region.reopen()?;
        }

        self.index = codec.load(&self.region)?;
        self.allocator = FreeListAllocator::rebuild(self.index.live_ranges());
        Ok(())
    }
}

struct CacheInner {
    config: CacheConfig,
    codec: HeaderCodec,
    lock: CrossProcessLock,
    state: Mutex<CacheState>,
}

impl CacheInner {
    /// Converts a data-zone offset into a file offset.
    #[inline]
    fn absolute(&self, offset: u64) -> Result<u64> {
        self.config
            .header_size
            .checked_add(offset)
            .ok_or(CacheError::OutOfBounds {
                offset,
                len: 0,
                capacity: self.config.capacity,
            })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.access_mode.is_writable() {
            Ok(())
        } else {
            Err(CacheError::ReadOnly)
        }
    }

    fn flush(&self, region: &SharedRegion, offset: u64, len: u64) -> Result<()> {
        if self.config.flush_on_write && len > 0 {
            region.flush_range(offset, len)?;
        }
        Ok(())
    }

    /// Allocates `length` bytes and verifies the range lies inside the data zone.
    fn allocate(&self, allocator: &mut FreeListAllocator, length: u32) -> Result<CacheEntry> {
        let data_zone_size = self.codec.data_zone_size();
        let available = largest_free_extent(allocator, data_zone_size);

        let offset = allocator.allocate(length);
        let fits = offset
            .checked_add(length as u64)
            .is_some_and(|end| end <= data_zone_size);

        if !fits {
            return Err(CacheError::CapacityExceeded {
                zone: Zone::Data,
                required: length as u64,
                available,
            });
        }

        Ok(CacheEntry { offset, length })
    }

    /// Writes `header` into the header zone.
    fn persist(&self, region: &mut SharedRegion, header: &[u8]) -> Result<()> {
        self.codec.write_encoded(region, header)?;
        self.flush(region, 0, self.config.header_size)
    }

    /// Zeroes the parts of `vacated` that are not covered by `keep`.
    fn scrub(&self, region: &mut SharedRegion, vacated: CacheEntry, keep: CacheEntry) -> Result<()> {
        let pieces = [
            (vacated.offset, vacated.end().min(keep.offset)),
            (vacated.offset.max(keep.end()), vacated.end()),
        ];

        for (start, end) in pieces {
            if end > start {
                let position = self.absolute(start)?;
                region.fill(position, end - start, FILL_BYTE)?;
                self.flush(region, position, end - start)?;
            }
        }

        Ok(())
    }
}

fn largest_free_extent(allocator: &FreeListAllocator, data_zone_size: u64) -> u64 {
    let tail = data_zone_size.saturating_sub(allocator.watermark());
    allocator
        .free_blocks()
        .iter()
        .map(|block| block.length as u64)
        .max()
        .unwrap_or(0)
        .max(tail)
}

enum Refresh {
    Required,
    BestEffort,
}

/// Key/value cache shared between processes through one memory-mapped file.
///
/// Every operation runs the same envelope: take the cross-process lock,
/// reload the index from the header zone, do the work, persist the index if
/// anything changed, release the lock. All keys contend on that one lock.
///
/// Handles are cheap to clone; clones share the same mapping and lock.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SharedCache {
    /// Opens the cache described by `config`, creating the backing file and
    /// lock file if they do not exist.
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration is unusable or an existing
    ///   backing file has a different capacity.
    /// - `CorruptIndex` if the header zone cannot be decoded.
    /// - `LockFailure` / `IoAt` on lock or file failures.
    pub fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let lock = CrossProcessLock::open(
            &config.lock_path(),
            config.lock_timeout,
            config.access_mode,
        )?;
        let codec = HeaderCodec::new(config.header_size, config.capacity);

        let state = {
            let _guard = lock.acquire()?;
            let region = SharedRegion::open(
                &config.data_path(),
                &config.map_name,
                config.capacity,
                config.access_mode,
            )?;
            let index = codec.load(&region)?;
            let allocator = FreeListAllocator::rebuild(index.live_ranges());
            CacheState {
                region,
                index,
                allocator,
            }
        };

        info!(
            "Opened shared cache '{}' at {} ({} entries).",
            config.map_name,
            config.data_path().display(),
            state.index.len()
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                config,
                codec,
                lock,
                state: Mutex::new(state),
            }),
        })
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Path of the backing file.
    pub fn data_path(&self) -> PathBuf {
        self.inner.config.data_path()
    }

    /// Path of the lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.inner.lock.path().to_path_buf()
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.inner.config.access_mode == AccessMode::ReadOnly
    }

    /// Unmaps the region. Later operations on this handle (and its clones)
    /// fail with [`CacheError::Closed`]. Calling it twice is harmless.
    pub fn close(&self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.region.close();
        debug!("Closed shared cache '{}'.", self.inner.config.map_name);
    }

    /// Occupancy of the data and header zones.
    pub fn stats(&self) -> Result<CacheStats> {
        self.locked(Refresh::Required, |state, inner| {
            let data_zone_size = inner.codec.data_zone_size();
            let watermark = state.allocator.watermark();

            Ok(CacheStats {
                capacity: inner.config.capacity,
                header_size: inner.config.header_size,
                data_zone_size,
                header_bytes_used: inner.codec.used_bytes(&state.region)?,
                entries: state.index.len(),
                live_bytes: state.index.live_bytes(),
                free_blocks: state.allocator.free_block_count(),
                free_bytes: state.allocator.free_bytes()
                    + data_zone_size.saturating_sub(watermark),
                watermark,
            })
        })
    }

    /// Runs `op` inside the operation envelope.
    fn locked<T>(
        &self,
        refresh: Refresh,
        op: impl FnOnce(&mut CacheState, &CacheInner) -> Result<T>,
    ) -> Result<T> {
        let inner = &*self.inner;

        // State is reloaded under the lock on every call, so a poisoned
        // mutex carries nothing that could be stale.
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.region.is_closed() {
            return Err(CacheError::Closed);
        }

        let _guard = inner.lock.acquire()?;

        match refresh {
            Refresh::Required => state.refresh(&inner.codec)?,
            Refresh::BestEffort => {
                if let Err(e) = state.refresh(&inner.codec) {
                    warn!("Ignoring unreadable index before clear: {}", e);
                }
            }
        }

        op(&mut state, inner)
    }
}

fn not_found(key: &str) -> CacheError {
    CacheError::NotFound {
        key: key.to_string(),
    }
}

impl CacheReader for SharedCache {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.locked(Refresh::Required, |state, inner| {
            let entry = state.index.get(key).ok_or_else(|| not_found(key))?;
            state
                .region
                .read_bytes(inner.absolute(entry.offset)?, entry.length as u64)
        })
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.locked(Refresh::Required, |state, _| Ok(state.index.contains_key(key)))
    }

    fn len(&self) -> Result<usize> {
        self.locked(Refresh::Required, |state, _| Ok(state.index.len()))
    }

    fn is_empty(&self) -> Result<bool> {
        self.locked(Refresh::Required, |state, _| Ok(state.index.is_empty()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.locked(Refresh::Required, |state, _| {
            Ok(state.index.keys().map(str::to_string).collect())
        })
    }
}

impl CacheWriter for SharedCache {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.ensure_writable()?;

        let length = u32::try_from(value.len()).map_err(|_| CacheError::CapacityExceeded {
            zone: Zone::Data,
            required: value.len() as u64,
            available: u32::MAX as u64,
        })?;

        self.locked(Refresh::Required, |state, inner| {
            // Plan against copies so a failure leaves the live state untouched.
            let mut allocator = state.allocator.clone();

            let (entry, vacated) = match state.index.get(key) {
                None => (inner.allocate(&mut allocator, length)?, None),
                Some(old) if length > old.length => {
                    // Prefer a range disjoint from the published one; only
                    // reuse the old bytes when nothing else fits.
                    let mut disjoint = allocator.clone();
                    let entry = match inner.allocate(&mut disjoint, length) {
                        Ok(entry) => {
                            allocator = disjoint;
                            allocator.free(old.offset, old.length);
                            entry
                        }
                        Err(e) if e.is_capacity_exceeded() => {
                            allocator.free(old.offset, old.length);
                            inner.allocate(&mut allocator, length)?
                        }
                        Err(e) => return Err(e),
                    };
                    (entry, Some(old))
                }
                Some(old) => {
                    let entry = CacheEntry {
                        offset: old.offset,
                        length,
                    };
                    allocator.free(entry.end(), old.length - length);
                    (entry, Some(old))
                }
            };

            let mut index = state.index.clone();
            index.insert(key, entry);
            let header = inner.codec.encode(&index)?;

            // Bytes still referenced by the published entry are never
            // overwritten: the key is unpublished first, so a crash leaves
            // either the old value, no value, or the new value.
            let clobbers_published = vacated
                .is_some_and(|old| entry.offset < old.end() && old.offset < entry.end());
            if clobbers_published {
                let mut unpublished = state.index.clone();
                unpublished.remove(key);
                inner.persist(&mut state.region, &inner.codec.encode(&unpublished)?)?;
            }

            // Order matters: value bytes, then the index that publishes them,
            // then scrubbing of whatever the old entry no longer covers.
            let position = inner.absolute(entry.offset)?;
            state.region.write_bytes(position, value)?;
            inner.flush(&state.region, position, entry.length as u64)?;

            inner.persist(&mut state.region, &header)?;

            if let Some(old) = vacated {
                inner.scrub(&mut state.region, old, entry)?;
            }

            debug!(
                "Set {:?} at data offset {} ({} bytes).",
                key, entry.offset, entry.length
            );

            state.index = index;
            state.allocator = allocator;
            Ok(())
        })
        .inspect_err(|e| {
            if e.is_capacity_exceeded() {
                warn!("Refused to store {:?} in '{}': {}", key, self.inner.config.map_name, e);
            }
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.ensure_writable()?;

        self.locked(Refresh::Required, |state, inner| {
            let entry = state.index.get(key).ok_or_else(|| not_found(key))?;

            let mut index = state.index.clone();
            index.remove(key);
            let header = inner.codec.encode(&index)?;

            // Unpublish first so a crash can only leave orphaned bytes behind.
            inner.persist(&mut state.region, &header)?;
            inner.scrub(
                &mut state.region,
                entry,
                CacheEntry {
                    offset: entry.offset,
                    length: 0,
                },
            )?;

            state.index = index;
            state.allocator.free(entry.offset, entry.length);

            debug!("Removed {:?} ({} bytes freed).", key, entry.length);
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.inner.ensure_writable()?;

        self.locked(Refresh::BestEffort, |state, inner| {
            state.index.clear();
            state.allocator.reset();

            state.region.recreate()?;
            inner.codec.save(&mut state.region, &state.index)?;
            inner.flush(&state.region, 0, inner.config.header_size)?;

            info!("Cleared shared cache '{}'.", inner.config.map_name);
            Ok(())
        })
    }
}
