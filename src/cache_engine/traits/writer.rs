use crate::cache_engine::error::Result;

pub trait CacheWriter {
    /// Stores `value` under `key`.
    ///
    /// # Slot Policy:
    /// - **New key**: a range of `value.len()` bytes is allocated (best fit,
    ///   falling back to the tail of used space).
    /// - **Larger value**: a fresh range is allocated away from the old one
    ///   when possible; the old range is then zeroed and freed. If only the
    ///   old range (merged with its free neighbours) can hold the value, that
    ///   space is reused.
    /// - **Same size or smaller**: the value is written in place at the same
    ///   offset; the vacated tail is zeroed and returned to free space.
    ///
    /// Value bytes are written before the index that publishes them. When
    /// the new value overwrites bytes of the currently published entry, the
    /// key is unpublished first. A crash therefore leaves the old value, no
    /// value, or the new value under `key`, never a mix of both.
    ///
    /// # Returns:
    /// - `Ok(())` once both data and index are written.
    /// - `Err(CacheError::CapacityExceeded)`: If the value does not fit in
    ///   the data zone, or the grown index does not fit in the header zone.
    ///   Nothing is modified in that case.
    /// - `Err(CacheError::ReadOnly)`: If the cache was opened read-only.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removes `key`, zeroing and freeing its range.
    ///
    /// # Returns:
    /// - `Err(CacheError::NotFound)`: If the key has no live entry.
    fn remove(&self, key: &str) -> Result<()>;

    /// Deletes the backing file, recreates it empty and persists an empty index.
    ///
    /// Other processes notice the replaced file on their next operation and
    /// re-map it.
    fn clear(&self) -> Result<()>;
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncCacheWriter {
    /// Async counterpart of [`CacheWriter::set`].
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Async counterpart of [`CacheWriter::remove`].
    async fn remove(&self, key: &str) -> Result<()>;

    /// Async counterpart of [`CacheWriter::clear`].
    async fn clear(&self) -> Result<()>;
}
