use crate::cache_engine::error::Result;

pub trait CacheReader {
    /// Retrieves the value stored under `key`.
    ///
    /// The index is reloaded from the header zone under the cross-process
    /// lock first, so writes made by other processes are always visible.
    ///
    /// # Returns:
    /// - `Ok(bytes)`: Exactly the bytes last written for `key`.
    /// - `Err(CacheError::NotFound)`: If the key has no live entry.
    /// - `Err(CacheError)`: On lock, I/O or header corruption failures.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Checks whether `key` currently has a live entry.
    fn contains(&self, key: &str) -> Result<bool>;

    /// Number of live keys.
    fn len(&self) -> Result<usize>;

    /// Whether the cache holds no keys.
    fn is_empty(&self) -> Result<bool>;

    /// All live keys, in ascending order.
    fn keys(&self) -> Result<Vec<String>>;
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncCacheReader {
    /// Async counterpart of [`CacheReader::get`].
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Async counterpart of [`CacheReader::contains`].
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Async counterpart of [`CacheReader::len`].
    async fn len(&self) -> Result<usize>;

    /// Async counterpart of [`CacheReader::is_empty`].
    async fn is_empty(&self) -> Result<bool>;

    /// Async counterpart of [`CacheReader::keys`].
    async fn keys(&self) -> Result<Vec<String>>;
}
