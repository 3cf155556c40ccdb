use crate::cache_engine::config::CacheConfig;
use crate::cache_engine::error::{CacheError, Result};
use crate::cache_engine::shared_cache::{CacheStats, SharedCache};
use crate::cache_engine::traits::{AsyncCacheReader, AsyncCacheWriter, CacheReader, CacheWriter};

/// Async front end for [`SharedCache`].
///
/// Each call runs the blocking operation on Tokio's blocking pool. Dropping
/// the returned future does not abort an operation that already holds the
/// cross-process lock; it runs to completion in the background.
#[derive(Debug, Clone)]
pub struct AsyncSharedCache {
    cache: SharedCache,
}

impl From<SharedCache> for AsyncSharedCache {
    fn from(cache: SharedCache) -> Self {
        Self { cache }
    }
}

impl AsyncSharedCache {
    /// Opens the cache off the calling thread.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || SharedCache::open(config))
            .await
            .map_err(|e| CacheError::BackgroundTask(e.to_string()))?
            .map(Self::from)
    }

    /// The synchronous handle this wraps.
    #[inline]
    pub fn blocking(&self) -> &SharedCache {
        &self.cache
    }

    pub fn into_inner(self) -> SharedCache {
        self.cache
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.run(|cache| cache.stats()).await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SharedCache) -> Result<T> + Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| CacheError::BackgroundTask(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl AsyncCacheReader for AsyncSharedCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let key = key.to_owned();
        self.run(move |cache| CacheReader::get(cache, &key)).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();
        self.run(move |cache| CacheReader::contains(cache, &key))
            .await
    }

    async fn len(&self) -> Result<usize> {
        self.run(|cache| CacheReader::len(cache)).await
    }

    async fn is_empty(&self) -> Result<bool> {
        self.run(|cache| CacheReader::is_empty(cache)).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.run(|cache| CacheReader::keys(cache)).await
    }
}

#[async_trait::async_trait]
impl AsyncCacheWriter for AsyncSharedCache {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.run(move |cache| CacheWriter::set(cache, &key, &value))
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_owned();
        self.run(move |cache| CacheWriter::remove(cache, &key))
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.run(|cache| CacheWriter::clear(cache)).await
    }
}
