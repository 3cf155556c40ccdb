pub mod constants;

mod config;
pub use config::{AccessMode, CacheConfig};

mod error;
pub use error::{CacheError, Result, Zone};

mod shared_region;
pub use shared_region::SharedRegion;

mod free_list_allocator;
pub use free_list_allocator::{FreeBlock, FreeListAllocator};

mod index_table;
pub use index_table::{CacheEntry, HeaderCodec, IndexTable};

mod cross_process_lock;
pub use cross_process_lock::{CrossProcessLock, CrossProcessLockGuard};

mod shared_cache;
pub use shared_cache::{CacheStats, SharedCache};

#[cfg(feature = "async")]
mod async_shared_cache;
#[cfg(feature = "async")]
pub use async_shared_cache::AsyncSharedCache;

pub mod traits;
