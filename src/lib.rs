//! Cross-process key/value cache over a fixed-size memory-mapped file.
//!
//! The backing file is split into a header zone, holding the serialized
//! key index, and a data zone, holding raw value bytes placed by a best-fit
//! free-list allocator. Every operation is serialized across processes by a
//! named file lock and starts by reloading the index from the header, so each
//! lock holder observes the latest state written by any process.
//!
//! ```no_run
//! use mmap_shared_cache::{
//!     CacheConfig, SharedCache,
//!     traits::{CacheReader, CacheWriter},
//! };
//!
//! let cache = SharedCache::open(CacheConfig::default())?;
//! cache.set("greeting", b"hello")?;
//! assert_eq!(cache.get("greeting")?, b"hello");
//! # Ok::<(), mmap_shared_cache::CacheError>(())
//! ```

pub mod cache_engine;
pub use cache_engine::*;

pub mod cli;

pub mod utils;
