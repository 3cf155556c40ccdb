mod reader;
pub use reader::CacheReader;
#[cfg(feature = "async")]
pub use reader::AsyncCacheReader;

mod writer;
pub use writer::CacheWriter;
#[cfg(feature = "async")]
pub use writer::AsyncCacheWriter;
