use std::time::Duration;

/// Default total size of the backing file (header + data zones).
pub const DEFAULT_CAPACITY: u64 = 10 * 1024 * 1024; // 10 MiB

/// Default size of the header zone holding the serialized index.
pub const DEFAULT_HEADER_SIZE: u64 = 1024 * 1024; // 1 MiB

/// Default name of the backing file inside the cache directory.
pub const DEFAULT_FILE_NAME: &str = "SharedCache.dat";

/// Default name used to address the cache across processes.
pub const DEFAULT_MAP_NAME: &str = "SharedCache";

/// Extension of the lock file derived from the map name.
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// How long an operation waits for the cross-process lock by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting on a contended lock.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Fill byte for unused header space and vacated data ranges.
pub const FILL_BYTE: u8 = 0;
