use crate::cache_engine::constants::{DEFAULT_FILE_NAME, DEFAULT_MAP_NAME};
use crate::cache_engine::{AccessMode, CacheConfig};
use crate::cli::{Commands, HELP_TEMPLATE};
use crate::utils::parse_size;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
   // Obtain during build time, not runtime
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
#[command(
    after_help = HELP_TEMPLATE.replace("%BINARY_NAME%", env!("CARGO_PKG_NAME"))
)]
pub struct Cli {
    /// Directory holding the cache file (defaults to the system temp directory).
    #[arg(long = "dir", value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    /// Name of the cache file inside the directory.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_FILE_NAME, global = true)]
    pub file_name: String,

    /// Name shared by every process using the same cache.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_MAP_NAME, global = true)]
    pub map_name: String,

    /// Total size of the cache file (e.g. 10MB).
    #[arg(long, value_name = "SIZE", default_value = "10MB", global = true)]
    pub capacity: String,

    /// Size of the index header zone (e.g. 1MB).
    #[arg(long, value_name = "SIZE", default_value = "1MB", global = true)]
    pub header_size: String,

    /// Map the cache read-only; mutating commands fail.
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Give up waiting for the cache lock after this many milliseconds (0 waits forever).
    #[arg(long, value_name = "MS", default_value_t = 30_000, global = true)]
    pub lock_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the cache configuration described by the global flags.
    pub fn cache_config(&self) -> Result<CacheConfig, String> {
        let mut config = CacheConfig::default()
            .with_file_name(self.file_name.clone())
            .with_map_name(self.map_name.clone())
            .with_capacity(parse_size(&self.capacity)?)
            .with_header_size(parse_size(&self.header_size)?)
            .with_access_mode(if self.read_only {
                AccessMode::ReadOnly
            } else {
                AccessMode::ReadWrite
            })
            .with_lock_timeout(match self.lock_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            });

        if let Some(directory) = &self.directory {
            config = config.with_directory(directory.clone());
        }

        Ok(config)
    }
}
