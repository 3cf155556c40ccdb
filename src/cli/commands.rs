use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a value under a key
    Set {
        /// The key to write
        key: String,

        /// The value to store (optional; reads from stdin if not provided)
        value: Option<String>,
    },

    /// Print the value stored under a key
    Get {
        /// The key to read
        key: String,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,
    },

    /// Delete and recreate the cache file, dropping every key
    Clear,

    /// List all keys
    Keys,

    /// Show occupancy of the cache file
    Info,
}
