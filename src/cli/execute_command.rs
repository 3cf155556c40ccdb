use crate::cache_engine::{
    CacheError, SharedCache,
    traits::{CacheReader, CacheWriter},
};
use crate::cli::{Cli, Commands};
use crate::utils::{format_bytes, verify_file_existence};
use std::io::{self, IsTerminal, Read, Write};
use std::process::ExitCode;

/// Exit code used when a key is absent.
const EXIT_NOT_FOUND: u8 = 1;
/// Exit code used for every other failure.
const EXIT_FAILURE: u8 = 2;

/// Executes a parsed CLI command against the shared cache.
///
/// Opens the cache described by the global flags, runs the subcommand and
/// maps failures to exit codes: `1` when a key is missing, `2` otherwise.
/// Errors are reported on stderr.
///
/// # References
/// - [`Commands`](crate::cli::Commands): Defines the available CLI commands.
/// - [`SharedCache`](crate::cache_engine::SharedCache): The underlying cache.
pub fn execute_command(cli: &Cli) -> ExitCode {
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError::Cache(err)) if err.is_not_found() => {
            eprintln!("Error: {}", err);
            ExitCode::from(EXIT_NOT_FOUND)
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

fn open_cache(cli: &Cli) -> Result<SharedCache, CommandError> {
    let config = cli.cache_config().map_err(CommandError::Usage)?;

    if cli.read_only {
        verify_file_existence(&config.data_path())?;
    }

    Ok(SharedCache::open(config)?)
}

fn run(cli: &Cli) -> Result<(), CommandError> {
    let cache = open_cache(cli)?;

    match &cli.command {
        Commands::Set { key, value } => {
            if let Some(value) = value {
                cache.set(key, value.as_bytes())?;
            } else if !io::stdin().is_terminal() && std::env::var("FORCE_NO_TTY").is_err() {
                // Values must be fully buffered; the cache stores them in one slot.
                let mut buffer = Vec::new();
                io::stdin().lock().read_to_end(&mut buffer)?;
                cache.set(key, &buffer)?;
            } else {
                return Err(CommandError::Usage(
                    "No value provided and stdin is empty.".into(),
                ));
            }

            println!("Stored '{}'", key);
        }

        Commands::Get { key } => {
            let value = cache.get(key)?;

            let stdout = io::stdout();
            let mut stdout_handle = stdout.lock();
            stdout_handle.write_all(&value)?;

            // Ensure a newline at the end if it's a terminal
            if stdout_handle.is_terminal() {
                stdout_handle.write_all(b"\n")?;
            }
            stdout_handle.flush()?;
        }

        Commands::Remove { key } => {
            cache.remove(key)?;
            eprintln!("Removed key '{}'", key);
        }

        Commands::Clear => {
            cache.clear()?;
            println!("Cleared {}", cache.data_path().display());
        }

        Commands::Keys => {
            let stdout = io::stdout();
            let mut stdout_handle = stdout.lock();
            for key in cache.keys()? {
                writeln!(stdout_handle, "{}", key)?;
            }
        }

        Commands::Info => {
            let stats = cache.stats()?;

            println!("\n{:=^50}", " CACHE INFO ");
            println!("{:<25} {:?}", "CACHE FILE:", cache.data_path());
            println!("{:<25} {:?}", "LOCK FILE:", cache.lock_path());
            println!("{:<25} {}", "MAP NAME:", cache.config().map_name);
            println!("{:-<50}", ""); // Separator

            println!("{:<25} {}", "CAPACITY:", format_bytes(stats.capacity));
            println!(
                "{:<25} {} of {}",
                "HEADER USED:",
                format_bytes(stats.header_bytes_used),
                format_bytes(stats.header_size)
            );
            println!("{:<25} {}", "DATA ZONE:", format_bytes(stats.data_zone_size));
            println!("{:<25} {}", "ACTIVE ENTRIES:", stats.entries);
            println!("{:<25} {}", "LIVE DATA:", format_bytes(stats.live_bytes));
            println!("{:<25} {}", "FREE DATA:", format_bytes(stats.free_bytes));
            println!("{:<25} {}", "FREE BLOCKS:", stats.free_blocks);
            println!("{:<25} {}", "WATERMARK:", stats.watermark);

            println!("{:=<50}", ""); // Footer
        }
    }

    Ok(())
}
