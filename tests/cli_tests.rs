use mmap_shared_cache::{
    CacheConfig, SharedCache,
    traits::{CacheReader, CacheWriter},
};
use serial_test::serial;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::tempdir;

const BIN: &str = env!("CARGO_BIN_EXE_mmap-shared-cache");

fn cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("--dir")
        .arg(dir)
        .args(args)
        .output()
        .expect("Failed to execute process")
}

fn library_handle(dir: &Path) -> SharedCache {
    // Must match the CLI defaults: 10MB file with a 1MB header.
    SharedCache::open(CacheConfig::in_directory(dir)).expect("Failed to open cache")
}

#[test]
#[serial]
fn test_set_and_get() {
    let dir = tempdir().expect("Failed to create temp dir");

    let output = cli(dir.path(), &["set", "test_key", "hello"]);
    assert!(output.status.success(), "Set command failed: {:?}", output);

    let output = cli(dir.path(), &["get", "test_key"]);
    assert!(output.status.success(), "Get command failed: {:?}", output);
    assert_eq!(output.stdout, b"hello");
}

#[test]
#[serial]
fn test_set_without_value() {
    let dir = tempdir().expect("Failed to create temp dir");

    let output = Command::new(BIN)
        .arg("--dir")
        .arg(dir.path())
        .args(["set", "test_key"])
        .env("FORCE_NO_TTY", "1")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute process");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("No value provided"),
        "Unexpected error message: {:?}",
        stderr
    );
}

#[test]
#[serial]
fn test_set_from_stdin() {
    let dir = tempdir().expect("Failed to create temp dir");
    let large_value = "A".repeat(128 * 1024);

    let mut child = Command::new(BIN)
        .arg("--dir")
        .arg(dir.path())
        .args(["set", "large_key"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute process");

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(large_value.as_bytes())
            .expect("Failed to write to stdin");
    }

    let output = child
        .wait_with_output()
        .expect("Failed to wait on child process");
    assert!(output.status.success(), "Set command failed: {:?}", output);

    let output = cli(dir.path(), &["get", "large_key"]);
    assert_eq!(output.stdout.len(), large_value.len());
}

#[test]
#[serial]
fn test_get_missing_key_exits_with_not_found() {
    let dir = tempdir().expect("Failed to create temp dir");

    let output = cli(dir.path(), &["get", "nonexistent_key"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("nonexistent_key"),
        "Unexpected error output: {:?}",
        stderr
    );
}

#[test]
#[serial]
fn test_cli_and_library_share_one_cache() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = library_handle(dir.path());

    // Library writes, another process reads.
    cache.set("from_library", b"written in-process").unwrap();
    let output = cli(dir.path(), &["get", "from_library"]);
    assert_eq!(output.stdout, b"written in-process");

    // Another process writes, library reads.
    let output = cli(dir.path(), &["set", "from_cli", "written by child"]);
    assert!(output.status.success(), "Set command failed: {:?}", output);
    assert_eq!(cache.get("from_cli").unwrap(), b"written by child");

    // Another process clears; the library handle re-maps and sees nothing.
    let output = cli(dir.path(), &["clear"]);
    assert!(output.status.success(), "Clear command failed: {:?}", output);
    assert!(cache.is_empty().unwrap());
}

#[test]
#[serial]
fn test_keys_remove_and_info() {
    let dir = tempdir().expect("Failed to create temp dir");

    for (key, value) in [("b", "2"), ("a", "1"), ("c", "3")] {
        assert!(cli(dir.path(), &["set", key, value]).status.success());
    }

    let output = cli(dir.path(), &["keys"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a\nb\nc\n");

    assert!(cli(dir.path(), &["remove", "b"]).status.success());
    assert_eq!(cli(dir.path(), &["remove", "b"]).status.code(), Some(1));

    let output = cli(dir.path(), &["info"]);
    assert!(output.status.success(), "Info command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ACTIVE ENTRIES:"), "Unexpected info: {}", stdout);
    assert!(stdout.contains(" 2\n"), "Unexpected info: {}", stdout);
}

#[test]
#[serial]
fn test_read_only_rejects_writes() {
    let dir = tempdir().expect("Failed to create temp dir");

    // Nothing to open yet.
    let output = cli(dir.path(), &["--read-only", "get", "k"]);
    assert_eq!(output.status.code(), Some(2));

    assert!(cli(dir.path(), &["set", "k", "v"]).status.success());

    let output = cli(dir.path(), &["--read-only", "get", "k"]);
    assert_eq!(output.stdout, b"v");

    let output = cli(dir.path(), &["--read-only", "set", "k", "w"]);
    assert_eq!(output.status.code(), Some(2));
}
