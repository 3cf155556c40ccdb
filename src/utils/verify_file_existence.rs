use std::path::Path;

/// Checks that `path` exists and is a regular file.
///
/// # Returns:
/// - `Ok(())` if the file exists and is a regular file.
/// - `Err(std::io::Error)` with `NotFound` or `InvalidInput` otherwise.
pub fn verify_file_existence(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Cache file '{}' does not exist.", path.display()),
        ));
    }

    if !path.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' is not a valid file.", path.display()),
        ));
    }

    Ok(())
}
