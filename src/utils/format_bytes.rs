/// Converts a byte count into a human-readable string.
///
/// Sizes of 1 KiB and above are shown with two decimals in **KB, MB or GB**
/// (powers of 1024); smaller sizes are shown in raw bytes.
///
/// # Examples
/// ```
/// use mmap_shared_cache::utils::format_bytes;
///
/// assert_eq!(format_bytes(500), "500 bytes");
/// assert_eq!(format_bytes(2048), "2.00 KB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
/// assert_eq!(format_bytes(8_796_093_440), "8.19 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        _ => format!("{} bytes", bytes),
    }
}
