/// Parses a size such as `4096`, `64k`, `10MB` or `1g` into bytes.
///
/// Units are case-insensitive powers of 1024.
pub fn parse_size(size_str: &str) -> Result<u64, String> {
    let size_str = size_str.trim().to_lowercase();

    // Find the position where the numeric part ends
    let num_end = size_str
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size_str.len());

    let (num_part, unit_part) = size_str.split_at(num_end);

    let multiplier: u64 = match unit_part.trim() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        other => return Err(format!("Invalid size unit: {}", other)),
    };

    num_part
        .parse::<u64>()
        .map_err(|_| format!("Failed to parse size: {}", size_str))?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", size_str))
}
