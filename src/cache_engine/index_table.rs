use crate::cache_engine::constants::FILL_BYTE;
use crate::cache_engine::error::{CacheError, Result, Zone};
use crate::cache_engine::shared_region::SharedRegion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Location of one value in the data zone.
///
/// `offset` is relative to the start of the data zone, not the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub offset: u64,
    pub length: u32,
}

impl CacheEntry {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

/// Key → [`CacheEntry`] mapping; the durable state shared by all processes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexTable {
    entries: BTreeMap<String, CacheEntry>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).copied()
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces an entry, returning the previous one.
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(key.into(), entry)
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, CacheEntry> {
        self.entries.iter()
    }

    /// `(offset, length)` of every live value.
    pub fn live_ranges(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.entries.values().map(|e| (e.offset, e.length))
    }

    /// Sum of the recorded lengths of all entries.
    pub fn live_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.length as u64).sum()
    }
}

/// On-disk form of an entry. `Position` is an absolute file offset.
#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord {
    #[serde(rename = "Position")]
    position: u64,
    #[serde(rename = "Length")]
    length: u32,
}

/// Serializes an [`IndexTable`] into the header zone and back.
///
/// The header holds UTF-8 JSON of the form
/// `{"key":{"Position":<absolute offset>,"Length":<bytes>}}`, right-padded
/// with zero bytes up to `header_size`. An all-zero header is an empty table.
#[derive(Debug, Clone, Copy)]
pub struct HeaderCodec {
    header_size: u64,
    capacity: u64,
}

impl HeaderCodec {
    pub fn new(header_size: u64, capacity: u64) -> Self {
        Self {
            header_size,
            capacity,
        }
    }

    #[inline]
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    #[inline]
    pub fn data_zone_size(&self) -> u64 {
        self.capacity.saturating_sub(self.header_size)
    }

    /// Encodes `table`, converting relative offsets to absolute positions.
    ///
    /// # Errors
    /// `CapacityExceeded` (header zone) if the encoding is larger than the header.
    pub fn encode(&self, table: &IndexTable) -> Result<Vec<u8>> {
        let records: BTreeMap<&str, HeaderRecord> = table
            .iter()
            .map(|(key, entry)| {
                (
                    key.as_str(),
                    HeaderRecord {
                        position: self.header_size + entry.offset,
                        length: entry.length,
                    },
                )
            })
            .collect();

        let bytes = serde_json::to_vec(&records)
            .map_err(|e| CacheError::CorruptIndex(format!("failed to encode index: {e}")))?;

        if bytes.len() as u64 > self.header_size {
            return Err(CacheError::CapacityExceeded {
                zone: Zone::Header,
                required: bytes.len() as u64,
                available: self.header_size,
            });
        }

        Ok(bytes)
    }

    /// Decodes a header payload. Trailing fill bytes are ignored and an empty
    /// or all-zero payload yields an empty table.
    ///
    /// # Errors
    /// `CorruptIndex` if the payload is not a valid index, or if an entry
    /// points outside the data zone or overlaps another entry.
    pub fn decode(&self, bytes: &[u8]) -> Result<IndexTable> {
        let payload = strip_fill(bytes);
        if payload.is_empty() {
            return Ok(IndexTable::new());
        }

        let records: BTreeMap<String, HeaderRecord> = serde_json::from_slice(payload)
            .map_err(|e| CacheError::CorruptIndex(format!("failed to decode index: {e}")))?;

        let data_zone_size = self.data_zone_size();
        let mut table = IndexTable::new();

        for (key, record) in records {
            let offset = record.position.checked_sub(self.header_size).ok_or_else(|| {
                CacheError::CorruptIndex(format!(
                    "entry {key:?} starts at {} inside the header zone",
                    record.position
                ))
            })?;

            match offset.checked_add(record.length as u64) {
                Some(end) if end <= data_zone_size => {}
                _ => {
                    return Err(CacheError::CorruptIndex(format!(
                        "entry {key:?} at {} (+{} bytes) runs past the data zone ({data_zone_size} bytes)",
                        record.position, record.length
                    )));
                }
            }

            let entry = CacheEntry {
                offset,
                length: record.length,
            };

            table.insert(key, entry);
        }

        check_disjoint(&table)?;
        Ok(table)
    }

    /// Writes `table` at header offset 0 and zero-fills the rest of the
    /// header. Returns the number of payload bytes.
    pub fn save(&self, region: &mut SharedRegion, table: &IndexTable) -> Result<u64> {
        let bytes = self.encode(table)?;
        self.write_encoded(region, &bytes)
    }

    /// Writes an already encoded payload (see [`Self::encode`]) into the header.
    pub fn write_encoded(&self, region: &mut SharedRegion, bytes: &[u8]) -> Result<u64> {
        let used = bytes.len() as u64;
        if used > self.header_size {
            return Err(CacheError::CapacityExceeded {
                zone: Zone::Header,
                required: used,
                available: self.header_size,
            });
        }

        region.write_bytes(0, bytes)?;
        region.fill(used, self.header_size - used, FILL_BYTE)?;

        Ok(used)
    }

    /// Reads the full header zone and decodes it.
    pub fn load(&self, region: &SharedRegion) -> Result<IndexTable> {
        self.decode(region.slice(0, self.header_size)?)
    }

    /// Number of payload bytes currently stored in the header zone.
    pub fn used_bytes(&self, region: &SharedRegion) -> Result<u64> {
        Ok(strip_fill(region.slice(0, self.header_size)?).len() as u64)
    }
}

fn strip_fill(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != FILL_BYTE)
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

fn check_disjoint(table: &IndexTable) -> Result<()> {
    let mut ranges: Vec<(u64, u64)> = table
        .live_ranges()
        .filter(|&(_, len)| len > 0)
        .map(|(offset, len)| (offset, offset + len as u64))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        if pair[0].1 > pair[1].0 {
            return Err(CacheError::CorruptIndex(format!(
                "entries {:?} and {:?} overlap",
                pair[0], pair[1]
            )));
        }
    }

    Ok(())
}
