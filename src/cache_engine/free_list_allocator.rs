use std::collections::BTreeMap;

/// A reclaimable contiguous range of the data zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub offset: u64,
    pub length: u32,
}

impl FreeBlock {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

/// In-memory offset allocator over the data zone.
///
/// Free blocks are kept ordered by offset so neighbours can be found for
/// coalescing. Requests that no free block can satisfy are carved from the
/// tail watermark.
///
/// The allocator does not know the size of the data zone: the offsets it
/// hands out may run past it, and the caller is expected to compare
/// `offset + size` against the zone size before using a range.
#[derive(Debug, Default, Clone)]
pub struct FreeListAllocator {
    /// `offset -> length`
    free_blocks: BTreeMap<u64, u32>,
    watermark: u64,
}

impl FreeListAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs the free space implied by a set of live `(offset, length)`
    /// ranges: every gap below the highest range end becomes a free block and
    /// the watermark is set to that end.
    ///
    /// Ranges must be pairwise disjoint. Zero-length ranges are ignored.
    pub fn rebuild<I>(live_ranges: I) -> Self
    where
        I: IntoIterator<Item = (u64, u32)>,
    {
        let mut ranges: Vec<(u64, u32)> = live_ranges
            .into_iter()
            .filter(|&(_, length)| length > 0)
            .collect();
        ranges.sort_unstable_by_key(|&(offset, _)| offset);

        let mut allocator = Self::new();
        let mut cursor = 0u64;

        for (offset, length) in ranges {
            if offset > cursor {
                // Gaps larger than a u32 are split into u32-sized blocks.
                let mut gap_start = cursor;
                while gap_start < offset {
                    let gap_len = (offset - gap_start).min(u32::MAX as u64) as u32;
                    allocator.free_blocks.insert(gap_start, gap_len);
                    gap_start += gap_len as u64;
                }
            }
            cursor = cursor.max(offset + length as u64);
        }

        allocator.watermark = cursor;
        allocator
    }

    /// Returns an offset for `size` bytes.
    ///
    /// Picks the smallest free block that can hold `size` (best fit). Among
    /// equally sized candidates the lowest offset wins, since blocks are
    /// scanned in offset order. An exact fit consumes the block; a larger
    /// block is shrunk from the front. When nothing fits, the range is carved
    /// from the watermark, which never fails.
    pub fn allocate(&mut self, size: u32) -> u64 {
        if size == 0 {
            return self.watermark;
        }

        let best = self
            .free_blocks
            .iter()
            .filter(|&(_, &length)| length >= size)
            .min_by_key(|&(&offset, &length)| (length, offset))
            .map(|(&offset, &length)| (offset, length));

        match best {
            Some((offset, length)) => {
                self.free_blocks.remove(&offset);
                if length > size {
                    self.free_blocks.insert(offset + size as u64, length - size);
                }
                offset
            }
            None => {
                let offset = self.watermark;
                self.watermark += size as u64;
                offset
            }
        }
    }

    /// Returns `[offset, offset + size)` to the free list, merging it with the
    /// free blocks that end exactly at `offset` and start exactly at its end.
    ///
    /// The caller must only free ranges it previously obtained from
    /// [`Self::allocate`] (or that [`Self::rebuild`] considered live).
    pub fn free(&mut self, offset: u64, size: u32) {
        if size == 0 {
            return;
        }

        let mut start = offset;
        let mut length = size as u64;

        if let Some((&prev_offset, &prev_len)) = self.free_blocks.range(..offset).next_back() {
            if prev_offset + prev_len as u64 == offset
                && length + prev_len as u64 <= u32::MAX as u64
            {
                self.free_blocks.remove(&prev_offset);
                start = prev_offset;
                length += prev_len as u64;
            }
        }

        let end = offset + size as u64;
        if let Some(&next_len) = self.free_blocks.get(&end) {
            if length + next_len as u64 <= u32::MAX as u64 {
                self.free_blocks.remove(&end);
                length += next_len as u64;
            }
        }

        self.free_blocks.insert(start, length as u32);
    }

    /// Drops all free blocks and rewinds the watermark to zero.
    pub fn reset(&mut self) {
        self.free_blocks.clear();
        self.watermark = 0;
    }

    #[inline]
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Free blocks in offset order.
    pub fn free_blocks(&self) -> Vec<FreeBlock> {
        self.free_blocks
            .iter()
            .map(|(&offset, &length)| FreeBlock { offset, length })
            .collect()
    }

    #[inline]
    pub fn free_block_count(&self) -> usize {
        self.free_blocks.len()
    }

    /// Total bytes held in free blocks (the space past the watermark is not counted).
    pub fn free_bytes(&self) -> u64 {
        self.free_blocks.values().map(|&len| len as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_allocation_from_empty() {
        let mut alloc = FreeListAllocator::new();
        assert_eq!(alloc.allocate(10), 0);
        assert_eq!(alloc.allocate(20), 10);
        assert_eq!(alloc.watermark(), 30);
        assert_eq!(alloc.free_block_count(), 0);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut alloc = FreeListAllocator::new();
        let a = alloc.allocate(100);
        let _b = alloc.allocate(50);
        alloc.free(a, 100);

        let c = alloc.allocate(40);
        assert!(c >= a && c + 40 <= a + 100, "expected reuse inside freed range");
        assert_eq!(
            alloc.free_blocks(),
            vec![FreeBlock {
                offset: 40,
                length: 60
            }]
        );
        assert_eq!(alloc.watermark(), 150);
    }

    #[test]
    fn test_exact_fit_consumes_block() {
        let mut alloc = FreeListAllocator::new();
        let a = alloc.allocate(16);
        let _b = alloc.allocate(16);
        alloc.free(a, 16);

        assert_eq!(alloc.allocate(16), a);
        assert_eq!(alloc.free_block_count(), 0);
    }

    #[test]
    fn test_best_fit_prefers_smallest_block() {
        let mut alloc = FreeListAllocator::new();
        let big = alloc.allocate(100);
        let _guard1 = alloc.allocate(1);
        let small = alloc.allocate(20);
        let _guard2 = alloc.allocate(1);

        alloc.free(big, 100);
        alloc.free(small, 20);

        // First fit would take the 100-byte block at offset 0.
        assert_eq!(alloc.allocate(15), small);
    }

    #[test]
    fn test_coalesces_with_preceding_block() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(150);
        alloc.free(0, 100);
        alloc.free(100, 50);

        assert_eq!(
            alloc.free_blocks(),
            vec![FreeBlock {
                offset: 0,
                length: 150
            }]
        );
    }

    #[test]
    fn test_coalesces_with_following_block() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(150);
        alloc.free(100, 50);
        alloc.free(0, 100);

        assert_eq!(
            alloc.free_blocks(),
            vec![FreeBlock {
                offset: 0,
                length: 150
            }]
        );
    }

    #[test]
    fn test_coalesces_both_sides_into_one_block() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(30);
        alloc.free(0, 10);
        alloc.free(20, 10);
        assert_eq!(alloc.free_block_count(), 2);

        alloc.free(10, 10);
        assert_eq!(
            alloc.free_blocks(),
            vec![FreeBlock {
                offset: 0,
                length: 30
            }]
        );
    }

    #[test]
    fn test_non_adjacent_blocks_stay_separate() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(30);
        alloc.free(0, 10);
        alloc.free(20, 10);
        assert_eq!(alloc.free_bytes(), 20);
        assert_eq!(alloc.free_block_count(), 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(64);
        alloc.free(0, 32);
        alloc.reset();

        assert_eq!(alloc.watermark(), 0);
        assert_eq!(alloc.free_block_count(), 0);
        assert_eq!(alloc.allocate(8), 0);
    }

    #[test]
    fn test_zero_sized_requests_do_not_touch_state() {
        let mut alloc = FreeListAllocator::new();
        alloc.allocate(8);
        assert_eq!(alloc.allocate(0), 8);
        alloc.free(4, 0);
        assert_eq!(alloc.watermark(), 8);
        assert_eq!(alloc.free_block_count(), 0);
    }

    #[test]
    fn test_rebuild_from_live_ranges() {
        let alloc = FreeListAllocator::rebuild(vec![(10, 20), (50, 5), (30, 0)]);

        assert_eq!(
            alloc.free_blocks(),
            vec![
                FreeBlock {
                    offset: 0,
                    length: 10
                },
                FreeBlock {
                    offset: 30,
                    length: 20
                },
            ]
        );
        assert_eq!(alloc.watermark(), 55);
    }

    #[test]
    fn test_rebuild_of_nothing_is_empty() {
        let alloc = FreeListAllocator::rebuild(Vec::new());
        assert_eq!(alloc.watermark(), 0);
        assert_eq!(alloc.free_block_count(), 0);
    }
}
