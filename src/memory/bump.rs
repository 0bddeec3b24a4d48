//! Basic (downward) bump allocation and line map
//!

use std::{fmt::Debug, ptr::NonNull};

use bitmaps::Bitmap;

use super::block::{Block, BlockError};

/// 32K Block
pub const BLOCK_SIZE_BITS: usize = 15;
/// 32K Block
pub const BLOCK_SIZE_BYTES: usize = 1 << BLOCK_SIZE_BITS;

/// 128 byte line
pub const LINE_SIZE_BITS: usize = 7;
/// 128 byte line
pub const LINE_SIZE_BYTES: usize = 1 << LINE_SIZE_BITS;
/// Lines in a block
pub const LINE_COUNT: usize = BLOCK_SIZE_BYTES / LINE_SIZE_BYTES;

/// Maximum allocation size
pub const MAX_ALLOC_SIZE: usize = u32::MAX as usize;

/// LineMap contains mark flags for each line
#[derive(Default)]
pub struct LineMap(Bitmap<LINE_COUNT>);

impl LineMap {
    /// Mark the specified line
    pub fn mark(&mut self, index: usize) {
        debug_assert!(index < LINE_COUNT);
        self.0.set(index, true);
    }

    /// Check whether the specified line is marked
    pub fn marked(&self, index: usize) -> bool {
        debug_assert!(index < LINE_COUNT);
        self.0.get(index)
    }

    /// Clear all lines
    pub fn reset(&mut self) {
        self.0 = Bitmap::new();
    }

    /// True if no line is marked
    pub fn is_clear(&self) -> bool {
        self.0.is_empty()
    }

    /// Find next hole
    ///
    /// Work downward through the line map. Like immix we use
    /// "conservative marking" that means we need two clear lines to
    /// recognise a gap.
    ///
    /// Returns memory byte offsets (within the block) of the next hole.
    pub fn find_hole(&self, below_offset: usize) -> Option<(usize, usize)> {
        let limit_line = below_offset / LINE_SIZE_BYTES;
        let mut count = 0;
        let mut upper: Option<usize> = None;
        let mut lower = below_offset;

        for line in (0..limit_line).rev() {
            if !self.marked(line) {
                count += 1;
                lower = line;

                if upper.is_none() {
                    upper = Some(line + count);
                }
            } else {
                if count > 1 {
                    if let Some(hole) = upper.and_then(|u| Self::conservative_hole(lower, u)) {
                        return Some(hole);
                    }
                }

                count = 0;
                upper = None;
            }
        }

        // hole running down to the start of the block
        if count > 1 {
            return upper.and_then(|u| Self::conservative_hole(lower, u));
        }

        None
    }

    /// Byte range for a run of free lines, excluding the top line
    fn conservative_hole(hole_lower: usize, hole_upper: usize) -> Option<(usize, usize)> {
        let conservative_upper = if hole_upper > hole_lower + 1 {
            hole_upper - 1
        } else {
            hole_upper
        };

        if conservative_upper > hole_lower {
            let lower_bytes = hole_lower * LINE_SIZE_BYTES;
            let upper_bytes = conservative_upper * LINE_SIZE_BYTES;
            debug_assert!(upper_bytes <= BLOCK_SIZE_BYTES);
            Some((lower_bytes, upper_bytes))
        } else {
            None
        }
    }

    /// Returns (count holes, count free, count marked)
    pub fn stats(&self) -> (usize, usize, usize) {
        let mut count_holes = 0;
        let mut free = 0;
        let mut marked = 0;
        let mut last = true;
        for i in 0..LINE_COUNT {
            let current = self.marked(i);
            if current {
                marked += 1
            } else {
                free += 1
            }
            if last && !current {
                count_holes += 1
            }
            last = current;
        }
        (count_holes, free, marked)
    }
}

impl Debug for LineMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dwords: [u128; 2] = self.0.into();
        for dword in dwords {
            let lo = (dword as u64).reverse_bits();
            let hi = ((dword >> 64) as u64).reverse_bits();
            writeln!(f, "{lo:#018x} {hi:#018x}")?;
        }
        Ok(())
    }
}

/// A memory block with downward bump allocation machinery and a mark
/// map
pub struct BumpBlock {
    /// Block
    block: Block,
    /// Lower limit offset
    lower: usize,
    /// Pointer to move as regions are allocated
    cursor: usize,
    /// Block map to store mark flags
    line_map: LineMap,
}

// Blocks are ordered by address so the collector can binary search
// for the block containing a pointer.

impl PartialEq for BumpBlock {
    fn eq(&self, other: &Self) -> bool {
        self.block.as_ptr() == other.block.as_ptr()
    }
}

impl Eq for BumpBlock {}

impl PartialOrd for BumpBlock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BumpBlock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.block.as_ptr().cmp(&other.block.as_ptr())
    }
}

impl Debug for BumpBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:p} {}:{}:{}",
            self.block.as_ptr(),
            self.block.size(),
            self.cursor,
            self.lower
        )?;
        write!(f, "{:?}", self.line_map)
    }
}

impl BumpBlock {
    /// Acquire a fresh new block ready to start bumping downwards
    pub fn new() -> Result<Self, BlockError> {
        Ok(BumpBlock {
            block: Block::new(BLOCK_SIZE_BYTES)?,
            cursor: BLOCK_SIZE_BYTES,
            lower: 0,
            line_map: LineMap::default(),
        })
    }

    /// Start address of the underlying block
    pub fn base_address(&self) -> usize {
        self.block.as_ptr() as usize
    }

    /// Bump cursor back by size
    pub fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.cursor {
            None
        } else {
            let next = self.cursor - size;
            if next < self.lower {
                // find next hole below the current one
                if let Some((lower, cursor)) = self.line_map.find_hole(self.lower) {
                    if cfg!(debug_assertions) {
                        self.block.fill(lower, cursor - lower);
                    }

                    self.lower = lower;
                    self.cursor = cursor;
                    self.bump(size)
                } else {
                    None
                }
            } else {
                self.cursor = next;
                // SAFETY: next < BLOCK_SIZE_BYTES so the result is
                // inside the block and therefore non-null
                NonNull::new(unsafe { self.block.as_ptr().add(next) } as *mut u8)
            }
        }
    }

    /// Recycle partially used block; reset cursor etc.
    pub fn recycle(&mut self) -> bool {
        if let Some((lower, cursor)) = self.line_map.find_hole(BLOCK_SIZE_BYTES) {
            self.cursor = cursor;
            self.lower = lower;
            true
        } else {
            self.cursor = 0;
            self.lower = 0;
            false
        }
    }

    /// Size in bytes of the hole we're currently allocating into
    pub fn current_hole_size(&self) -> usize {
        self.cursor - self.lower
    }

    /// Reset line maps ready for GC trace
    pub fn reset_region_marks(&mut self) {
        self.line_map.reset();
    }

    /// True if the last trace found nothing live in this block
    pub fn is_unmarked(&self) -> bool {
        self.line_map.is_clear()
    }

    /// If ptr is within the block, mark every line touched by the
    /// region starting at ptr and extending for bytes.
    ///
    /// Returns whether the region was inside this block.
    pub fn mark_region(&mut self, ptr: NonNull<u8>, bytes: usize) -> bool {
        if let Some(offset) = self.block.byte_offset_of(ptr) {
            let first_line = offset / LINE_SIZE_BYTES;
            let last_line = (offset + bytes.max(1) - 1) / LINE_SIZE_BYTES;
            debug_assert!(last_line < LINE_COUNT);
            for line in first_line..=last_line.min(LINE_COUNT - 1) {
                self.line_map.mark(line);
            }
            true
        } else {
            false
        }
    }

    /// Returns (count holes, count free, count marked)
    pub fn stats(&self) -> (usize, usize, usize) {
        self.line_map.stats()
    }
}
