//! A large object allocation
//!
//! A memory region that contains a single object

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use super::block::BlockError;

/// A memory allocation containing a single large object, this
/// differs from Block in that it needn't be a power of two.
#[derive(Debug)]
pub struct LargeObjectBlock {
    /// Pointer to memory
    ptr: NonNull<u8>,
    /// Size of allocation
    size: usize,
    /// Whether the last trace found the object live
    marked: bool,
}

// SAFETY: exclusively owns its allocation, see Block
unsafe impl Send for LargeObjectBlock {}

impl LargeObjectBlock {
    /// Create a new LargeObjectBlock of size sufficient to contain
    /// `required_size` bytes.
    pub fn new(required_size: usize) -> Result<Self, BlockError> {
        let size = Self::efficient_size_for(required_size);
        Ok(LargeObjectBlock {
            ptr: Self::alloc_block(size)?,
            size,
            marked: false,
        })
    }

    /// Allocate a zeroed block directly from the system allocator
    fn alloc_block(size: usize) -> Result<NonNull<u8>, BlockError> {
        let layout =
            Layout::from_size_align(size, Self::align_for(size)).map_err(|_| BlockError::BadSize)?;
        // SAFETY: size is non-zero (efficient_size_for never returns
        // zero) and the returned pointer is null-checked
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(BlockError::OOM)
    }

    /// Page alignment at most, word alignment at least
    fn align_for(size: usize) -> usize {
        std::cmp::max(size.next_power_of_two().min(4096), 8)
    }

    /// Calculate efficient allocation size that minimizes waste while maintaining
    /// reasonable granularity for the underlying allocator.
    ///
    /// Uses a tiered approach:
    /// - Up to 128KB: round to next 16KB boundary
    /// - Up to 1MB: round to next 64KB boundary
    /// - Above 1MB: round to next 256KB boundary
    pub fn efficient_size_for(required_size: usize) -> usize {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;

        let granule = if required_size <= 128 * KB {
            16 * KB
        } else if required_size <= MB {
            64 * KB
        } else {
            256 * KB
        };

        required_size.max(1).div_ceil(granule) * granule
    }

    /// Pointer to the writeable memory area
    pub fn space(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Get the actual allocated size of this large object block
    pub fn allocated_size(&self) -> usize {
        self.size
    }

    pub fn mark(&mut self) {
        self.marked = true;
    }

    pub fn unmark(&mut self) {
        self.marked = false;
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }
}

impl Drop for LargeObjectBlock {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated by `alloc_block` with exactly
        // this size and alignment, and is freed once
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.size, Self::align_for(self.size));
            dealloc(self.ptr.as_ptr(), layout);
        }
    }
}
