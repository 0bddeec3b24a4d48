//! Blocks of memory acquired from the OS
//!
//! Heavily based on https://rust-hosted-langs.github.io/

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// A block of memory allocated by the OS / upstream allocator
///
/// Blocks are aligned to their own size so the block containing any
/// interior pointer can be found by masking.
#[derive(Debug, PartialEq)]
pub struct Block {
    /// Pointer to memory
    ptr: NonNull<u8>,
    /// Size of block
    size: usize,
}

// SAFETY: a Block exclusively owns its memory region and exposes it
// only through the heap, which serialises access behind its lock.
unsafe impl Send for Block {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    BadSize,
    OOM,
}

impl Block {
    pub fn new(size: usize) -> Result<Self, BlockError> {
        if !size.is_power_of_two() {
            Err(BlockError::BadSize)
        } else {
            Ok(Block {
                ptr: Self::alloc_block(size)?,
                size,
            })
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Offset of `ptr` from the start of the block, if it lies inside
    pub fn byte_offset_of<T>(&self, ptr: NonNull<T>) -> Option<usize> {
        let base = self.ptr.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        if addr >= base && addr < base + self.size {
            Some(addr - base)
        } else {
            None
        }
    }

    /// Overwrite a region of the block with a recognisable pattern
    pub fn fill(&mut self, offset: usize, len: usize) {
        debug_assert!(offset + len <= self.size);
        // SAFETY: the region lies within the block, which we own
        unsafe { std::ptr::write_bytes(self.ptr.as_ptr().add(offset), 0xff, len) }
    }

    fn alloc_block(size: usize) -> Result<NonNull<u8>, BlockError> {
        let layout = Layout::from_size_align(size, size).map_err(|_| BlockError::BadSize)?;
        // SAFETY: layout has non-zero size (a power of two) and the
        // result is null-checked
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(BlockError::OOM)
    }

    fn dealloc_block(ptr: NonNull<u8>, size: usize) {
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, size)) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        Self::dealloc_block(self.ptr, self.size);
    }
}
