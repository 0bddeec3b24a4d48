//! The allocator facade
//!
//! Code that builds values in managed memory is written against
//! [`Allocator`] so it works equally with an explicit [`Heap`] or
//! the lazily initialised process heap.

use super::{buffer::ManagedBuffer, heap::Heap, heap::HeapError};

/// Source of managed memory whose regions live as long as `'heap`
pub trait Allocator<'heap> {
    /// Allocate a zeroed region of at least `size_bytes` bytes
    fn alloc_bytes(&'heap self, size_bytes: usize) -> Result<ManagedBuffer<'heap>, HeapError>;
}

impl<'heap> Allocator<'heap> for Heap {
    fn alloc_bytes(&'heap self, size_bytes: usize) -> Result<ManagedBuffer<'heap>, HeapError> {
        self.allocate(size_bytes)
    }
}
