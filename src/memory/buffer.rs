//! Handles to managed memory
//!
//! A [`ManagedBuffer`] is the caller's view of a region allocated in
//! a [`Heap`]. There is no release operation: each handle holds a
//! [`Root`] token and the heap keeps only a weak reference to it, so
//! once the last handle is gone the region is unreachable and the
//! next collection reclaims it.

use std::{
    fmt::Debug,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice::{from_raw_parts, from_raw_parts_mut},
    sync::Arc,
};

use super::heap::Heap;

/// Liveness token shared by every handle onto one region
#[derive(Debug, Default)]
pub struct Root;

/// A uniquely owned, writable region of managed memory
///
/// Capacity is at least the requested length. Contents are
/// unspecified until written.
pub struct ManagedBuffer<'heap> {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
    root: Option<Arc<Root>>,
    _heap: PhantomData<&'heap Heap>,
}

// SAFETY: the region is never moved or freed while `root` has a
// strong holder, and a ManagedBuffer is the only handle that can
// reach it (it is not Clone), so it behaves like a Box<[u8]>.
unsafe impl Send for ManagedBuffer<'_> {}
unsafe impl Sync for ManagedBuffer<'_> {}

impl<'heap> ManagedBuffer<'heap> {
    /// Wrap a freshly allocated region
    pub(crate) fn new(ptr: NonNull<u8>, len: usize, capacity: usize, root: Arc<Root>) -> Self {
        debug_assert!(capacity >= len);
        ManagedBuffer {
            ptr,
            len,
            capacity,
            root: Some(root),
            _heap: PhantomData,
        }
    }

    /// A valid zero length buffer which occupies no heap space
    pub fn empty() -> Self {
        ManagedBuffer {
            ptr: NonNull::dangling(),
            len: 0,
            capacity: 0,
            root: None,
            _heap: PhantomData,
        }
    }

    /// Requested length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes actually reserved (at least `len`)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes while root is held (or
        // dangling with len 0)
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self means no other reference
        // into the region exists
        unsafe { from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Give up write access, keeping the region alive
    pub(crate) fn into_parts(self) -> (NonNull<u8>, usize, Option<Arc<Root>>) {
        (self.ptr, self.len, self.root)
    }
}

impl Deref for ManagedBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for ManagedBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for ManagedBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Debug for ManagedBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ManagedBuffer({:p}, len: {}, capacity: {})",
            self.ptr, self.len, self.capacity
        )
    }
}
