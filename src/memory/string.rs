//! Immutable null-terminated strings in managed memory

use std::{
    borrow::Cow,
    ffi::{c_char, CStr},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ptr::NonNull,
    slice::from_raw_parts,
    sync::Arc,
};

use crate::error::Failure;

use super::{
    alloc::Allocator,
    buffer::{ManagedBuffer, Root},
    bump::MAX_ALLOC_SIZE,
    heap::{Heap, HeapError},
};

/// A zero-terminated byte string stored in managed memory
///
/// Clones share storage and each one keeps it reachable.
#[derive(Clone)]
pub struct ManagedString<'heap> {
    ptr: NonNull<u8>,
    /// Length excluding the terminator
    len: usize,
    /// Keeps the region reachable
    _root: Option<Arc<Root>>,
    _heap: PhantomData<&'heap Heap>,
}

// SAFETY: the bytes are never written after construction and stay in
// place while any clone holds the root.
unsafe impl Send for ManagedString<'_> {}
unsafe impl Sync for ManagedString<'_> {}

impl<'heap> ManagedString<'heap> {
    /// Freeze a buffer whose final byte is the only zero byte
    fn from_buffer(buffer: ManagedBuffer<'heap>) -> Self {
        debug_assert!(!buffer.is_empty());
        debug_assert_eq!(buffer.iter().position(|b| *b == 0), Some(buffer.len() - 1));
        let (ptr, len, root) = buffer.into_parts();
        ManagedString {
            ptr,
            len: len - 1,
            _root: root,
            _heap: PhantomData,
        }
    }

    /// Length in bytes, not counting the terminator
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.as_bytes_with_nul()[..self.len]
    }

    pub fn as_bytes_with_nul(&self) -> &[u8] {
        // SAFETY: ptr addresses len + 1 initialised bytes which stay
        // put while root is held
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len + 1) }
    }

    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: construction guarantees exactly one zero byte, in
        // final position
        unsafe { CStr::from_bytes_with_nul_unchecked(self.as_bytes_with_nul()) }
    }

    /// Pointer suitable for passing to C, valid while this handle lives
    pub fn as_ptr(&self) -> *const c_char {
        self.ptr.as_ptr() as *const c_char
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl AsRef<CStr> for ManagedString<'_> {
    fn as_ref(&self) -> &CStr {
        self.as_c_str()
    }
}

impl AsRef<[u8]> for ManagedString<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for ManagedString<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ManagedString<'_> {}

impl PartialEq<[u8]> for ManagedString<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<str> for ManagedString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for ManagedString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Hash for ManagedString<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl fmt::Debug for ManagedString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_c_str(), f)
    }
}

impl fmt::Display for ManagedString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// Copy `parts` end to end into a new terminated string
///
/// None of the parts may contain a zero byte.
fn build<'heap, A>(mem: &'heap A, parts: &[&[u8]]) -> Result<ManagedString<'heap>, Failure>
where
    A: Allocator<'heap> + ?Sized,
{
    let total = parts
        .iter()
        .try_fold(1usize, |acc, part| acc.checked_add(part.len()))
        .ok_or(HeapError::InvalidAllocationSize {
            requested_size: usize::MAX,
            max_size: MAX_ALLOC_SIZE,
        })?;

    let mut buffer = mem.alloc_bytes(total)?;

    let mut offset = 0;
    for part in parts {
        buffer[offset..offset + part.len()].copy_from_slice(part);
        offset += part.len();
    }
    buffer[offset] = 0;

    Ok(ManagedString::from_buffer(buffer))
}

/// Join two strings into a new managed string
///
/// Either input being absent is an error and nothing is allocated.
pub fn concatenate<'heap, A>(
    mem: &'heap A,
    a: Option<&CStr>,
    b: Option<&CStr>,
) -> Result<ManagedString<'heap>, Failure>
where
    A: Allocator<'heap> + ?Sized,
{
    match (a, b) {
        (Some(a), Some(b)) => build(mem, &[a.to_bytes(), b.to_bytes()]),
        (None, _) => Err(Failure::InvalidInput("first string is absent")),
        (_, None) => Err(Failure::InvalidInput("second string is absent")),
    }
}

/// Copy a literal into managed memory
///
/// Content stops at the first zero byte, if any, so an already
/// terminated literal is not terminated twice.
pub fn string<'heap, A>(mem: &'heap A, bytes: &[u8]) -> Result<ManagedString<'heap>, Failure>
where
    A: Allocator<'heap> + ?Sized,
{
    let content = match bytes.iter().position(|b| *b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    build(mem, &[content])
}
