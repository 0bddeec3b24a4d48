//! Garbage collected memory for a small scripting language runtime
//!
//! Callers obtain [`ManagedBuffer`]s and [`ManagedString`]s from a
//! [`Heap`] (or the process heap in [`runtime`]) and never release
//! them: dropping the last handle leaves the region unreachable and a
//! later collection reclaims it.
//!
//! ```
//! use std::ffi::CString;
//!
//! let foo = CString::new("foo").unwrap();
//! let bar = CString::new("bar").unwrap();
//! let joined = managed_alloc::concatenate(Some(&foo), Some(&bar)).unwrap();
//! assert_eq!(joined.as_bytes_with_nul(), b"foobar\0");
//! ```

pub mod error;
pub mod memory;
pub mod runtime;

pub use error::Failure;
pub use memory::{
    alloc::Allocator,
    buffer::ManagedBuffer,
    collect::CollectionReport,
    heap::{GcMetrics, Heap, HeapError, HeapSettings, HeapStats},
    string::ManagedString,
};
pub use runtime::{
    allocate, collect, concatenate, configure, init, is_initialized, metrics, stats, string,
    ProcessHeap,
};
