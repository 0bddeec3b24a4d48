//! The process-wide heap
//!
//! The first operation that needs memory initialises a single heap
//! for the process. Initialisation happens exactly once however many
//! threads race to it, and every handle the process heap returns is
//! `'static`.

use std::ffi::CStr;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::Failure;
use crate::memory::{
    alloc::Allocator,
    buffer::ManagedBuffer,
    collect::CollectionReport,
    heap::{GcMetrics, Heap, HeapError, HeapSettings, HeapStats},
    string::{self, ManagedString},
};

static HEAP: OnceCell<Heap> = OnceCell::new();

fn initialise(settings: HeapSettings) -> Heap {
    debug!(
        heap_limit_mib = ?settings.heap_limit_mib,
        collection_interval_mib = settings.collection_interval_mib,
        "initialising process heap"
    );
    Heap::with_settings(settings)
}

/// Initialise the process heap with `settings`
///
/// If the heap already exists the settings are handed back unused.
pub fn configure(settings: HeapSettings) -> Result<(), HeapSettings> {
    let mut pending = Some(settings);
    HEAP.get_or_init(|| initialise(pending.take().unwrap_or_default()));
    match pending {
        None => Ok(()),
        Some(unused) => Err(unused),
    }
}

/// The process heap, initialised with default settings if necessary
pub fn init() -> &'static Heap {
    HEAP.get_or_init(|| initialise(HeapSettings::default()))
}

pub fn is_initialized() -> bool {
    HEAP.get().is_some()
}

/// Handle on the process heap that defers initialisation until the
/// first allocation request
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHeap;

impl Allocator<'static> for ProcessHeap {
    fn alloc_bytes(&'static self, size_bytes: usize) -> Result<ManagedBuffer<'static>, HeapError> {
        init().allocate(size_bytes)
    }
}

/// Allocate `size` bytes of managed memory
pub fn allocate(size: usize) -> Result<ManagedBuffer<'static>, Failure> {
    Ok(init().allocate(size)?)
}

/// Join two strings in managed memory
pub fn concatenate(
    a: Option<&CStr>,
    b: Option<&CStr>,
) -> Result<ManagedString<'static>, Failure> {
    string::concatenate(&ProcessHeap, a, b)
}

/// Copy a literal into managed memory
pub fn string(bytes: &[u8]) -> Result<ManagedString<'static>, Failure> {
    string::string(&ProcessHeap, bytes)
}

/// Collect the process heap now
pub fn collect() -> CollectionReport {
    init().collect()
}

pub fn stats() -> HeapStats {
    init().stats()
}

pub fn metrics() -> GcMetrics {
    init().metrics()
}
