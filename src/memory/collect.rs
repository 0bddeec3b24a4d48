//! Root tracking and the mark / sweep collection
//!
//! Every region handed out is recorded in a [`RootTable`] alongside a
//! weak reference to the [`Root`] token its handles share. A
//! collection marks the lines (or large object) of each region whose
//! token still has strong holders and reclaims everything else.

use std::collections::LinkedList;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::trace;

use super::{
    buffer::Root,
    bump::{BumpBlock, BLOCK_SIZE_BYTES},
    heap::{HeapState, SizeClass},
};

/// A region registered with the collector
#[derive(Debug)]
struct RootEntry {
    root: Weak<Root>,
    ptr: NonNull<u8>,
    size: usize,
    size_class: SizeClass,
}

impl RootEntry {
    /// Some handle still reaches the region
    fn is_live(&self) -> bool {
        self.root.strong_count() > 0
    }
}

/// Table of every region allocated and not yet found dead
#[derive(Debug, Default)]
pub struct RootTable {
    entries: Vec<RootEntry>,
}

// SAFETY: the raw pointers are only dereferenced by the heap that
// owns both the table and the memory, under its lock.
unsafe impl Send for RootTable {}

impl RootTable {
    /// Record a new region and return the token its handles share
    pub fn register(&mut self, ptr: NonNull<u8>, size: usize, size_class: SizeClass) -> Arc<Root> {
        let root = Arc::new(Root);
        self.entries.push(RootEntry {
            root: Arc::downgrade(&root),
            ptr,
            size,
            size_class,
        });
        root
    }

    /// Number of regions recorded
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of regions that still have handles
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }
}

/// Outcome of a single collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Regions found live
    pub live_roots: usize,
    /// Regions reclaimed
    pub dead_roots: usize,
    /// Blocks with free lines made available for allocation again
    pub blocks_recycled: usize,
    /// Blocks with no live lines returned to the system allocator
    pub blocks_released: usize,
    /// Large objects returned to the system allocator
    pub lobs_released: usize,
    /// Total bytes returned to the system allocator
    pub bytes_released: usize,
    /// Time spent collecting
    pub duration: Duration,
}

/// The collector's view of the heap for the duration of one cycle
pub struct CollectorHeapView<'guard> {
    state: &'guard mut HeapState,
    /// Every bump block, sorted by address
    blocks: Vec<BumpBlock>,
}

impl<'guard> CollectorHeapView<'guard> {
    /// Gather all blocks out of the allocation lists and clear marks
    pub fn new(state: &'guard mut HeapState) -> Self {
        let mut blocks = Vec::with_capacity(state.rest.len() + state.recycled.len() + 2);
        blocks.extend(state.head.take());
        blocks.extend(state.overflow.take());
        blocks.extend(std::mem::take(&mut state.recycled));
        blocks.extend(std::mem::take(&mut state.rest));

        for block in &mut blocks {
            block.reset_region_marks();
        }
        blocks.sort();

        for lob in &mut state.lobs {
            lob.unmark();
        }

        CollectorHeapView { state, blocks }
    }

    /// Mark the storage of one live region
    fn mark_region(&mut self, ptr: NonNull<u8>, size: usize, size_class: SizeClass) {
        match size_class {
            SizeClass::Large => {
                if let Some(lob) = self.state.lobs.iter_mut().find(|lob| lob.space() == ptr) {
                    lob.mark();
                }
            }
            _ => {
                let base = ptr.as_ptr() as usize & !(BLOCK_SIZE_BYTES - 1);
                if let Ok(index) = self
                    .blocks
                    .binary_search_by_key(&base, BumpBlock::base_address)
                {
                    let found = self.blocks[index].mark_region(ptr, size);
                    debug_assert!(found);
                }
            }
        }
    }

    /// Mark every live region and forget the dead ones
    ///
    /// Returns (live, dead) counts
    pub fn mark_roots(&mut self) -> (usize, usize) {
        let entries = std::mem::take(&mut self.state.roots.entries);
        let (live, dead): (Vec<_>, Vec<_>) = entries.into_iter().partition(RootEntry::is_live);

        for entry in &live {
            self.mark_region(entry.ptr, entry.size, entry.size_class);
        }

        let counts = (live.len(), dead.len());
        self.state.roots.entries = live;
        counts
    }

    /// Release unmarked storage and redistribute surviving blocks
    pub fn sweep(&mut self, report: &mut CollectionReport) {
        let lobs_before = self.state.lobs.len();
        let bytes_before = self.state.lob_bytes;
        self.state.lobs.retain(|lob| lob.is_marked());
        self.state.lob_bytes = self.state.lobs.iter().map(|lob| lob.allocated_size()).sum();
        report.lobs_released = lobs_before - self.state.lobs.len();
        report.bytes_released += bytes_before - self.state.lob_bytes;

        let mut recycled = LinkedList::default();
        let mut rest = LinkedList::default();
        for mut block in std::mem::take(&mut self.blocks) {
            if block.is_unmarked() {
                trace!(base = block.base_address(), "releasing block");
                report.blocks_released += 1;
                report.bytes_released += BLOCK_SIZE_BYTES;
            } else if block.recycle() {
                let (holes, free, marked) = block.stats();
                trace!(base = block.base_address(), holes, free, marked, "recycling block");
                recycled.push_back(block);
            } else {
                rest.push_back(block);
            }
        }
        report.blocks_recycled = recycled.len();

        self.state.recycled = recycled;
        self.state.rest = rest;
        self.state.fresh_bytes = 0;
    }
}

/// Run a full collection over the heap state
pub fn collect(state: &mut HeapState) -> CollectionReport {
    let start = Instant::now();
    let mut report = CollectionReport::default();

    let mut view = CollectorHeapView::new(state);
    let (live, dead) = view.mark_roots();
    report.live_roots = live;
    report.dead_roots = dead;
    view.sweep(&mut report);

    report.duration = start.elapsed();
    report
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::memory::{bump::LINE_SIZE_BYTES, heap::Heap};

    #[test]
    pub fn test_empty_heap_collection() {
        let heap = Heap::new();
        let report = heap.collect();
        assert_eq!(report.live_roots, 0);
        assert_eq!(report.dead_roots, 0);
        assert_eq!(report.bytes_released, 0);
    }

    #[test]
    pub fn test_live_buffers_survive_collection() {
        let heap = Heap::new();
        let mut kept = vec![];
        for i in 0..200u8 {
            let mut buffer = heap.allocate(40).unwrap();
            buffer.fill(i);
            if i % 2 == 0 {
                kept.push((i, buffer));
            }
        }

        let report = heap.collect();
        assert_eq!(report.live_roots, 100);
        assert_eq!(report.dead_roots, 100);

        // reuse the reclaimed space and check nothing live is touched
        let mut fresh = vec![];
        for _ in 0..200 {
            let mut buffer = heap.allocate(40).unwrap();
            buffer.fill(0xee);
            fresh.push(buffer);
        }

        for (i, buffer) in &kept {
            assert!(buffer.iter().all(|b| b == i));
        }
    }

    #[test]
    pub fn test_dead_block_released() {
        let heap = Heap::new();
        for _ in 0..(BLOCK_SIZE_BYTES / LINE_SIZE_BYTES) {
            drop(heap.allocate(LINE_SIZE_BYTES).unwrap());
        }
        assert!(heap.stats().blocks_allocated >= 1);

        let report = heap.collect();
        assert!(report.blocks_released >= 1);
        assert_eq!(heap.stats().blocks_allocated, 0);
        assert_eq!(heap.stats().roots, 0);
        assert_eq!(heap.stats().footprint_bytes, 0);
    }

    #[test]
    pub fn test_partly_live_block_recycled() {
        let heap = Heap::new();
        let keep = heap.allocate(16).unwrap();
        for _ in 0..50 {
            drop(heap.allocate(64).unwrap());
        }

        let report = heap.collect();
        assert_eq!(report.live_roots, 1);
        assert_eq!(report.blocks_recycled, 1);
        assert_eq!(report.blocks_released, 0);
        assert_eq!(heap.stats().recycled, 1);
        drop(keep);
    }

    #[test]
    pub fn test_dead_large_object_released() {
        let heap = Heap::new();
        let keep = heap.allocate(BLOCK_SIZE_BYTES * 3).unwrap();
        drop(heap.allocate(BLOCK_SIZE_BYTES * 2).unwrap());
        assert_eq!(heap.stats().lobs_allocated, 2);

        let report = heap.collect();
        assert_eq!(report.lobs_released, 1);
        assert_eq!(heap.stats().lobs_allocated, 1);
        assert_eq!(keep.len(), BLOCK_SIZE_BYTES * 3);

        drop(keep);
        heap.collect();
        assert_eq!(heap.stats().lobs_allocated, 0);
    }

    #[test]
    pub fn test_collection_metrics() {
        let heap = Heap::new();
        drop(heap.allocate(64).unwrap());
        heap.collect();
        heap.collect();

        let metrics = heap.metrics();
        assert_eq!(metrics.collection_stats.total_collections, 2);
        assert!(metrics.collection_stats.last_collection_at.is_some());
        assert_eq!(
            metrics.collection_stats.bytes_released,
            BLOCK_SIZE_BYTES as u64
        );
    }

    #[test]
    pub fn test_root_table_counts() {
        let mut table = RootTable::default();
        let ptr = NonNull::<u8>::dangling();
        let a = table.register(ptr, 8, SizeClass::Small);
        let b = table.register(ptr, 8, SizeClass::Small);
        let a2 = a.clone();
        assert_eq!(table.len(), 2);
        assert_eq!(table.live_count(), 2);

        drop(a);
        assert_eq!(table.live_count(), 2);
        drop(a2);
        assert_eq!(table.live_count(), 1);
        drop(b);
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.len(), 2);
    }
}
