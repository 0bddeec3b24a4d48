//! The managed heap implementation

use std::collections::LinkedList;
use std::fmt::{self, Debug, Display};
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use super::{
    block::BlockError,
    buffer::ManagedBuffer,
    bump::{self, BumpBlock, BLOCK_SIZE_BYTES, MAX_ALLOC_SIZE},
    collect::{self, CollectionReport, RootTable},
    lob::LargeObjectBlock,
};

const MIB: usize = 1_048_576;

/// Heap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSettings {
    /// Upper bound on heap footprint in MiB (blocks and large
    /// objects), unlimited if `None`
    pub heap_limit_mib: Option<usize>,
    /// Collect once this many MiB of fresh memory have been acquired
    /// since the last collection
    pub collection_interval_mib: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        HeapSettings {
            heap_limit_mib: None,
            collection_interval_mib: 8,
        }
    }
}

impl HeapSettings {
    pub fn with_limit(mut self, limit_mib: usize) -> Self {
        self.heap_limit_mib = Some(limit_mib);
        self
    }

    pub fn with_collection_interval(mut self, interval_mib: usize) -> Self {
        self.collection_interval_mib = interval_mib;
        self
    }

    pub fn limit_bytes(&self) -> Option<usize> {
        self.heap_limit_mib.map(|mib| mib.saturating_mul(MIB))
    }

    pub fn collection_interval_bytes(&self) -> usize {
        self.collection_interval_mib.saturating_mul(MIB)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of standard blocks allocated
    pub blocks_allocated: usize,
    /// Number of large objects allocated
    pub lobs_allocated: usize,
    /// Number of blocks used and not reclaimed
    pub used: usize,
    /// Number of blocks used and recycled
    pub recycled: usize,
    /// Regions registered with the collector (live or not yet swept)
    pub roots: usize,
    /// Registered regions that still have handles
    pub live_roots: usize,
    /// Bytes held from the system allocator
    pub footprint_bytes: usize,
}

/// GC performance metrics
#[derive(Debug, Clone)]
pub struct GcMetrics {
    pub collection_stats: CollectionStats,
    pub allocation_stats: AllocationStats,
    /// Heap creation timestamp
    pub heap_created_at: Instant,
}

/// Collection timing and frequency metrics
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Total number of collections performed
    pub total_collections: u64,
    /// Collections forced by an allocation that could not be met
    pub emergency_collections: u64,
    /// Total time spent in garbage collection
    pub total_gc_time: Duration,
    /// Last collection time
    pub last_collection_time: Option<Duration>,
    /// Last collection timestamp
    pub last_collection_at: Option<Instant>,
    /// Bytes returned to the system allocator
    pub bytes_released: u64,
}

/// Memory allocation rate and pattern tracking
#[derive(Debug, Clone, Default)]
pub struct AllocationStats {
    /// Total bytes allocated since heap creation
    pub total_bytes_allocated: u64,
    /// Total objects allocated
    pub total_objects_allocated: u64,
    /// Requests that ended in an error
    pub failed_allocations: u64,
    /// Allocation rate (bytes per second), calculated on demand
    pub allocation_rate_bps: f64,
    /// Size class distribution
    pub size_class_distribution: SizeClassStats,
}

/// Distribution of allocations by size class
#[derive(Debug, Clone, Default)]
pub struct SizeClassStats {
    /// Small object allocations (count, total bytes)
    pub small: (u64, u64),
    /// Medium object allocations (count, total bytes)
    pub medium: (u64, u64),
    /// Large object allocations (count, total bytes)
    pub large: (u64, u64),
}

impl Default for GcMetrics {
    fn default() -> Self {
        GcMetrics {
            collection_stats: CollectionStats::default(),
            allocation_stats: AllocationStats::default(),
            heap_created_at: Instant::now(),
        }
    }
}

/// Object size class.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeClass {
    /// Small objects fit inside a line
    Small,
    /// Medium objects span lines inside a block
    Medium,
    /// Large objects are larger than a normal block
    Large,
}

impl SizeClass {
    pub fn for_size(object_size: usize) -> SizeClass {
        if object_size < bump::LINE_SIZE_BYTES {
            SizeClass::Small
        } else if object_size < bump::BLOCK_SIZE_BYTES {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }
}

/// Heap of bump blocks and large objects
pub struct HeapState {
    /// For allocating small objects
    pub(crate) head: Option<BumpBlock>,
    /// For allocating medium objects
    pub(crate) overflow: Option<BumpBlock>,
    /// Recycled - part used but reclaimed
    pub(crate) recycled: LinkedList<BumpBlock>,
    /// Part used - not yet reclaimed
    pub(crate) rest: LinkedList<BumpBlock>,
    /// Large object blocks - each contains single object
    pub(crate) lobs: Vec<LargeObjectBlock>,
    /// Bytes held by large object blocks
    pub(crate) lob_bytes: usize,
    /// Every region handed out since it was last swept
    pub(crate) roots: RootTable,
    /// Fresh memory acquired since the last collection
    pub(crate) fresh_bytes: usize,
    metrics: GcMetrics,
}

impl Default for HeapState {
    fn default() -> Self {
        HeapState::new()
    }
}

impl Debug for HeapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.rest {
            writeln!(f, "(XX) {:?}", block)?;
        }

        for block in &self.recycled {
            writeln!(f, "(Cy) {:?}", block)?;
        }

        if let Some(head) = &self.head {
            writeln!(f, "(Hd) {:?}", head)?;
        }

        if let Some(of) = &self.overflow {
            writeln!(f, "(Ov) {:?}", of)?;
        }

        for lob in &self.lobs {
            writeln!(f, "{:?}", lob)?;
        }

        writeln!(f)
    }
}

impl HeapState {
    pub fn new() -> Self {
        HeapState {
            head: None,
            overflow: None,
            recycled: LinkedList::default(),
            rest: LinkedList::default(),
            lobs: vec![],
            lob_bytes: 0,
            roots: RootTable::default(),
            fresh_bytes: 0,
            metrics: GcMetrics::default(),
        }
    }

    fn block_count(&self) -> usize {
        self.rest.len()
            + self.recycled.len()
            + self.head.iter().count()
            + self.overflow.iter().count()
    }

    /// Bytes currently held from the system allocator
    pub fn footprint(&self) -> usize {
        self.block_count() * BLOCK_SIZE_BYTES + self.lob_bytes
    }

    fn within_limit(&self, additional: usize, limit: Option<usize>) -> bool {
        limit.map_or(true, |limit| self.footprint() + additional <= limit)
    }

    /// Acquire a brand new block, respecting the limit
    fn fresh_block(&mut self, limit: Option<usize>) -> Result<BumpBlock, BlockError> {
        if !self.within_limit(BLOCK_SIZE_BYTES, limit) {
            return Err(BlockError::OOM);
        }
        let block = BumpBlock::new()?;
        self.fresh_bytes += BLOCK_SIZE_BYTES;
        trace!(base = block.base_address(), "acquired block");
        Ok(block)
    }

    /// Bump allocate in the head block, replacing it from the
    /// recycled list (or a fresh block) as required
    fn bump_head(&mut self, size: usize, limit: Option<usize>) -> Result<NonNull<u8>, BlockError> {
        loop {
            if let Some(space) = self.head.as_mut().and_then(|head| head.bump(size)) {
                return Ok(space);
            }

            let replacement = match self.recycled.pop_front() {
                Some(block) => block,
                None => self.fresh_block(limit)?,
            };

            if let Some(old) = self.head.replace(replacement) {
                self.rest.push_back(old);
            }
        }
    }

    /// Bump allocate a medium object that won't fit in the head's
    /// current hole
    fn bump_overflow(
        &mut self,
        size: usize,
        limit: Option<usize>,
    ) -> Result<NonNull<u8>, BlockError> {
        if let Some(space) = self.overflow.as_mut().and_then(|of| of.bump(size)) {
            return Ok(space);
        }

        let replacement = self.fresh_block(limit)?;
        if let Some(old) = self.overflow.replace(replacement) {
            self.rest.push_back(old);
        }

        self.overflow
            .as_mut()
            .and_then(|of| of.bump(size))
            .ok_or(BlockError::OOM)
    }

    /// Create a large object block able to store data of the
    /// specified size and return its space
    fn large_object(&mut self, size: usize, limit: Option<usize>) -> Result<NonNull<u8>, BlockError> {
        if !self.within_limit(LargeObjectBlock::efficient_size_for(size), limit) {
            return Err(BlockError::OOM);
        }
        let lob = LargeObjectBlock::new(size)?;
        let space = lob.space();
        self.lob_bytes += lob.allocated_size();
        self.fresh_bytes += lob.allocated_size();
        self.lobs.push(lob);
        Ok(space)
    }

    /// Find space for `size` bytes without collecting
    fn try_allocate(&mut self, size: usize, limit: Option<usize>) -> Result<NonNull<u8>, BlockError> {
        let head_hole = self
            .head
            .as_ref()
            .map_or(0, BumpBlock::current_hole_size);

        match SizeClass::for_size(size) {
            SizeClass::Large => self.large_object(size, limit),
            SizeClass::Medium if size > head_hole => self
                .bump_overflow(size, limit)
                .or_else(|_| self.bump_head(size, limit)),
            _ => self.bump_head(size, limit),
        }
    }

    fn record_allocation(&mut self, size_bytes: usize, size_class: SizeClass) {
        let stats = &mut self.metrics.allocation_stats;
        stats.total_bytes_allocated += size_bytes as u64;
        stats.total_objects_allocated += 1;

        let bucket = match size_class {
            SizeClass::Small => &mut stats.size_class_distribution.small,
            SizeClass::Medium => &mut stats.size_class_distribution.medium,
            SizeClass::Large => &mut stats.size_class_distribution.large,
        };
        bucket.0 += 1;
        bucket.1 += size_bytes as u64;
    }

    fn record_collection(&mut self, report: &CollectionReport, emergency: bool) {
        let stats = &mut self.metrics.collection_stats;
        stats.total_collections += 1;
        if emergency {
            stats.emergency_collections += 1;
        }
        stats.total_gc_time += report.duration;
        stats.last_collection_time = Some(report.duration);
        stats.last_collection_at = Some(Instant::now());
        stats.bytes_released += report.bytes_released as u64;
    }

    /// Statistics
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            blocks_allocated: self.block_count(),
            lobs_allocated: self.lobs.len(),
            used: self.rest.len(),
            recycled: self.recycled.len(),
            roots: self.roots.len(),
            live_roots: self.roots.live_count(),
            footprint_bytes: self.footprint(),
        }
    }
}

/// Detailed heap context for error diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct HeapContext {
    /// Total blocks allocated
    pub blocks_allocated: usize,
    /// Blocks in use (not reclaimed)
    pub blocks_used: usize,
    /// Blocks recycled and available for reuse
    pub blocks_recycled: usize,
    /// Large object blocks allocated
    pub lobs_allocated: usize,
    /// Requested allocation size that failed
    pub requested_size: usize,
    /// Size class of the failed allocation
    pub size_class: SizeClass,
    /// Bytes held from the system allocator
    pub footprint_bytes: usize,
    /// Whether a collection ran before giving up
    pub collection_attempted: bool,
    /// Heap limit in bytes (if configured)
    pub heap_limit: Option<usize>,
}

impl HeapContext {
    /// Calculate memory utilisation percentage
    pub fn memory_utilisation_percent(&self) -> f64 {
        if self.blocks_allocated == 0 {
            0.0
        } else {
            (self.blocks_used as f64 / self.blocks_allocated as f64) * 100.0
        }
    }
}

impl Display for HeapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to allocate {} bytes ({:?}) | heap: {:.1}% used ({}/{} blocks), {} LOBs, {} bytes held",
            self.requested_size,
            self.size_class,
            self.memory_utilisation_percent(),
            self.blocks_used,
            self.blocks_allocated,
            self.lobs_allocated,
            self.footprint_bytes,
        )?;
        match self.heap_limit {
            Some(limit) => write!(f, " | limit: {} bytes", limit)?,
            None => write!(f, " | no limit")?,
        }
        if self.collection_attempted {
            write!(f, " | collection attempted")?;
        }
        Ok(())
    }
}

/// Heap-level errors for memory allocation
#[derive(Debug, Clone, Error)]
pub enum HeapError {
    /// No more memory can be obtained within the limit or from the
    /// system allocator
    #[error("out of memory: {context}")]
    OutOfMemory { context: HeapContext },
    /// Invalid allocation size requested
    #[error("invalid allocation size: requested {requested_size} bytes exceeds maximum {max_size} bytes")]
    InvalidAllocationSize {
        requested_size: usize,
        max_size: usize,
    },
}

/// A heap (with interior mutability)
///
/// All state lives behind a mutex so a heap may be shared freely
/// between threads.
pub struct Heap {
    state: Mutex<HeapState>,
    settings: HeapSettings,
}

impl Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => Debug::fmt(&*state, f),
            None => writeln!(f, "<heap locked>"),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap::with_settings(HeapSettings::default())
    }

    pub fn with_settings(settings: HeapSettings) -> Self {
        Heap {
            state: Mutex::new(HeapState::new()),
            settings,
        }
    }

    pub fn with_limit(limit_mib: usize) -> Self {
        Heap::with_settings(HeapSettings::default().with_limit(limit_mib))
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn stats(&self) -> HeapStats {
        self.state.lock().stats()
    }

    /// Snapshot of current GC metrics
    pub fn metrics(&self) -> GcMetrics {
        let mut metrics = self.state.lock().metrics.clone();

        let lifetime = metrics.heap_created_at.elapsed().as_secs_f64();
        if lifetime > 0.0 {
            metrics.allocation_stats.allocation_rate_bps =
                metrics.allocation_stats.total_bytes_allocated as f64 / lifetime;
        }

        metrics
    }

    /// Allocate a region of at least `size_bytes` bytes
    ///
    /// A zero byte request yields an empty buffer without touching
    /// the heap. The region is zeroed.
    pub fn allocate(&self, size_bytes: usize) -> Result<ManagedBuffer<'_>, HeapError> {
        if size_bytes == 0 {
            return Ok(ManagedBuffer::empty());
        }

        if size_bytes > MAX_ALLOC_SIZE {
            self.state.lock().metrics.allocation_stats.failed_allocations += 1;
            return Err(HeapError::InvalidAllocationSize {
                requested_size: size_bytes,
                max_size: MAX_ALLOC_SIZE,
            });
        }

        let alloc_size = Self::alloc_size_of(size_bytes);
        let size_class = SizeClass::for_size(alloc_size);
        let limit = self.settings.limit_bytes();

        let mut state = self.state.lock();

        let mut collected = false;
        if self.policy_requires_collection(&state) {
            self.collect_locked(&mut state, false);
            collected = true;
        }

        let space = match state.try_allocate(alloc_size, limit) {
            Ok(space) => space,
            Err(first) => {
                let retried = if collected {
                    Err(first)
                } else {
                    self.collect_locked(&mut state, true);
                    state.try_allocate(alloc_size, limit)
                };

                match retried {
                    Ok(space) => space,
                    Err(e) => {
                        state.metrics.allocation_stats.failed_allocations += 1;
                        return Err(self.block_error(&state, e, size_bytes));
                    }
                }
            }
        };

        // large objects arrive zeroed from the system allocator
        if size_class != SizeClass::Large {
            // SAFETY: space is valid for alloc_size bytes and not yet
            // reachable from any handle
            unsafe { std::ptr::write_bytes(space.as_ptr(), 0, alloc_size) };
        }

        let root = state.roots.register(space, alloc_size, size_class);
        state.record_allocation(alloc_size, size_class);

        Ok(ManagedBuffer::new(space, size_bytes, alloc_size, root))
    }

    /// Run a collection now
    pub fn collect(&self) -> CollectionReport {
        let mut state = self.state.lock();
        self.collect_locked(&mut state, false)
    }

    fn collect_locked(&self, state: &mut HeapState, emergency: bool) -> CollectionReport {
        let report = collect::collect(state);
        state.record_collection(&report, emergency);
        debug!(
            emergency,
            live = report.live_roots,
            dead = report.dead_roots,
            recycled = report.blocks_recycled,
            released = report.blocks_released,
            lobs_released = report.lobs_released,
            bytes_released = report.bytes_released,
            duration_us = report.duration.as_micros() as u64,
            "collection complete"
        );
        trace!("heap after collection:\n{:?}", state);
        report
    }

    pub fn policy_requires_collection(&self, state: &HeapState) -> bool {
        if state.fresh_bytes >= self.settings.collection_interval_bytes() {
            return true;
        }

        if let Some(limit) = self.settings.limit_bytes() {
            let blocks = state.block_count();
            state.footprint() + BLOCK_SIZE_BYTES > limit
                && blocks > 0
                && (state.recycled.len() as f32 / blocks as f32) < 0.25
        } else {
            false
        }
    }

    /// Return the allocated size of a region as its requested size
    /// rounded up to a word boundary
    pub fn alloc_size_of(object_size: usize) -> usize {
        let align = std::mem::size_of::<usize>();
        (object_size + (align - 1)) & !(align - 1)
    }

    /// Create heap context for error reporting
    fn heap_context(&self, state: &HeapState, requested_size: usize) -> HeapContext {
        let stats = state.stats();
        HeapContext {
            blocks_allocated: stats.blocks_allocated,
            blocks_used: stats.used,
            blocks_recycled: stats.recycled,
            lobs_allocated: stats.lobs_allocated,
            requested_size,
            size_class: SizeClass::for_size(Self::alloc_size_of(requested_size)),
            footprint_bytes: stats.footprint_bytes,
            collection_attempted: true,
            heap_limit: self.settings.limit_bytes(),
        }
    }

    fn block_error(&self, state: &HeapState, error: BlockError, requested_size: usize) -> HeapError {
        match error {
            BlockError::BadSize => HeapError::InvalidAllocationSize {
                requested_size,
                max_size: MAX_ALLOC_SIZE,
            },
            BlockError::OOM => HeapError::OutOfMemory {
                context: self.heap_context(state, requested_size),
            },
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    pub fn test_simple_allocations() {
        let heap = Heap::new();

        let mut buffer = heap.allocate(24).unwrap();
        assert_eq!(buffer.len(), 24);
        assert!(buffer.capacity() >= 24);
        assert!(buffer.iter().all(|b| *b == 0));

        buffer.copy_from_slice(&[7; 24]);
        assert_eq!(buffer.as_slice(), &[7; 24]);
        assert_eq!(buffer.as_ptr() as usize % size_of::<usize>(), 0);
    }

    #[test]
    pub fn test_zero_size_allocation() {
        let heap = Heap::new();
        let buffer = heap.allocate(0).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(heap.stats().roots, 0);
        assert_eq!(heap.stats().blocks_allocated, 0);
    }

    #[test]
    pub fn test_several_blocks() {
        let heap = Heap::new();

        let buffers = (0..4000u32)
            .map(|i| {
                let mut b = heap.allocate(16).unwrap();
                b[..4].copy_from_slice(&i.to_le_bytes());
                b
            })
            .collect::<Vec<_>>();

        assert!(heap.stats().blocks_allocated > 1);
        for (i, b) in buffers.iter().enumerate() {
            assert_eq!(&b[..4], &(i as u32).to_le_bytes());
        }
    }

    #[test]
    pub fn test_size_classes() {
        assert_eq!(SizeClass::for_size(8), SizeClass::Small);
        assert_eq!(SizeClass::for_size(128), SizeClass::Medium);
        assert_eq!(SizeClass::for_size(BLOCK_SIZE_BYTES - 8), SizeClass::Medium);
        assert_eq!(SizeClass::for_size(BLOCK_SIZE_BYTES), SizeClass::Large);
    }

    #[test]
    pub fn test_large_object_block() {
        let heap = Heap::new();
        let buffer = heap.allocate(BLOCK_SIZE_BYTES * 2).unwrap();
        assert_eq!(buffer.len(), BLOCK_SIZE_BYTES * 2);
        assert_eq!(heap.stats().lobs_allocated, 1);
        assert_eq!(heap.stats().blocks_allocated, 0);
    }

    #[test]
    pub fn test_medium_objects_use_overflow() {
        let heap = Heap::new();
        let _small = heap.allocate(100).unwrap();
        let _medium = heap.allocate(BLOCK_SIZE_BYTES - 64).unwrap();
        // head cannot take the second request so it lands in overflow
        assert_eq!(heap.stats().blocks_allocated, 2);
    }

    #[test]
    pub fn test_alloc_size_of_rounds_to_word() {
        let word = size_of::<usize>();
        assert_eq!(Heap::alloc_size_of(1), word);
        assert_eq!(Heap::alloc_size_of(word), word);
        assert_eq!(Heap::alloc_size_of(word + 1), 2 * word);
    }

    #[test]
    pub fn test_invalid_allocation_size() {
        let heap = Heap::new();
        let result = heap.allocate(MAX_ALLOC_SIZE + 1);
        assert!(matches!(
            result,
            Err(HeapError::InvalidAllocationSize { .. })
        ));
        assert_eq!(heap.metrics().allocation_stats.failed_allocations, 1);

        // heap is still usable
        assert!(heap.allocate(16).is_ok());
    }

    #[test]
    pub fn test_limit_refuses_oversize_request() {
        let heap = Heap::with_limit(1);
        let result = heap.allocate(2 * MIB);
        match result {
            Err(HeapError::OutOfMemory { context }) => {
                assert_eq!(context.requested_size, 2 * MIB);
                assert_eq!(context.heap_limit, Some(MIB));
                assert!(context.collection_attempted);
            }
            other => panic!("expected out of memory, got {:?}", other),
        }

        let small = heap.allocate(64).unwrap();
        assert_eq!(small.len(), 64);
    }

    #[test]
    pub fn test_limit_is_respected_by_live_data() {
        let heap = Heap::with_limit(1);
        let mut held = vec![];
        let error = loop {
            match heap.allocate(1024) {
                Ok(buffer) => held.push(buffer),
                Err(e) => break e,
            }
        };
        assert!(matches!(error, HeapError::OutOfMemory { .. }));
        assert!(heap.stats().footprint_bytes <= MIB);
        assert!(held.len() * 1024 > MIB / 2);

        // releasing handles lets the collector make room again
        held.clear();
        assert!(heap.allocate(1024).is_ok());
    }

    #[test]
    pub fn test_error_diagnostics() {
        let heap = Heap::with_limit(1);
        let message = heap.allocate(4 * MIB).unwrap_err().to_string();
        assert!(message.contains("out of memory"));
        assert!(message.contains(&format!("{} bytes", 4 * MIB)));
        assert!(message.contains("Large"));
        assert!(message.contains(&format!("limit: {} bytes", MIB)));

        let invalid = HeapError::InvalidAllocationSize {
            requested_size: MAX_ALLOC_SIZE + 1,
            max_size: MAX_ALLOC_SIZE,
        };
        assert!(invalid.to_string().contains("exceeds maximum"));
    }

    #[test]
    pub fn test_allocation_metrics() {
        let heap = Heap::new();
        let _a = heap.allocate(8).unwrap();
        let _b = heap.allocate(16).unwrap();
        let _c = heap.allocate(1024).unwrap();
        let _d = heap.allocate(BLOCK_SIZE_BYTES).unwrap();

        let metrics = heap.metrics();
        let stats = &metrics.allocation_stats;
        assert_eq!(stats.total_objects_allocated, 4);
        assert_eq!(stats.size_class_distribution.small, (2, 24));
        assert_eq!(stats.size_class_distribution.medium, (1, 1024));
        assert_eq!(stats.size_class_distribution.large.0, 1);
        assert_eq!(metrics.collection_stats.total_collections, 0);
    }

    #[test]
    pub fn test_interval_policy_triggers_collection() {
        let heap = Heap::with_settings(HeapSettings::default().with_collection_interval(1));
        for _ in 0..(2 * MIB / 1024) {
            drop(heap.allocate(1024).unwrap());
        }
        let metrics = heap.metrics();
        assert!(metrics.collection_stats.total_collections >= 1);
        assert_eq!(metrics.collection_stats.emergency_collections, 0);
        assert!(heap.stats().footprint_bytes <= 2 * MIB);
    }

    #[test]
    pub fn test_stats_count_live_roots() {
        let heap = Heap::new();
        let kept = heap.allocate(32).unwrap();
        drop(heap.allocate(32).unwrap());
        drop(heap.allocate(BLOCK_SIZE_BYTES).unwrap());

        let stats = heap.stats();
        assert_eq!(stats.roots, 3);
        assert_eq!(stats.live_roots, 1);

        heap.collect();
        let stats = heap.stats();
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.live_roots, 1);
        drop(kept);
    }

    #[test]
    pub fn test_large_allocations_are_zeroed() {
        let heap = Heap::new();
        let size = 4 * MIB;
        let mut first = heap.allocate(size).unwrap();
        first.fill(0xab);
        drop(first);
        heap.collect();

        let second = heap.allocate(size).unwrap();
        assert_eq!(second.len(), size);
        assert!(second.iter().all(|b| *b == 0));
    }

    #[test]
    pub fn test_heap_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<Heap>();
    }
}
