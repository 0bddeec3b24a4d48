//! Racing first use of the process heap
//!
//! Runs as its own test binary so the process heap starts out
//! uninitialised. Keep to a single test.
use std::ffi::CString;
use std::sync::Barrier;
use std::thread;

use managed_alloc::{allocate, concatenate, init, is_initialized, Heap};

const THREADS: usize = 8;

#[test]
pub fn test_concurrent_first_use() {
    assert!(!is_initialized());

    let barrier = Barrier::new(THREADS);
    let results = thread::scope(|scope| {
        let handles = (0..THREADS)
            .map(|t| {
                let barrier = &barrier;
                scope.spawn(move || {
                    let prefix = CString::new(format!("worker-{t}-")).unwrap();
                    let suffix = CString::new("done").unwrap();
                    barrier.wait();

                    let mut buffer = allocate(16 + t).unwrap();
                    buffer.fill(t as u8);
                    let joined = concatenate(Some(&prefix), Some(&suffix)).unwrap();
                    let heap = init() as *const Heap as usize;
                    (t, buffer, joined, heap)
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(is_initialized());
    let heap = init() as *const Heap as usize;
    for (t, buffer, joined, seen) in &results {
        assert_eq!(*seen, heap);
        assert_eq!(buffer.len(), 16 + t);
        assert!(buffer.iter().all(|b| *b == *t as u8));
        assert_eq!(joined.to_string(), format!("worker-{t}-done"));
    }
    assert_eq!(init().stats().live_roots, 2 * THREADS);
}
