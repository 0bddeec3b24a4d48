//! Allocation and memory management
pub mod alloc;
pub mod block;
pub mod buffer;
pub mod bump;
pub mod collect;
pub mod heap;
pub mod lob;
pub mod string;
