//! Errors reported to callers of the runtime

use thiserror::Error;

use crate::memory::heap::HeapError;

/// Why a runtime operation produced no result
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// A required input was absent
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Managed memory could not satisfy the request
    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[from] HeapError),
}
