//! Heap error kinds (spec §4.5).

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    #[error("heap allocation of {requested} bytes failed: out of memory")]
    OutOfMemory { requested: usize },
    #[error("attempted to allocate while a collection is in progress")]
    CollectionInProgress,
}

pub type GcResult<T> = Result<T, GcError>;
