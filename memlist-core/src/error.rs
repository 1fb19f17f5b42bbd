use thiserror::Error;

use crate::alloc::BlockPtr;
use crate::list::NodeRef;

/// Allocator failures that are not ordinary allocation misses.
///
/// A miss (no Free block large enough) is `None` from `alloc`/`resize`,
/// never one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Unable to reserve an arena of {capacity} bytes")]
    ArenaUnavailable { capacity: usize },

    #[error("Arena capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Allocator has been deinitialized")]
    Deinitialized,

    #[error("No allocated block at {0}")]
    UnknownBlock(BlockPtr),

    #[error("Access of {len} bytes at offset {offset} exceeds block {ptr} of {block_len} bytes")]
    OutOfBounds {
        ptr: BlockPtr,
        offset: usize,
        len: usize,
        block_len: usize,
    },
}

impl AllocError {
    /// Whether the system cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AllocError::ArenaUnavailable { .. } | AllocError::ZeroCapacity
        )
    }
}

/// Precondition violations and storage failures reported by list operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("Node reference is empty")]
    MissingNode,

    #[error("Node {0} is no longer linked into the list")]
    StaleNode(NodeRef),

    #[error("Node {0} is not reachable from the head")]
    TargetNotFound(NodeRef),

    #[error("Allocator has no free block of {requested} bytes for a node")]
    OutOfMemory { requested: usize },

    #[error("List has been cleaned up")]
    Closed,

    #[error("Node storage error: {0}")]
    Storage(#[from] AllocError),
}
