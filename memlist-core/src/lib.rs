//! # memlist-core
//!
//! A user-space sub-allocator over a single fixed-size arena, and a singly
//! linked list whose nodes live inside that arena.
//!
//! ### Key Submodules:
//! - `alloc`: Arena, block descriptor table and the first-fit `Allocator`
//!   (splitting, coalescing, in-place and relocating resize) behind one
//!   coarse lock.
//! - `list`: `ConcurrentList`, mutated with per-node lock coupling
//!   (hand-over-hand locking) so disjoint regions of the list progress in
//!   parallel.
//!
//! ### Lock order:
//! list head guard → node guards (in list order) → guard registry / allocator.
//! The last two are leaves and never held while waiting on a node guard.

pub mod alloc;
pub mod error;
pub mod list;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::list::*;
}

pub use alloc::{Allocator, BlockInfo, BlockPtr, BlockState};
pub use error::{AllocError, ListError};
pub use list::{ConcurrentList, NodeRef, Payload, NODE_SIZE};
