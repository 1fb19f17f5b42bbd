//! ## memlist-core::list
//! **Singly linked list stored in the allocator's arena**
//!
//! ### Key Submodules:
//! - `node/`: On-arena node record layout, node handles and the per-node
//!   guard registry
//! - `concurrent/`: `ConcurrentList`, mutated under lock coupling

pub mod concurrent;
pub mod node;

pub use concurrent::ConcurrentList;
pub use node::{NodeRef, Payload, NODE_SIZE};
