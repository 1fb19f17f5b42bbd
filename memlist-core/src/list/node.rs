//! ## memlist-core::list::node
//! **Node storage layout and per-node guards**
//!
//! A node occupies one `NODE_SIZE` arena block:
//!
//! ```text
//!   0        2                8                       16
//!   ┌────────┬────────────────┬────────────────────────┐
//!   │ value  │    padding     │ next (offset + 1, LE)  │
//!   └────────┴────────────────┴────────────────────────┘
//! ```
//!
//! A link of 0 means "no successor", so a freshly zero-filled block already
//! decodes as an unlinked node.
//!
//! Guards live outside the arena in a registry keyed by block location. A
//! guard is reference counted and carries the node's identity and a
//! `linked` flag: a thread that reaches a guard through a stale handle can
//! still lock it safely, and finds out after locking that the node is gone.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use crate::alloc::BlockPtr;

/// The integer carried by every node.
pub type Payload = u16;

/// Bytes requested from the allocator for each node.
pub const NODE_SIZE: usize = 16;

const LINK_OFFSET: usize = 8;

/// Decoded contents of a node block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub value: Payload,
    pub next: Option<BlockPtr>,
}

impl NodeRecord {
    pub fn decode(mut bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= NODE_SIZE);
        let value = bytes.get_u16_le();
        bytes.advance(LINK_OFFSET - 2);
        Self {
            value,
            next: decode_link(bytes.get_u64_le()),
        }
    }

    pub fn encode(&self, mut bytes: &mut [u8]) {
        debug_assert!(bytes.len() >= NODE_SIZE);
        bytes.put_u16_le(self.value);
        bytes.put_bytes(0, LINK_OFFSET - 2);
        bytes.put_u64_le(encode_link(self.next));
    }

    /// Rewrites only the successor link.
    pub fn encode_next(bytes: &mut [u8], next: Option<BlockPtr>) {
        let mut link = &mut bytes[LINK_OFFSET..];
        link.put_u64_le(encode_link(next));
    }
}

fn encode_link(next: Option<BlockPtr>) -> u64 {
    next.map_or(0, |ptr| ptr.offset() as u64 + 1)
}

fn decode_link(link: u64) -> Option<BlockPtr> {
    link.checked_sub(1).map(|offset| BlockPtr::new(offset as usize))
}

/// Handle to a node: its storage location plus the generation it was
/// created with. Storage can be reused after a delete; the generation tells
/// the two lives apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    ptr: BlockPtr,
    generation: u64,
}

impl NodeRef {
    pub fn ptr(&self) -> BlockPtr {
        self.ptr
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ptr, self.generation)
    }
}

/// State protected by a node's guard.
#[derive(Debug)]
pub(crate) struct NodeSlot {
    pub node: NodeRef,
    pub linked: bool,
}

pub(crate) type NodeLock = Arc<Mutex<NodeSlot>>;

/// An owned, held node guard. Owning the guard (rather than borrowing the
/// lock) is what lets a walk hold two of them across loop iterations.
pub(crate) type HeldNode = ArcMutexGuard<RawMutex, NodeSlot>;

/// Guards of all nodes currently registered with a list.
///
/// The registry lock is a leaf: it is only held to clone or swap an entry,
/// never while waiting on a node guard.
#[derive(Debug, Default)]
pub(crate) struct GuardRegistry {
    locks: RwLock<HashMap<BlockPtr, NodeLock>>,
    generations: AtomicU64,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the guard for a node stored at `ptr`.
    pub fn register(&self, ptr: BlockPtr) -> NodeRef {
        let node = NodeRef {
            ptr,
            generation: self.generations.fetch_add(1, Ordering::Relaxed),
        };
        let lock = Arc::new(Mutex::new(NodeSlot { node, linked: true }));
        self.locks.write().insert(ptr, lock);
        node
    }

    pub fn unregister(&self, ptr: BlockPtr) {
        self.locks.write().remove(&ptr);
    }

    pub fn lookup(&self, ptr: BlockPtr) -> Option<NodeLock> {
        self.locks.read().get(&ptr).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_block_decodes_as_unlinked() {
        let record = NodeRecord::decode(&[0u8; NODE_SIZE]);
        assert_eq!(
            record,
            NodeRecord {
                value: 0,
                next: None
            }
        );
    }

    #[test]
    fn test_record_layout() {
        let mut block = [0xFFu8; NODE_SIZE];
        NodeRecord {
            value: 0x1234,
            next: Some(BlockPtr::new(0)),
        }
        .encode(&mut block);

        assert_eq!(&block[..2], &[0x34, 0x12]);
        assert_eq!(&block[2..8], &[0; 6]);
        assert_eq!(&block[8..], &1u64.to_le_bytes());
    }

    #[test]
    fn test_encode_next_keeps_value() {
        let mut block = [0u8; NODE_SIZE];
        NodeRecord {
            value: 42,
            next: None,
        }
        .encode(&mut block);

        NodeRecord::encode_next(&mut block, Some(BlockPtr::new(48)));
        let record = NodeRecord::decode(&block);
        assert_eq!(record.value, 42);
        assert_eq!(record.next, Some(BlockPtr::new(48)));

        NodeRecord::encode_next(&mut block, None);
        assert_eq!(NodeRecord::decode(&block).next, None);
    }

    #[test]
    fn test_registry_generations_distinguish_reuse() {
        let registry = GuardRegistry::new();
        let first = registry.register(BlockPtr::new(16));
        registry.unregister(BlockPtr::new(16));
        let second = registry.register(BlockPtr::new(16));

        assert_eq!(first.ptr(), second.ptr());
        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);

        let lock = registry.lookup(BlockPtr::new(16)).unwrap();
        assert_eq!(lock.lock().node, second);
        assert!(registry.lookup(BlockPtr::new(32)).is_none());
    }

    #[test]
    fn test_held_guard_outlives_unregister() {
        let registry = GuardRegistry::new();
        let node = registry.register(BlockPtr::new(0));
        let lock = registry.lookup(node.ptr()).unwrap();

        let mut held = lock.lock_arc();
        registry.unregister(node.ptr());
        held.linked = false;
        drop(held);

        assert!(!lock.lock().linked);
    }
}
