//! ## memlist-core::alloc::table
//! **Block descriptor table**
//!
//! Descriptors live in a slot vector and are doubly linked by slot index in
//! ascending offset order, so splitting and merging are O(1) splices. An
//! offset index maps each block location to its slot, which keeps `free`,
//! `resize` and byte access independent of the number of blocks; only the
//! first-fit scan walks the chain.
//!
//! Central invariant: walking the chain from the head yields blocks that
//! partition the arena exactly, with no gaps, no overlaps and no two
//! adjacent Free blocks once an operation completes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location of a block: its byte offset within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockPtr(usize);

impl BlockPtr {
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Absolute byte distance between two block locations.
    pub fn distance(self, other: BlockPtr) -> usize {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    Free,
    InUse,
}

/// Read-only view of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub ptr: BlockPtr,
    pub len: usize,
    pub state: BlockState,
}

impl BlockInfo {
    #[inline]
    pub fn end(&self) -> usize {
        self.ptr.offset() + self.len
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }
}

pub(crate) type SlotId = usize;

#[derive(Debug, Clone)]
struct Descriptor {
    offset: usize,
    len: usize,
    state: BlockState,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

impl Descriptor {
    #[inline]
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A broken table, as reported by [`BlockTable::check_invariants`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Block at {offset} is misplaced (expected offset {expected})")]
    Misplaced { offset: usize, expected: usize },

    #[error("Zero-length block at {0}")]
    ZeroLength(usize),

    #[error("Adjacent free blocks at {0} and {1}")]
    AdjacentFree(usize, usize),

    #[error("Blocks cover {covered} bytes of a {capacity}-byte arena")]
    Coverage { covered: usize, capacity: usize },

    #[error("Offset index out of sync at {0}")]
    Index(usize),

    #[error("Broken back link at {0}")]
    BackLink(usize),
}

#[derive(Debug)]
pub struct BlockTable {
    slots: Vec<Descriptor>,
    vacant: Vec<SlotId>,
    head: SlotId,
    by_offset: HashMap<usize, SlotId>,
}

impl BlockTable {
    /// A table holding one Free block spanning `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let mut by_offset = HashMap::new();
        by_offset.insert(0, 0);
        Self {
            slots: vec![Descriptor {
                offset: 0,
                len: capacity,
                state: BlockState::Free,
                prev: None,
                next: None,
            }],
            vacant: Vec::new(),
            head: 0,
            by_offset,
        }
    }

    /// Number of live descriptors.
    pub fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptors in ascending offset order.
    pub fn iter(&self) -> Blocks<'_> {
        Blocks {
            table: self,
            cursor: Some(self.head),
        }
    }

    pub(crate) fn info(&self, slot: SlotId) -> BlockInfo {
        let d = &self.slots[slot];
        BlockInfo {
            ptr: BlockPtr(d.offset),
            len: d.len,
            state: d.state,
        }
    }

    pub(crate) fn lookup(&self, ptr: BlockPtr) -> Option<SlotId> {
        self.by_offset.get(&ptr.offset()).copied()
    }

    pub(crate) fn lookup_in_use(&self, ptr: BlockPtr) -> Option<SlotId> {
        self.lookup(ptr)
            .filter(|slot| self.slots[*slot].state == BlockState::InUse)
    }

    pub(crate) fn set_state(&mut self, slot: SlotId, state: BlockState) {
        self.slots[slot].state = state;
    }

    /// First Free block of at least `size` bytes, in ascending offset order.
    pub(crate) fn first_fit(&self, size: usize) -> Option<SlotId> {
        let mut cursor = Some(self.head);
        while let Some(slot) = cursor {
            let d = &self.slots[slot];
            if d.state == BlockState::Free && d.len >= size {
                return Some(slot);
            }
            cursor = d.next;
        }
        None
    }

    /// Shrinks `slot` to `size` bytes and inserts a Free descriptor for the
    /// remainder right after it. Returns the new slot, or `None` when the
    /// block is not larger than `size`.
    pub(crate) fn split(&mut self, slot: SlotId, size: usize) -> Option<SlotId> {
        let d = &self.slots[slot];
        if d.len <= size {
            return None;
        }

        let tail = Descriptor {
            offset: d.offset + size,
            len: d.len - size,
            state: BlockState::Free,
            prev: Some(slot),
            next: d.next,
        };
        let tail_slot = self.store(tail);

        if let Some(after) = self.slots[slot].next {
            self.slots[after].prev = Some(tail_slot);
        }
        let d = &mut self.slots[slot];
        d.len = size;
        d.next = Some(tail_slot);

        Some(tail_slot)
    }

    /// Absorbs the following descriptor into `slot` if it is Free and
    /// physically adjacent.
    pub(crate) fn merge_next(&mut self, slot: SlotId) -> bool {
        let Some(next) = self.slots[slot].next else {
            return false;
        };
        let end = self.slots[slot].end();
        let absorbed = &self.slots[next];
        if absorbed.state != BlockState::Free || absorbed.offset != end {
            return false;
        }

        let (absorbed_offset, absorbed_len, after) = (absorbed.offset, absorbed.len, absorbed.next);
        let d = &mut self.slots[slot];
        d.len += absorbed_len;
        d.next = after;
        if let Some(after) = after {
            self.slots[after].prev = Some(slot);
        }

        self.by_offset.remove(&absorbed_offset);
        self.vacant.push(next);
        true
    }

    /// Merges the Free block at `slot` forward until the right neighbour is
    /// not mergeable, then backward once. Returns the surviving slot and the
    /// number of merges performed.
    pub(crate) fn coalesce(&mut self, slot: SlotId) -> (SlotId, usize) {
        let mut merges = 0;
        while self.merge_next(slot) {
            merges += 1;
        }

        let mut survivor = slot;
        if let Some(prev) = self.slots[slot].prev {
            if self.slots[prev].state == BlockState::Free && self.merge_next(prev) {
                merges += 1;
                survivor = prev;
            }
        }
        (survivor, merges)
    }

    /// Grows `slot` to at least `new_size` bytes by absorbing an adjacent
    /// Free successor. Leaves the table untouched when that is not possible.
    pub(crate) fn try_extend(&mut self, slot: SlotId, new_size: usize) -> bool {
        let d = &self.slots[slot];
        let Some(next) = d.next else {
            return false;
        };
        let n = &self.slots[next];
        if n.state != BlockState::Free || n.offset != d.end() || d.len + n.len < new_size {
            return false;
        }
        self.merge_next(slot)
    }

    /// Validates ordering, the partition of `capacity` bytes, the offset
    /// index and the absence of adjacent Free blocks.
    pub fn check_invariants(&self, capacity: usize) -> Result<(), InvariantViolation> {
        let mut expected = 0;
        let mut count = 0;
        let mut prev: Option<SlotId> = None;
        let mut cursor = Some(self.head);

        while let Some(slot) = cursor {
            let d = &self.slots[slot];
            if d.offset != expected {
                return Err(InvariantViolation::Misplaced {
                    offset: d.offset,
                    expected,
                });
            }
            if d.len == 0 {
                return Err(InvariantViolation::ZeroLength(d.offset));
            }
            if self.by_offset.get(&d.offset) != Some(&slot) {
                return Err(InvariantViolation::Index(d.offset));
            }
            if d.prev != prev {
                return Err(InvariantViolation::BackLink(d.offset));
            }
            if let Some(p) = prev.map(|p| &self.slots[p]) {
                if p.state == BlockState::Free && d.state == BlockState::Free {
                    return Err(InvariantViolation::AdjacentFree(p.offset, d.offset));
                }
            }

            expected = d.end();
            count += 1;
            prev = Some(slot);
            cursor = d.next;
        }

        if expected != capacity {
            return Err(InvariantViolation::Coverage {
                covered: expected,
                capacity,
            });
        }
        if count != self.by_offset.len() || count != self.len() {
            return Err(InvariantViolation::Index(expected));
        }
        Ok(())
    }

    fn store(&mut self, d: Descriptor) -> SlotId {
        let offset = d.offset;
        let slot = match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot] = d;
                slot
            }
            None => {
                self.slots.push(d);
                self.slots.len() - 1
            }
        };
        self.by_offset.insert(offset, slot);
        slot
    }
}

/// Iterator over descriptors in ascending offset order.
pub struct Blocks<'a> {
    table: &'a BlockTable,
    cursor: Option<SlotId>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let slot = self.cursor?;
        self.cursor = self.table.slots[slot].next;
        Some(self.table.info(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(table: &BlockTable) -> Vec<(usize, usize, BlockState)> {
        table
            .iter()
            .map(|b| (b.ptr.offset(), b.len, b.state))
            .collect()
    }

    #[test]
    fn test_new_table_spans_capacity() {
        let table = BlockTable::new(128);
        assert_eq!(states(&table), vec![(0, 128, BlockState::Free)]);
        assert_eq!(table.len(), 1);
        table.check_invariants(128).unwrap();
    }

    #[test]
    fn test_split_inserts_trailing_free() {
        let mut table = BlockTable::new(100);
        let head = table.first_fit(30).unwrap();
        let tail = table.split(head, 30).unwrap();
        table.set_state(head, BlockState::InUse);

        assert_eq!(table.info(tail).ptr, BlockPtr::new(30));
        assert_eq!(
            states(&table),
            vec![(0, 30, BlockState::InUse), (30, 70, BlockState::Free)]
        );
        assert_eq!(table.lookup(BlockPtr::new(30)), Some(tail));
        table.check_invariants(100).unwrap();
    }

    #[test]
    fn test_split_exact_fit_is_noop() {
        let mut table = BlockTable::new(64);
        assert!(table.split(0, 64).is_none());
        assert!(table.split(0, 80).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_coalesce_merges_both_sides() {
        let mut table = BlockTable::new(90);
        let a = table.split(0, 30).unwrap();
        let b = table.split(a, 30).unwrap();
        for slot in [0, a, b] {
            table.set_state(slot, BlockState::InUse);
        }

        table.set_state(0, BlockState::Free);
        table.set_state(b, BlockState::Free);
        table.set_state(a, BlockState::Free);
        let (survivor, merges) = table.coalesce(a);

        assert_eq!(survivor, 0);
        assert_eq!(merges, 2);
        assert_eq!(states(&table), vec![(0, 90, BlockState::Free)]);
        assert!(table.lookup(BlockPtr::new(30)).is_none());
        table.check_invariants(90).unwrap();
    }

    #[test]
    fn test_merge_next_refuses_in_use_neighbour() {
        let mut table = BlockTable::new(40);
        let tail = table.split(0, 20).unwrap();
        table.set_state(tail, BlockState::InUse);
        assert!(!table.merge_next(0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_try_extend_requires_enough_room() {
        let mut table = BlockTable::new(50);
        let tail = table.split(0, 20).unwrap();
        table.set_state(0, BlockState::InUse);

        assert!(!table.try_extend(0, 51));
        assert!(table.try_extend(0, 45));
        assert_eq!(states(&table), vec![(0, 50, BlockState::InUse)]);
        assert!(table.lookup(BlockPtr::new(20)).is_none());
        // the vacated slot is reused by the next split
        assert_eq!(table.split(0, 45), Some(tail));
        table.check_invariants(50).unwrap();
    }

    #[test]
    fn test_first_fit_picks_lowest_offset() {
        let mut table = BlockTable::new(100);
        let b = table.split(0, 10).unwrap();
        let c = table.split(b, 40).unwrap();
        let d = table.split(c, 10).unwrap();
        table.set_state(c, BlockState::InUse);
        table.set_state(d, BlockState::InUse);
        table.set_state(0, BlockState::InUse);
        // [0,10) in use, [10,50) free, [50,60) in use, [60,100) in use
        let d_tail = table.split(d, 10).unwrap();
        table.set_state(d_tail, BlockState::Free);

        assert_eq!(table.first_fit(20), Some(b));
        assert_eq!(table.first_fit(40), Some(b));
        assert_eq!(table.first_fit(41), None);
    }

    #[test]
    fn test_check_invariants_detects_adjacent_free() {
        let mut table = BlockTable::new(40);
        table.split(0, 20).unwrap();
        assert_eq!(
            table.check_invariants(40),
            Err(InvariantViolation::AdjacentFree(0, 20))
        );
    }

    #[test]
    fn test_check_invariants_detects_coverage() {
        let table = BlockTable::new(40);
        assert_eq!(
            table.check_invariants(64),
            Err(InvariantViolation::Coverage {
                covered: 40,
                capacity: 64
            })
        );
    }

    #[test]
    fn test_block_ptr_distance() {
        let a = BlockPtr::new(16);
        let b = BlockPtr::new(48);
        assert_eq!(a.distance(b), 32);
        assert_eq!(b.distance(a), 32);
        assert_eq!(a.to_string(), "0x10");
    }
}
