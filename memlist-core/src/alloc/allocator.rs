//! ## memlist-core::alloc::allocator
//! **First-fit allocator with splitting, coalescing and resize**
//!
//! Every entry point takes the single allocator lock exactly once; the
//! relocating path of `resize` runs its fallback allocation, copy and free
//! under that same acquisition, so no other caller can observe the old and
//! new blocks half-way.

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::arena::Arena;
use super::stats::{AllocStats, StatsSnapshot};
use super::table::{BlockInfo, BlockPtr, BlockState, BlockTable, InvariantViolation, SlotId};
use crate::error::AllocError;

/// The arena together with the table describing it.
#[derive(Debug)]
struct Heap {
    arena: Arena,
    table: BlockTable,
}

impl Heap {
    fn alloc(&mut self, size: usize, stats: &AllocStats) -> Option<BlockPtr> {
        if size == 0 {
            return None;
        }

        let slot = self.table.first_fit(size)?;
        if self.table.split(slot, size).is_some() {
            stats.record_split();
        }
        self.table.set_state(slot, BlockState::InUse);

        let block = self.table.info(slot);
        self.arena.zero(block.ptr.offset()..block.end());
        stats.record_allocation();
        Some(block.ptr)
    }

    fn free(&mut self, ptr: BlockPtr, stats: &AllocStats) -> bool {
        let Some(slot) = self.table.lookup_in_use(ptr) else {
            return false;
        };

        self.table.set_state(slot, BlockState::Free);
        let (_, merges) = self.table.coalesce(slot);
        stats.record_free();
        stats.record_merges(merges);
        true
    }

    fn resize(&mut self, ptr: BlockPtr, new_size: usize, stats: &AllocStats) -> Option<BlockPtr> {
        if new_size == 0 {
            return None;
        }
        let slot = self.table.lookup_in_use(ptr)?;
        let len = self.table.info(slot).len;

        if new_size == len {
            return Some(ptr);
        }
        if new_size < len {
            self.trim(slot, new_size, stats);
            stats.record_resize_in_place();
            debug!(%ptr, len, new_size, "Block shrunk in place");
            return Some(ptr);
        }

        if self.table.try_extend(slot, new_size) {
            stats.record_merges(1);
            self.arena.zero(ptr.offset() + len..ptr.offset() + new_size);
            self.trim(slot, new_size, stats);
            stats.record_resize_in_place();
            debug!(%ptr, len, new_size, "Block grown in place");
            return Some(ptr);
        }

        let fresh = self.alloc(new_size, stats)?;
        self.arena
            .copy_within(ptr.offset()..ptr.offset() + len, fresh.offset());
        self.free(ptr, stats);
        stats.record_relocation();
        debug!(from = %ptr, to = %fresh, len, new_size, "Block relocated");
        Some(fresh)
    }

    /// Splits `slot` down to `size` bytes and folds the released tail into
    /// a Free successor, if any.
    fn trim(&mut self, slot: SlotId, size: usize, stats: &AllocStats) {
        if let Some(tail) = self.table.split(slot, size) {
            stats.record_split();
            let (_, merges) = self.table.coalesce(tail);
            stats.record_merges(merges);
        }
    }

    fn block_range(&self, ptr: BlockPtr) -> Result<std::ops::Range<usize>, AllocError> {
        let slot = self
            .table
            .lookup_in_use(ptr)
            .ok_or(AllocError::UnknownBlock(ptr))?;
        let block = self.table.info(slot);
        Ok(block.ptr.offset()..block.end())
    }
}

/// A sub-allocator managing one fixed-size arena.
///
/// All operations are serialized by one lock and none of them call back
/// into user code while holding it, except the closures passed to
/// [`Allocator::with_block`] and [`Allocator::with_block_mut`], which must
/// not call back into the allocator.
#[derive(Debug)]
pub struct Allocator {
    heap: Mutex<Option<Heap>>,
    capacity: usize,
    stats: AllocStats,
}

impl Allocator {
    /// Reserves an arena of `capacity` bytes described by a single Free
    /// block.
    ///
    /// An error here is fatal: the system has no storage to run on.
    pub fn init(capacity: usize) -> Result<Self, AllocError> {
        let arena = Arena::reserve(capacity).inspect_err(|err| {
            error!(capacity, error = %err, "Arena reservation failed");
        })?;
        info!(capacity, "Arena initialized");

        Ok(Self {
            heap: Mutex::new(Some(Heap {
                arena,
                table: BlockTable::new(capacity),
            })),
            capacity,
            stats: AllocStats::new(),
        })
    }

    /// Allocates a zero-filled block of exactly `size` bytes from the first
    /// Free block large enough. `None` when no such block exists, when
    /// `size` is zero, or after [`Allocator::deinit`].
    pub fn alloc(&self, size: usize) -> Option<BlockPtr> {
        let mut guard = self.heap.lock();
        let heap = guard.as_mut()?;

        let ptr = heap.alloc(size, &self.stats);
        if ptr.is_none() {
            self.stats.record_failed_allocation();
            debug!(size, "No free block large enough");
        }
        self.debug_check(heap);
        ptr
    }

    /// Releases the block at `ptr` and coalesces it with Free neighbours.
    /// Pointers that do not name an allocated block are ignored.
    pub fn free(&self, ptr: BlockPtr) {
        let mut guard = self.heap.lock();
        let Some(heap) = guard.as_mut() else {
            return;
        };

        if !heap.free(ptr, &self.stats) {
            self.stats.record_ignored_free();
            warn!(%ptr, "Ignoring free of unknown block");
        }
        self.debug_check(heap);
    }

    /// Changes the size of the block at `ptr`, preserving the first
    /// `min(old, new_size)` bytes.
    ///
    /// Shrinks and adjacent-Free grows keep the pointer; otherwise the block
    /// moves and the new pointer is returned. On `None` the original block
    /// is still allocated and unchanged.
    pub fn resize(&self, ptr: BlockPtr, new_size: usize) -> Option<BlockPtr> {
        let mut guard = self.heap.lock();
        let heap = guard.as_mut()?;

        if heap.table.lookup_in_use(ptr).is_none() {
            warn!(%ptr, "Ignoring resize of unknown block");
            return None;
        }
        let resized = heap.resize(ptr, new_size, &self.stats);
        if resized.is_none() {
            self.stats.record_failed_resize();
            debug!(%ptr, new_size, "Resize failed, block left in place");
        }
        self.debug_check(heap);
        resized
    }

    /// Releases the arena and discards every descriptor. Later calls see an
    /// allocator with no storage.
    ///
    /// Must not race with any other operation on this allocator.
    pub fn deinit(&self) {
        if self.heap.lock().take().is_some() {
            info!(capacity = self.capacity, "Arena released");
        }
    }

    /// Whether the arena is still held.
    pub fn is_live(&self) -> bool {
        self.heap.lock().is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every descriptor as `(location, length, state)` in ascending offset
    /// order; empty after [`Allocator::deinit`].
    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.heap
            .lock()
            .as_ref()
            .map(|heap| heap.table.iter().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.heap.lock().as_ref() {
            Some(heap) => heap.table.check_invariants(self.capacity),
            None => Ok(()),
        }
    }

    /// Runs `f` over the bytes of the allocated block at `ptr`.
    pub fn with_block<R>(
        &self,
        ptr: BlockPtr,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, AllocError> {
        let guard = self.heap.lock();
        let heap = guard.as_ref().ok_or(AllocError::Deinitialized)?;
        let range = heap.block_range(ptr)?;
        Ok(f(heap.arena.slice(range)))
    }

    /// Runs `f` over the mutable bytes of the allocated block at `ptr`.
    pub fn with_block_mut<R>(
        &self,
        ptr: BlockPtr,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, AllocError> {
        let mut guard = self.heap.lock();
        let heap = guard.as_mut().ok_or(AllocError::Deinitialized)?;
        let range = heap.block_range(ptr)?;
        Ok(f(heap.arena.slice_mut(range)))
    }

    /// Copies the contents of the block at `ptr`.
    pub fn read(&self, ptr: BlockPtr) -> Result<Vec<u8>, AllocError> {
        self.with_block(ptr, <[u8]>::to_vec)
    }

    /// Writes `bytes` into the block at `ptr`, starting `offset` bytes in.
    pub fn write(&self, ptr: BlockPtr, offset: usize, bytes: &[u8]) -> Result<(), AllocError> {
        self.with_block_mut(ptr, |block| -> Result<(), AllocError> {
            let block_len = block.len();
            let end = offset
                .checked_add(bytes.len())
                .filter(|end| *end <= block_len)
                .ok_or(AllocError::OutOfBounds {
                    ptr,
                    offset,
                    len: bytes.len(),
                    block_len,
                })?;
            block[offset..end].copy_from_slice(bytes);
            Ok(())
        })?
    }

    #[inline]
    fn debug_check(&self, heap: &Heap) {
        debug_assert_eq!(heap.table.check_invariants(self.capacity), Ok(()));
    }
}
