//! ## memlist-core::alloc::arena
//! **The fixed-capacity byte buffer behind every block**
//!
//! The arena is reserved once with a fallible reservation so that host
//! exhaustion surfaces as `AllocError::ArenaUnavailable` instead of an abort
//! inside the global allocator.

use std::ops::Range;

use crate::error::AllocError;

/// A contiguous, zero-initialized byte buffer of fixed capacity.
pub struct Arena {
    bytes: Box<[u8]>,
}

impl Arena {
    /// Reserves `capacity` bytes from the host allocator.
    pub fn reserve(capacity: usize) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::ZeroCapacity);
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| AllocError::ArenaUnavailable { capacity })?;
        bytes.resize(capacity, 0);

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    #[inline]
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.bytes[range]
    }

    /// Zero-fills `range`.
    #[inline]
    pub fn zero(&mut self, range: Range<usize>) {
        self.bytes[range].fill(0);
    }

    /// Copies `src` to `dest`; the regions may overlap.
    #[inline]
    pub fn copy_within(&mut self, src: Range<usize>, dest: usize) {
        self.bytes.copy_within(src, dest);
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .finish()
    }
}
