//! ## memlist-core::alloc
//! **First-fit sub-allocator over a single fixed-size arena**
//!
//! ### Key Submodules:
//! - `arena/`: The contiguous byte buffer, reserved once and released once
//! - `table/`: Block descriptor table partitioning the arena into Free/InUse blocks
//! - `allocator/`: `alloc`/`free`/`resize` behind one coarse lock
//! - `stats/`: Allocation counters for telemetry
//!
//! Pointers handed out by the allocator are arena offsets (`BlockPtr`), so a
//! stale or foreign pointer can only miss the descriptor table, never reach
//! memory outside the arena.

pub mod allocator;
pub mod arena;
pub mod stats;
pub mod table;

pub use allocator::Allocator;
pub use arena::Arena;
pub use stats::{AllocStats, StatsSnapshot};
pub use table::{BlockInfo, BlockPtr, BlockState, BlockTable, InvariantViolation};
