//! # rpool - A Fixed-Capacity Pool Allocator
//!
//! This crate provides a **best-fit free-list allocator** over a single arena
//! that is reserved once and never grows. On top of `malloc`/`free` style
//! primitives it checks what the platform allocator lets slide: double frees,
//! foreign pointers, leaks, and fragmentation.
//!
//! ## Overview
//!
//! ```text
//!   Pool Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                           ARENA (fixed)                              │
//!   │                                                                      │
//!   │   ┌───┬──────┬───┬──────────┬───┬────┬───┬────────────────────────┐  │
//!   │   │ H │ used │ H │   free   │ H │used│ H │         free           │  │
//!   │   └───┴──────┴───┴──────────┴───┴────┴───┴────────────────────────┘  │
//!   │   ▲                                                             ▲    │
//!   │   │                                                             │    │
//!   │ offset 0                                              capacity  │    │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Blocks tile the arena with no gaps: stepping by header + size from
//!   offset 0 lands exactly on the capacity.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align        - Alignment macros (align!, align_to!)
//!   ├── block        - Block header encoding and the physical walk (internal)
//!   ├── free_list    - Offset-linked free list, best-fit search (internal)
//!   ├── pool         - Pool: allocation, free, resize, bulk reset
//!   ├── coalesce     - Neighbour merging and defragmentation (internal)
//!   ├── diagnostics  - Leak check, statistics, memory map
//!   ├── sites        - Call-site provenance side table
//!   ├── config       - PoolConfig
//!   ├── error        - AllocError
//!   └── logging      - tracing subscriber setup
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::{Pool, PoolConfig};
//!
//! let pool = Pool::with_config(PoolConfig::with_capacity(64 * 1024)).unwrap();
//!
//! let handle = pool.allocate(128).unwrap();
//! pool.write(handle, 0, b"hello").unwrap();
//! assert_eq!(pool.read(handle, 0, 5).unwrap(), b"hello");
//!
//! pool.free(handle).unwrap();
//! assert!(pool.free(handle).is_err()); // double free, reported
//! assert!(pool.leak_check().is_clean());
//! ```
//!
//! The same operations exist as free functions backed by one process-wide
//! pool ([`global`]), for callers that want `malloc`-like ergonomics:
//!
//! ```rust
//! let handle = rpool::allocate(64).unwrap();
//! rpool::free(handle).unwrap();
//! ```
//!
//! ## How It Works
//!
//! Each block starts with a header encoded in the arena itself:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬──────────┬─────────────────────────────┐
//!   │    Block Header       │ padding  │         User Data           │
//!   │  ┌─────────────────┐  │ (aligned │                             │
//!   │  │ is_free         │  │  allocs  │                             │
//!   │  │ block_id        │  │  only)   │                             │
//!   │  │ size            │  │          │                             │
//!   │  │ next (free)     │  │          │                             │
//!   │  │ alignment       │  │          │                             │
//!   │  │ padding         │  │          │                             │
//!   │  └─────────────────┘  │          │                             │
//!   │     HEADER_SIZE       │◄──────────── size ────────────────────►│
//!   └───────────────────────┴──────────┴─────────────────────────────┘
//!                                      ▲
//!                                      └── Handle returned to user
//! ```
//!
//! - **Allocation** scans the whole free list for the smallest block that fits
//!   and splits off the excess when it is larger than a header plus
//!   [`MIN_SPLIT_REMAINDER`] bytes.
//! - **Free** validates the handle by walking the arena, rejects double frees,
//!   then merges with the next and the previous block, one hop each way.
//! - **Defragmentation** is one explicit left-to-right sweep. Runs of three or
//!   more free blocks may need repeated calls until it reports zero merges.
//!
//! ## Thread Safety
//!
//! A [`Pool`] is `Send + Sync`. One `parking_lot` mutex guards the whole pool
//! and every public method holds it for its entire run, so operations never
//! interleave. Methods never call each other while holding it.
//!
//! ## Limitations
//!
//! - **Fixed capacity**: the arena never grows; requests beyond it fail.
//! - **Linear scans**: best-fit, pointer validation and neighbour lookup walk
//!   the free list or the arena.
//! - **No shrinking**: resizing down keeps the block as it is.

pub mod align;
mod block;
mod coalesce;
pub mod config;
pub mod diagnostics;
pub mod error;
mod free_list;
mod handle;
pub mod logging;
mod pool;
mod sites;

use once_cell::sync::Lazy;
use tracing::warn;

pub use block::HEADER_SIZE;
pub use config::{DEFAULT_POOL_SIZE, PoolConfig};
pub use diagnostics::{BlockInfo, BlockState, LeakReport, MemoryMap, PoolStats};
pub use error::{AllocError, ErrorKind, Result};
pub use handle::Handle;
pub use pool::{MIN_SPLIT_REMAINDER, Pool};
pub use sites::Site;

static GLOBAL: Lazy<Pool> = Lazy::new(|| {
  Pool::with_config(PoolConfig::from_env()).unwrap_or_else(|err| {
    warn!(%err, "Invalid pool configuration in environment, using defaults");
    Pool::new()
  })
});

/// The process-wide pool behind the free functions of this crate.
///
/// Configured from `RPOOL_*` environment variables on first use.
pub fn global() -> &'static Pool {
  &GLOBAL
}

pub fn initialize_pool() {
  global().initialize()
}

#[track_caller]
pub fn allocate(size: usize) -> Result<Handle> {
  global().allocate_tracked(size)
}

#[track_caller]
pub fn free(handle: Handle) -> Result<()> {
  global().free_tracked(handle)
}

#[track_caller]
pub fn allocate_zeroed(
  count: usize,
  elem_size: usize,
) -> Result<Handle> {
  global().allocate_zeroed_tracked(count, elem_size)
}

pub fn resize(
  handle: Handle,
  new_size: usize,
) -> Result<Option<Handle>> {
  global().resize(handle, new_size)
}

#[track_caller]
pub fn allocate_aligned(
  size: usize,
  alignment: usize,
) -> Result<Handle> {
  global().allocate_aligned_tracked(size, alignment)
}

pub fn free_all() -> usize {
  global().free_all()
}

pub fn leak_check() -> LeakReport {
  global().leak_check()
}

pub fn stats() -> PoolStats {
  global().stats()
}

pub fn defragment() -> usize {
  global().defragment()
}

pub fn show_memory_map() -> MemoryMap {
  global().memory_map()
}
