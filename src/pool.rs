use std::ops::Range;
use std::panic::Location;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
  align_to,
  block::{Block, Blocks, HEADER_SIZE},
  config::PoolConfig,
  diagnostics::{LeakReport, MemoryMap, PoolStats},
  error::{AllocError, Result},
  free_list::FreeList,
  handle::Handle,
  sites::{Site, SiteTable},
};

/// A free block is split only when the leftover payload would exceed this
/// many bytes once the new header is paid for.
pub const MIN_SPLIT_REMAINDER: usize = 32;

/// Arena, free list and counters. Every method assumes the caller holds the
/// pool lock, and none of them take it.
pub(crate) struct PoolState {
  pub(crate) arena: Box<[u8]>,
  pub(crate) free_list: FreeList,
  pub(crate) sites: SiteTable,
  pub(crate) map_limit: usize,
  next_block_id: u32,
  initialized: bool,
}

impl PoolState {
  pub(crate) fn new(config: &PoolConfig) -> Self {
    Self {
      arena: vec![0u8; config.capacity].into_boxed_slice(),
      free_list: FreeList::new(),
      sites: SiteTable::new(config.track_sites),
      map_limit: config.map_limit,
      next_block_id: 0,
      initialized: false,
    }
  }

  #[inline]
  pub(crate) fn capacity(&self) -> usize {
    self.arena.len()
  }

  #[inline]
  pub(crate) fn base(&self) -> usize {
    self.arena.as_ptr() as usize
  }

  /// Largest request that could ever succeed.
  #[inline]
  fn max_request(&self) -> usize {
    self.capacity() - HEADER_SIZE
  }

  pub(crate) fn blocks(&self) -> Blocks<'_> {
    Blocks::new(&self.arena)
  }

  pub(crate) fn ensure_initialized(&mut self) {
    if self.initialized {
      return;
    }

    self.reset();
    self.initialized = true;

    info!(
      event = "pool_init",
      capacity = self.capacity(),
      header_size = HEADER_SIZE,
      "Memory pool initialized"
    );
  }

  /// Turns the whole arena into block #0, free, and restarts id numbering.
  fn reset(&mut self) {
    let first = Block::new(self.max_request(), true, None, 0);
    first.write(&mut self.arena, 0);

    self.free_list.clear();
    self.free_list.push(&mut self.arena, 0);
    self.next_block_id = 1;
    self.sites.clear();
  }

  pub(crate) fn next_id(&mut self) -> u32 {
    let id = self.next_block_id;
    self.next_block_id = self.next_block_id.wrapping_add(1);
    id
  }

  #[inline]
  pub(crate) fn handle_at(
    &self,
    offset: usize,
    padding: usize,
  ) -> Handle {
    Handle::from_addr(self.base() + offset + HEADER_SIZE + padding)
  }

  /// Resolves a handle to the offset of the block it was handed out for.
  ///
  /// Only exact payload starts are accepted; an address anywhere else inside
  /// the arena is rejected. The block may be free.
  pub(crate) fn lookup(
    &self,
    handle: Handle,
  ) -> Result<usize> {
    let addr = handle.addr();

    let reason = if handle.is_null() {
      "null pointer"
    } else if addr < self.base() || addr >= self.base() + self.capacity() {
      "outside the pool"
    } else {
      let target = addr - self.base();

      match self
        .blocks()
        .find(|(offset, block)| offset + HEADER_SIZE + block.padding == target)
      {
        Some((offset, _)) => return Ok(offset),
        None => "not the start of a block",
      }
    };

    warn!(event = "invalid_pointer", addr = %handle, reason, "Rejected pointer");

    Err(AllocError::InvalidPointer { addr, reason })
  }

  /// Like [`lookup`](Self::lookup), but the block must be in use.
  fn lookup_allocated(
    &self,
    handle: Handle,
  ) -> Result<(usize, Block)> {
    let offset = self.lookup(handle)?;
    let block = Block::read(&self.arena, offset);

    if block.is_free {
      warn!(
        event = "use_after_free",
        addr = %handle,
        block_id = block.block_id,
        "Block is not allocated"
      );
      return Err(AllocError::InvalidPointer {
        addr: handle.addr(),
        reason: "block is not allocated",
      });
    }

    Ok((offset, block))
  }

  fn check_request(
    &self,
    size: usize,
  ) -> Result<()> {
    let err = if size == 0 {
      AllocError::invalid_request("cannot allocate 0 bytes")
    } else if size > self.max_request() {
      AllocError::invalid_request(format!(
        "requested {size} bytes exceeds pool capacity of {} bytes",
        self.max_request()
      ))
    } else {
      return Ok(());
    };

    warn!(event = "invalid_request", size, %err, "Rejected allocation");

    Err(err)
  }

  fn best_fit(
    &self,
    size: usize,
  ) -> Result<usize> {
    match self.free_list.best_fit(&self.arena, size) {
      Some(offset) => Ok(offset),
      None => {
        let largest_free = self.free_list.largest(&self.arena);

        warn!(event = "out_of_memory", size, largest_free, "No free block available");

        Err(AllocError::OutOfMemory {
          requested: size,
          largest_free,
        })
      }
    }
  }

  /// Hands the free block at `offset` out with `size` payload bytes, splitting
  /// off the excess as a new free block when it is worth a header.
  fn take_block(
    &mut self,
    offset: usize,
    size: usize,
    alignment: usize,
    padding: usize,
  ) -> Block {
    self.free_list.remove(&mut self.arena, offset);

    let mut block = Block::read(&self.arena, offset);
    block.is_free = false;
    block.next = None;
    block.alignment = alignment;
    block.padding = padding;

    if block.size > size + HEADER_SIZE + MIN_SPLIT_REMAINDER {
      let rest_offset = offset + HEADER_SIZE + size;
      let rest = Block::new(block.size - size - HEADER_SIZE, true, None, self.next_id());

      block.size = size;
      block.write(&mut self.arena, offset);
      rest.write(&mut self.arena, rest_offset);
      self.free_list.push(&mut self.arena, rest_offset);

      trace!(
        event = "split",
        block_id = block.block_id,
        rest_id = rest.block_id,
        rest_size = rest.size,
        "Split block"
      );
    } else {
      block.write(&mut self.arena, offset);
    }

    block
  }

  pub(crate) fn allocate(
    &mut self,
    size: usize,
    site: Option<Site>,
  ) -> Result<Handle> {
    self.ensure_initialized();
    self.check_request(size)?;

    let offset = self.best_fit(size)?;
    let block = self.take_block(offset, size, 0, 0);
    let handle = self.handle_at(offset, 0);

    self.sites.record_alloc(block.block_id, site);

    debug!(
      event = "allocate",
      block_id = block.block_id,
      addr = %handle,
      size = block.size,
      "Allocated"
    );

    Ok(handle)
  }

  pub(crate) fn allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
    site: Option<Site>,
  ) -> Result<Handle> {
    let Some(size) = count.checked_mul(elem_size) else {
      warn!(event = "overflow", count, elem_size, "Zeroed allocation size overflows");
      return Err(AllocError::OverflowDetected { count, elem_size });
    };

    let handle = self.allocate(size, site)?;
    let range = self.payload(handle)?;
    self.arena[range].fill(0);

    Ok(handle)
  }

  pub(crate) fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
    site: Option<Site>,
  ) -> Result<Handle> {
    self.ensure_initialized();

    if !alignment.is_power_of_two() {
      warn!(event = "invalid_request", alignment, "Alignment is not a power of two");
      return Err(AllocError::invalid_request(format!(
        "alignment {alignment} is not a power of two"
      )));
    }

    self.check_request(size)?;

    // Enough room for the payload wherever the first aligned address lands.
    let reserve = size
      .checked_add(alignment - 1)
      .filter(|reserve| *reserve <= self.max_request())
      .ok_or_else(|| {
        AllocError::invalid_request(format!(
          "{size} bytes aligned to {alignment} exceeds pool capacity of {} bytes",
          self.max_request()
        ))
      })?;

    let offset = self.best_fit(reserve)?;
    let payload = self.base() + offset + HEADER_SIZE;
    let padding = align_to!(payload, alignment) - payload;

    let block = self.take_block(offset, size + padding, alignment, padding);
    let handle = self.handle_at(offset, padding);

    self.sites.record_alloc(block.block_id, site);

    debug!(
      event = "allocate_aligned",
      block_id = block.block_id,
      addr = %handle,
      size,
      alignment,
      padding,
      "Allocated aligned"
    );

    Ok(handle)
  }

  /// Frees the block behind `handle` and merges it with its neighbours, one
  /// hop forward then one hop backward.
  pub(crate) fn release(
    &mut self,
    handle: Handle,
    site: Option<Site>,
  ) -> Result<()> {
    self.ensure_initialized();

    let offset = self.lookup(handle)?;
    let mut block = Block::read(&self.arena, offset);

    if block.is_free {
      let freed_at = self.sites.freed_at(block.block_id);

      warn!(
        event = "double_free",
        block_id = block.block_id,
        addr = %handle,
        freed_at = ?freed_at,
        "Double free detected"
      );

      return Err(AllocError::DoubleFree {
        addr: handle.addr(),
        block_id: block.block_id,
        freed_at,
      });
    }

    block.is_free = true;
    block.write(&mut self.arena, offset);
    self.free_list.push(&mut self.arena, offset);
    self.sites.record_free(block.block_id, site);

    debug!(
      event = "free",
      block_id = block.block_id,
      addr = %handle,
      size = block.size,
      "Freed"
    );

    self.coalesce_forward(offset);
    self.coalesce_backward(offset);

    Ok(())
  }

  pub(crate) fn resize(
    &mut self,
    handle: Handle,
    new_size: usize,
  ) -> Result<Option<Handle>> {
    if handle.is_null() {
      return self.allocate(new_size, None).map(Some);
    }

    if new_size == 0 {
      return self.release(handle, None).map(|()| None);
    }

    self.ensure_initialized();

    let (offset, block) = self.lookup_allocated(handle)?;

    if new_size <= block.usable() {
      return Ok(Some(handle));
    }

    self.check_request(new_size)?;

    if self.grow_in_place(offset, new_size + block.padding) {
      debug!(
        event = "resize_in_place",
        block_id = block.block_id,
        addr = %handle,
        new_size,
        "Extended in place"
      );
      return Ok(Some(handle));
    }

    let moved = self.allocate(new_size, None)?;
    let source = offset + HEADER_SIZE + block.padding;
    let target = moved.addr() - self.base();

    self.arena.copy_within(source..source + block.usable(), target);

    if let Some(site) = self.sites.allocated_at(block.block_id) {
      let moved_id = Block::read(&self.arena, target - HEADER_SIZE).block_id;
      self.sites.record_alloc(moved_id, Some(site));
    }

    self.release(handle, None)?;

    debug!(
      event = "resize_relocate",
      from = %handle,
      to = %moved,
      new_size,
      "Relocated"
    );

    Ok(Some(moved))
  }

  /// Grows the block at `offset` to `needed` payload bytes by absorbing its
  /// free physical successor. Leaves everything untouched and returns `false`
  /// if the successor is missing, in use, or too small.
  fn grow_in_place(
    &mut self,
    offset: usize,
    needed: usize,
  ) -> bool {
    let Some(next_offset) = self.next_block(offset) else {
      return false;
    };

    let mut block = Block::read(&self.arena, offset);
    let next = Block::read(&self.arena, next_offset);

    let combined = block.size + HEADER_SIZE + next.size;

    if !next.is_free || combined < needed {
      return false;
    }

    self.free_list.remove(&mut self.arena, next_offset);
    self.sites.forget(next.block_id);
    Block::retire(&mut self.arena, next_offset);

    if combined > needed + HEADER_SIZE + MIN_SPLIT_REMAINDER {
      let rest_offset = offset + HEADER_SIZE + needed;
      let rest = Block::new(combined - needed - HEADER_SIZE, true, None, self.next_id());

      block.size = needed;
      block.write(&mut self.arena, offset);
      rest.write(&mut self.arena, rest_offset);
      self.free_list.push(&mut self.arena, rest_offset);
    } else {
      block.size = combined;
      block.write(&mut self.arena, offset);
    }

    true
  }

  /// Marks every block free, then rebuilds the arena as a single free block.
  /// Returns how many blocks were still in use.
  pub(crate) fn free_all(&mut self) -> usize {
    self.ensure_initialized();

    let mut released = 0;
    let mut offset = 0;

    while offset + HEADER_SIZE <= self.capacity() {
      let mut block = Block::read(&self.arena, offset);

      if !block.is_free {
        block.is_free = true;
        block.write(&mut self.arena, offset);
        released += 1;
      }

      offset = block.end(offset);
    }

    debug_assert_eq!(offset, self.capacity(), "block walk overran the arena");

    self.reset();

    info!(event = "free_all", released, "All blocks released");

    released
  }

  /// Arena range the caller may read and write through `handle`.
  pub(crate) fn payload(
    &self,
    handle: Handle,
  ) -> Result<Range<usize>> {
    let (offset, block) = self.lookup_allocated(handle)?;
    let start = offset + HEADER_SIZE + block.padding;

    Ok(start..start + block.usable())
  }

  fn payload_window(
    &self,
    handle: Handle,
    at: usize,
    len: usize,
  ) -> Result<Range<usize>> {
    let range = self.payload(handle)?;

    match at.checked_add(len) {
      Some(end) if end <= range.len() => Ok(range.start + at..range.start + end),
      _ => Err(AllocError::invalid_request(format!(
        "access of {len} bytes at offset {at} overruns a {}-byte payload",
        range.len()
      ))),
    }
  }
}

/// A fixed-capacity allocator over one arena.
///
/// Every method takes the pool's single lock once, for its whole duration.
pub struct Pool {
  state: Mutex<PoolState>,
}

impl Pool {
  /// A 2 MiB pool with default settings.
  pub fn new() -> Self {
    Self {
      state: Mutex::new(PoolState::new(&PoolConfig::default())),
    }
  }

  pub fn with_config(config: PoolConfig) -> Result<Self> {
    config.validate()?;

    Ok(Self {
      state: Mutex::new(PoolState::new(&config)),
    })
  }

  /// Lays out the initial free block. Every other operation does this on
  /// first use, so calling it is optional. Calling it twice is a no-op.
  pub fn initialize(&self) {
    self.state.lock().ensure_initialized();
  }

  /// Total arena size, headers included.
  pub fn capacity(&self) -> usize {
    self.state.lock().capacity()
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<Handle> {
    self.state.lock().allocate(size, None)
  }

  /// [`allocate`](Self::allocate), remembering the caller's location when
  /// site tracking is enabled.
  #[track_caller]
  pub fn allocate_tracked(
    &self,
    size: usize,
  ) -> Result<Handle> {
    let site = Location::caller();
    self.state.lock().allocate(size, Some(site))
  }

  /// `count * elem_size` bytes, all zero.
  pub fn allocate_zeroed(
    &self,
    count: usize,
    elem_size: usize,
  ) -> Result<Handle> {
    self.state.lock().allocate_zeroed(count, elem_size, None)
  }

  #[track_caller]
  pub fn allocate_zeroed_tracked(
    &self,
    count: usize,
    elem_size: usize,
  ) -> Result<Handle> {
    let site = Location::caller();
    self.state.lock().allocate_zeroed(count, elem_size, Some(site))
  }

  /// `size` bytes starting at an address that is a multiple of `alignment`.
  pub fn allocate_aligned(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<Handle> {
    self.state.lock().allocate_aligned(size, alignment, None)
  }

  #[track_caller]
  pub fn allocate_aligned_tracked(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<Handle> {
    let site = Location::caller();
    self.state.lock().allocate_aligned(size, alignment, Some(site))
  }

  pub fn free(
    &self,
    handle: Handle,
  ) -> Result<()> {
    self.state.lock().release(handle, None)
  }

  #[track_caller]
  pub fn free_tracked(
    &self,
    handle: Handle,
  ) -> Result<()> {
    let site = Location::caller();
    self.state.lock().release(handle, Some(site))
  }

  /// Grows or keeps the block behind `handle`.
  ///
  /// A null handle allocates, a zero size frees and yields `None`. Shrinking
  /// keeps the block as it is. Growing first tries to absorb the next block,
  /// then falls back to allocate, copy and free.
  pub fn resize(
    &self,
    handle: Handle,
    new_size: usize,
  ) -> Result<Option<Handle>> {
    self.state.lock().resize(handle, new_size)
  }

  /// Releases every block at once, without per-block checks, and returns how
  /// many were still in use.
  pub fn free_all(&self) -> usize {
    self.state.lock().free_all()
  }

  /// Merges adjacent free blocks in one left-to-right sweep and returns the
  /// number of merges.
  ///
  /// A run of three or more free blocks may need several calls to collapse.
  pub fn defragment(&self) -> usize {
    self.state.lock().defragment()
  }

  pub fn leak_check(&self) -> LeakReport {
    self.state.lock().leak_check()
  }

  pub fn stats(&self) -> PoolStats {
    self.state.lock().stats()
  }

  pub fn memory_map(&self) -> MemoryMap {
    self.state.lock().memory_map()
  }

  /// Walks the arena and cross-checks it against the free list.
  pub fn verify_layout(&self) -> bool {
    self.state.lock().verify_layout()
  }

  /// Payload bytes available behind `handle`.
  pub fn usable_size(
    &self,
    handle: Handle,
  ) -> Result<usize> {
    self.state.lock().payload(handle).map(|range| range.len())
  }

  pub fn write(
    &self,
    handle: Handle,
    at: usize,
    bytes: &[u8],
  ) -> Result<()> {
    let mut state = self.state.lock();
    let range = state.payload_window(handle, at, bytes.len())?;

    state.arena[range].copy_from_slice(bytes);

    Ok(())
  }

  pub fn read(
    &self,
    handle: Handle,
    at: usize,
    len: usize,
  ) -> Result<Vec<u8>> {
    let state = self.state.lock();
    let range = state.payload_window(handle, at, len)?;

    Ok(state.arena[range].to_vec())
  }

  /// Sets the whole payload to `byte`.
  pub fn fill(
    &self,
    handle: Handle,
    byte: u8,
  ) -> Result<()> {
    let mut state = self.state.lock();
    let range = state.payload(handle)?;

    state.arena[range].fill(byte);

    Ok(())
  }
}

impl Default for Pool {
  fn default() -> Self {
    Self::new()
  }
}
