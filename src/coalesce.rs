//! Merging of physically adjacent free blocks.
//!
//! Neighbours are found by walking the arena layout, never through the free
//! list: the next block starts where this one's payload ends, and the
//! previous one is whichever block ends where this one starts.

use tracing::{info, trace};

use crate::{
  block::{Block, HEADER_SIZE},
  pool::PoolState,
};

impl PoolState {
  pub(crate) fn next_block(
    &self,
    offset: usize,
  ) -> Option<usize> {
    let next = Block::read(&self.arena, offset).end(offset);

    (next + HEADER_SIZE <= self.capacity()).then_some(next)
  }

  pub(crate) fn previous_block(
    &self,
    offset: usize,
  ) -> Option<usize> {
    self
      .blocks()
      .take_while(|(start, _)| *start < offset)
      .find(|(start, block)| block.end(*start) == offset)
      .map(|(start, _)| start)
  }

  /// `survivor` swallows `absorbed`, which must directly follow it. Both are
  /// free; only the survivor stays on the free list.
  fn merge(
    &mut self,
    survivor: usize,
    absorbed: usize,
  ) {
    let gone = Block::read(&self.arena, absorbed);

    self.free_list.remove(&mut self.arena, absorbed);

    let mut block = Block::read(&self.arena, survivor);
    block.size += HEADER_SIZE + gone.size;
    block.write(&mut self.arena, survivor);

    Block::retire(&mut self.arena, absorbed);
    self.sites.forget(gone.block_id);

    trace!(
      event = "merge",
      block_id = block.block_id,
      absorbed_id = gone.block_id,
      size = block.size,
      "Merged blocks"
    );
  }

  /// Merges the free block at `offset` with its successor if that one is
  /// free too.
  pub(crate) fn coalesce_forward(
    &mut self,
    offset: usize,
  ) -> bool {
    match self.next_block(offset) {
      Some(next) if Block::read(&self.arena, next).is_free => {
        self.merge(offset, next);
        true
      }
      _ => false,
    }
  }

  /// Merges the free block at `offset` into its predecessor if that one is
  /// free too.
  pub(crate) fn coalesce_backward(
    &mut self,
    offset: usize,
  ) -> bool {
    match self.previous_block(offset) {
      Some(previous) if Block::read(&self.arena, previous).is_free => {
        self.merge(previous, offset);
        true
      }
      _ => false,
    }
  }

  /// One sweep from the start of the arena. After a merge the sweep moves
  /// past the merged block, so it never looks at the block's new successor.
  pub(crate) fn defragment(&mut self) -> usize {
    self.ensure_initialized();

    let mut merges = 0;
    let mut offset = 0;

    while offset + HEADER_SIZE <= self.capacity() {
      if Block::read(&self.arena, offset).is_free && self.coalesce_forward(offset) {
        merges += 1;
      }

      offset = Block::read(&self.arena, offset).end(offset);
    }

    debug_assert_eq!(offset, self.capacity(), "block walk overran the arena");

    info!(event = "defragment", merges, "Defragmentation pass complete");

    merges
  }
}
