//! Block header layout.
//!
//! Every block in the arena starts with a fixed-size header encoded directly
//! into the arena bytes, followed by its payload:
//!
//! ```text
//!   offset  0        1          5          13         21          29         37   HEADER_SIZE
//!           ┌────────┬──────────┬──────────┬──────────┬───────────┬──────────┬────┐
//!           │is_free │ block_id │   size   │   next   │ alignment │ padding  │pad │
//!           │  u8    │   u32    │   u64    │   u64    │    u64    │   u64    │    │
//!           └────────┴──────────┴──────────┴──────────┴───────────┴──────────┴────┘
//! ```
//!
//! `next` is stored as `offset + 1` so that an all-zero header reads back as a
//! block with no free-list successor.

use crate::align;

const ENCODED_LEN: usize = 37;

/// Size in bytes of the header in front of every block's payload.
pub const HEADER_SIZE: usize = align!(ENCODED_LEN);

const IS_FREE: usize = 0;
const BLOCK_ID: usize = 1;
const SIZE: usize = 5;
const NEXT: usize = 13;
const ALIGNMENT: usize = 21;
const PADDING: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  /// Payload bytes, header excluded. Includes alignment padding.
  pub size: usize,
  pub is_free: bool,
  /// Offset of the next free block. Meaningful only while `is_free`.
  pub next: Option<usize>,
  pub block_id: u32,
  pub alignment: usize,
  /// Filler bytes between the header and the address handed out.
  pub padding: usize,
}

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    next: Option<usize>,
    block_id: u32,
  ) -> Self {
    Self {
      size,
      is_free,
      next,
      block_id,
      alignment: 0,
      padding: 0,
    }
  }

  /// Decodes the header stored at `offset`.
  pub fn read(
    arena: &[u8],
    offset: usize,
  ) -> Self {
    let header = &arena[offset..offset + HEADER_SIZE];

    let next = u64::from_ne_bytes(field(header, NEXT)) as usize;

    Self {
      size: u64::from_ne_bytes(field(header, SIZE)) as usize,
      is_free: header[IS_FREE] != 0,
      next: next.checked_sub(1),
      block_id: u32::from_ne_bytes(field(header, BLOCK_ID)),
      alignment: u64::from_ne_bytes(field(header, ALIGNMENT)) as usize,
      padding: u64::from_ne_bytes(field(header, PADDING)) as usize,
    }
  }

  /// Encodes this header at `offset`.
  pub fn write(
    &self,
    arena: &mut [u8],
    offset: usize,
  ) {
    let header = &mut arena[offset..offset + HEADER_SIZE];

    header.fill(0);
    header[IS_FREE] = self.is_free as u8;
    header[BLOCK_ID..SIZE].copy_from_slice(&self.block_id.to_ne_bytes());
    header[SIZE..NEXT].copy_from_slice(&(self.size as u64).to_ne_bytes());
    header[NEXT..ALIGNMENT].copy_from_slice(&(self.next.map_or(0, |next| next + 1) as u64).to_ne_bytes());
    header[ALIGNMENT..PADDING].copy_from_slice(&(self.alignment as u64).to_ne_bytes());
    header[PADDING..ENCODED_LEN].copy_from_slice(&(self.padding as u64).to_ne_bytes());
  }

  /// Wipes the header at `offset` once its block has been absorbed by a
  /// neighbour. The bytes become plain payload of the survivor.
  pub fn retire(
    arena: &mut [u8],
    offset: usize,
  ) {
    arena[offset..offset + HEADER_SIZE].fill(0);
  }

  /// Offset of the first byte after this block.
  #[inline]
  pub fn end(
    &self,
    offset: usize,
  ) -> usize {
    offset + HEADER_SIZE + self.size
  }

  /// Payload bytes usable by the caller.
  #[inline]
  pub fn usable(&self) -> usize {
    self.size - self.padding
  }
}

fn field<const N: usize>(
  header: &[u8],
  at: usize,
) -> [u8; N] {
  let mut bytes = [0u8; N];
  bytes.copy_from_slice(&header[at..at + N]);
  bytes
}

/// Physical walk over the arena, from offset 0 to the end of the last block.
pub struct Blocks<'a> {
  arena: &'a [u8],
  offset: usize,
}

impl<'a> Blocks<'a> {
  pub fn new(arena: &'a [u8]) -> Self {
    Self { arena, offset: 0 }
  }
}

impl Iterator for Blocks<'_> {
  type Item = (usize, Block);

  fn next(&mut self) -> Option<Self::Item> {
    if self.offset.saturating_add(HEADER_SIZE) > self.arena.len() {
      return None;
    }

    let offset = self.offset;
    let block = Block::read(self.arena, offset);

    self.offset = offset.saturating_add(HEADER_SIZE).saturating_add(block.size);

    Some((offset, block))
  }
}
