//! Singly-linked list threading the free blocks.
//!
//! Links are arena offsets stored in each free block's header, so the list
//! costs no memory outside the arena. Blocks are pushed at the head: the list
//! is in most-recently-freed order, not address order.

use crate::block::Block;

#[derive(Debug, Default)]
pub struct FreeList {
  head: Option<usize>,
}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None }
  }

  /// Drops every entry. The headers are left as they are.
  pub fn clear(&mut self) {
    self.head = None;
  }

  pub fn push(
    &mut self,
    arena: &mut [u8],
    offset: usize,
  ) {
    let mut block = Block::read(arena, offset);
    block.next = self.head;
    block.write(arena, offset);

    self.head = Some(offset);
  }

  /// Unlinks the block at `offset`. Returns `false` if it was not listed.
  pub fn remove(
    &mut self,
    arena: &mut [u8],
    offset: usize,
  ) -> bool {
    let Some(head) = self.head else {
      return false;
    };

    if head == offset {
      let mut block = Block::read(arena, offset);
      self.head = block.next.take();
      block.write(arena, offset);
      return true;
    }

    let mut current = head;

    while let Some(next) = Block::read(arena, current).next {
      if next == offset {
        let mut removed = Block::read(arena, offset);
        let mut previous = Block::read(arena, current);

        previous.next = removed.next.take();
        previous.write(arena, current);
        removed.write(arena, offset);

        return true;
      }
      current = next;
    }

    false
  }

  pub fn iter<'a>(
    &self,
    arena: &'a [u8],
  ) -> Iter<'a> {
    Iter {
      arena,
      current: self.head,
    }
  }

  /// Smallest free block whose payload holds `size` bytes.
  ///
  /// Every entry is examined. Among equally sized candidates the one nearest
  /// the head wins.
  pub fn best_fit(
    &self,
    arena: &[u8],
    size: usize,
  ) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for (offset, block) in self.iter(arena) {
      if !block.is_free || block.size < size {
        continue;
      }

      match best {
        Some((_, best_size)) if best_size <= block.size => {}
        _ => best = Some((offset, block.size)),
      }
    }

    best.map(|(offset, _)| offset)
  }

  /// Payload size of the largest listed block, 0 if the list is empty.
  pub fn largest(
    &self,
    arena: &[u8],
  ) -> usize {
    self.iter(arena).map(|(_, block)| block.size).max().unwrap_or(0)
  }
}

pub struct Iter<'a> {
  arena: &'a [u8],
  current: Option<usize>,
}

impl Iterator for Iter<'_> {
  type Item = (usize, Block);

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.current?;
    let block = Block::read(self.arena, offset);

    self.current = block.next;

    Some((offset, block))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::HEADER_SIZE;

  const STRIDE: usize = HEADER_SIZE + 64;

  /// Lays out free blocks of the given sizes, one every `STRIDE` bytes.
  fn arena_with(sizes: &[usize]) -> (Vec<u8>, Vec<usize>) {
    let mut arena = vec![0u8; STRIDE * sizes.len()];
    let mut offsets = Vec::new();

    for (i, size) in sizes.iter().enumerate() {
      let offset = i * STRIDE;
      Block::new(*size, true, None, i as u32).write(&mut arena, offset);
      offsets.push(offset);
    }

    (arena, offsets)
  }

  #[test]
  fn test_push_is_lifo() {
    let (mut arena, offsets) = arena_with(&[10, 20, 30]);
    let mut list = FreeList::new();

    for offset in &offsets {
      list.push(&mut arena, *offset);
    }

    let order: Vec<_> = list.iter(&arena).map(|(offset, _)| offset).collect();

    assert_eq!(order, vec![offsets[2], offsets[1], offsets[0]]);
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let (mut arena, offsets) = arena_with(&[10, 20, 30, 40]);
    let mut list = FreeList::new();

    for offset in &offsets {
      list.push(&mut arena, *offset);
    }

    assert!(list.remove(&mut arena, offsets[3]));
    assert!(list.remove(&mut arena, offsets[1]));
    assert!(list.remove(&mut arena, offsets[0]));
    assert!(!list.remove(&mut arena, offsets[1]));

    let order: Vec<_> = list.iter(&arena).map(|(offset, _)| offset).collect();

    assert_eq!(order, vec![offsets[2]]);
    assert_eq!(Block::read(&arena, offsets[1]).next, None);
  }

  #[test]
  fn test_best_fit_picks_smallest() {
    let (mut arena, offsets) = arena_with(&[64, 16, 48, 32]);
    let mut list = FreeList::new();

    for offset in &offsets {
      list.push(&mut arena, *offset);
    }

    assert_eq!(list.best_fit(&arena, 30), Some(offsets[3]));
    assert_eq!(list.best_fit(&arena, 16), Some(offsets[1]));
    assert_eq!(list.best_fit(&arena, 49), Some(offsets[0]));
    assert_eq!(list.best_fit(&arena, 65), None);
    assert_eq!(list.largest(&arena), 64);
  }

  #[test]
  fn test_best_fit_tie_prefers_head() {
    let (mut arena, offsets) = arena_with(&[32, 32]);
    let mut list = FreeList::new();

    list.push(&mut arena, offsets[0]);
    list.push(&mut arena, offsets[1]);

    assert_eq!(list.best_fit(&arena, 8), Some(offsets[1]));
  }

  #[test]
  fn test_empty() {
    let arena = vec![0u8; STRIDE];
    let list = FreeList::new();

    assert_eq!(list.best_fit(&arena, 1), None);
    assert_eq!(list.largest(&arena), 0);
  }
}
