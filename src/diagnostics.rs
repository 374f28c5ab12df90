//! Read-only reports built by walking the arena from offset 0.

use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::{
  block::{Block, HEADER_SIZE},
  handle::Handle,
  pool::PoolState,
  sites::Site,
};

/// One block as seen by a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub block_id: u32,
  /// Address handed out for the block.
  pub addr: Handle,
  pub size: usize,
  pub is_free: bool,
  pub allocated_at: Option<Site>,
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Block #{:>3} | Addr: {} | Size: {:>6} bytes", self.block_id, self.addr, self.size)?;

    if let Some(site) = self.allocated_at {
      write!(f, " | allocated at {site}")?;
    }

    Ok(())
  }
}

/// Blocks still in use at the time of the check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
  blocks: Vec<BlockInfo>,
}

impl LeakReport {
  pub fn is_clean(&self) -> bool {
    self.blocks.is_empty()
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  pub fn blocks(&self) -> &[BlockInfo] {
    &self.blocks
  }

  pub fn leaked_bytes(&self) -> usize {
    self.blocks.iter().map(|info| info.size).sum()
  }
}

impl fmt::Display for LeakReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    if self.is_clean() {
      return write!(f, "No memory leaks detected");
    }

    write!(f, "Memory leak detected! {} blocks not freed:", self.blocks.len())?;

    for info in &self.blocks {
      write!(f, "\n[LEAKED] {info}")?;
    }

    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
  pub capacity: usize,
  pub total_blocks: usize,
  pub used_blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes of blocks in use, headers excluded.
  pub used_bytes: usize,
  /// Payload bytes of free blocks, headers excluded.
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl PoolStats {
  pub fn header_bytes(&self) -> usize {
    self.total_blocks * HEADER_SIZE
  }

  pub fn used_percent(&self) -> usize {
    percent(self.used_blocks, self.total_blocks)
  }

  pub fn free_percent(&self) -> usize {
    percent(self.free_blocks, self.total_blocks)
  }

  /// 0.0 when all free space sits in one block, approaching 1.0 as it
  /// scatters into many small ones.
  pub fn fragmentation(&self) -> f64 {
    if self.free_bytes == 0 {
      return 0.0;
    }

    1.0 - self.largest_free as f64 / self.free_bytes as f64
  }
}

fn percent(
  part: usize,
  whole: usize,
) -> usize {
  if whole == 0 { 0 } else { part * 100 / whole }
}

impl fmt::Display for PoolStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "Memory Allocator Statistics:")?;
    writeln!(f, "   Total Pool Size: {:>8} bytes", self.capacity)?;
    writeln!(f, "   Total Blocks:    {:>8}", self.total_blocks)?;
    writeln!(f, "   Used Blocks:     {:>8} ({}%)", self.used_blocks, self.used_percent())?;
    writeln!(f, "   Free Blocks:     {:>8} ({}%)", self.free_blocks, self.free_percent())?;
    writeln!(f, "   Used Memory:     {:>8} bytes", self.used_bytes)?;
    writeln!(f, "   Free Memory:     {:>8} bytes", self.free_bytes)?;
    write!(f, "   Fragmentation:   {:>7.1}%", self.fragmentation() * 100.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  Used,
  Free,
}

/// The first few blocks of the arena, in address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
  states: Vec<BlockState>,
  total_blocks: usize,
}

impl MemoryMap {
  pub fn states(&self) -> &[BlockState] {
    &self.states
  }

  pub fn total_blocks(&self) -> usize {
    self.total_blocks
  }

  pub fn is_truncated(&self) -> bool {
    self.states.len() < self.total_blocks
  }
}

impl fmt::Display for MemoryMap {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for state in &self.states {
      match state {
        BlockState::Used => write!(f, "[USED]")?,
        BlockState::Free => write!(f, "[FREE]")?,
      }
    }

    if self.is_truncated() {
      write!(f, "... (+{} more)", self.total_blocks - self.states.len())?;
    }

    Ok(())
  }
}

impl PoolState {
  fn info(
    &self,
    offset: usize,
    block: &Block,
  ) -> BlockInfo {
    BlockInfo {
      block_id: block.block_id,
      addr: self.handle_at(offset, block.padding),
      size: block.size,
      is_free: block.is_free,
      allocated_at: self.sites.allocated_at(block.block_id),
    }
  }

  pub(crate) fn leak_check(&mut self) -> LeakReport {
    self.ensure_initialized();

    let blocks: Vec<_> = self
      .blocks()
      .filter(|(_, block)| !block.is_free)
      .map(|(offset, block)| self.info(offset, &block))
      .collect();

    let report = LeakReport { blocks };

    if report.is_clean() {
      info!(event = "leak_check", leaked = 0, "No memory leaks detected");
    } else {
      warn!(
        event = "leak_check",
        leaked = report.len(),
        leaked_bytes = report.leaked_bytes(),
        "Memory leak detected"
      );
    }

    report
  }

  pub(crate) fn stats(&mut self) -> PoolStats {
    self.ensure_initialized();

    let mut stats = PoolStats {
      capacity: self.capacity(),
      ..PoolStats::default()
    };

    for (_, block) in self.blocks() {
      stats.total_blocks += 1;

      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used_blocks += 1;
        stats.used_bytes += block.size;
      }
    }

    stats
  }

  pub(crate) fn memory_map(&mut self) -> MemoryMap {
    self.ensure_initialized();

    let mut states = Vec::new();
    let mut total_blocks = 0;

    for (_, block) in self.blocks() {
      if states.len() < self.map_limit {
        states.push(if block.is_free { BlockState::Free } else { BlockState::Used });
      }
      total_blocks += 1;
    }

    MemoryMap { states, total_blocks }
  }

  /// The physical walk must end exactly at the arena's end, and the free list
  /// must hold exactly the free blocks found on the way.
  pub(crate) fn verify_layout(&mut self) -> bool {
    self.ensure_initialized();

    let mut end = 0;
    let mut free = HashSet::new();

    for (offset, block) in self.blocks() {
      if offset != end {
        return false;
      }
      if block.is_free {
        free.insert(offset);
      }
      end = block.end(offset);
    }

    if end != self.capacity() {
      warn!(event = "layout_corrupt", end, capacity = self.capacity(), "Block walk overran the arena");
      return false;
    }

    let mut listed = HashSet::new();

    for (offset, _) in self.free_list.iter(&self.arena) {
      if !free.contains(&offset) || !listed.insert(offset) {
        return false;
      }
    }

    listed.len() == free.len()
  }
}
