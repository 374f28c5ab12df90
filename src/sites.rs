//! Call-site provenance, kept beside the arena rather than in the headers.

use std::collections::HashMap;
use std::panic::Location;

/// A source location captured with `#[track_caller]`.
pub type Site = &'static Location<'static>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provenance {
  pub allocated_at: Option<Site>,
  pub freed_at: Option<Site>,
}

/// Block id → provenance. Empty and inert unless tracking is enabled.
#[derive(Debug, Default)]
pub struct SiteTable {
  enabled: bool,
  entries: HashMap<u32, Provenance>,
}

impl SiteTable {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      entries: HashMap::new(),
    }
  }

  /// Starts a fresh record for a block that was just handed out.
  pub fn record_alloc(
    &mut self,
    block_id: u32,
    site: Option<Site>,
  ) {
    if !self.enabled {
      return;
    }

    match site {
      Some(site) => {
        self.entries.insert(
          block_id,
          Provenance {
            allocated_at: Some(site),
            freed_at: None,
          },
        );
      }
      None => {
        self.entries.remove(&block_id);
      }
    }
  }

  pub fn record_free(
    &mut self,
    block_id: u32,
    site: Option<Site>,
  ) {
    if !self.enabled {
      return;
    }

    if let Some(site) = site {
      self.entries.entry(block_id).or_default().freed_at = Some(site);
    }
  }

  pub fn allocated_at(
    &self,
    block_id: u32,
  ) -> Option<Site> {
    self.entries.get(&block_id).and_then(|entry| entry.allocated_at)
  }

  pub fn freed_at(
    &self,
    block_id: u32,
  ) -> Option<Site> {
    self.entries.get(&block_id).and_then(|entry| entry.freed_at)
  }

  /// Drops the record of a block that no longer exists on its own.
  pub fn forget(
    &mut self,
    block_id: u32,
  ) {
    self.entries.remove(&block_id);
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }
}
