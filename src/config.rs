//! Pool configuration.

use crate::block::HEADER_SIZE;
use crate::error::{AllocError, Result};

/// Arena capacity used when none is configured: 2 MiB.
pub const DEFAULT_POOL_SIZE: usize = 2 * 1024 * 1024;

/// Number of blocks a memory map renders before truncating.
pub const DEFAULT_MAP_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Arena size in bytes, headers included. Fixed for the pool's lifetime.
  pub capacity: usize,
  /// Blocks shown by [`Pool::memory_map`](crate::Pool::memory_map).
  pub map_limit: usize,
  /// Record allocation/free call sites for leak and double-free reports.
  pub track_sites: bool,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_POOL_SIZE,
      map_limit: DEFAULT_MAP_LIMIT,
      track_sites: cfg!(debug_assertions),
    }
  }
}

impl PoolConfig {
  /// Default configuration with a different arena size.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      ..Self::default()
    }
  }

  /// Create config from environment variables
  pub fn from_env() -> Self {
    let mut config = Self::default();

    // RPOOL_CAPACITY: arena size in bytes
    if let Some(capacity) = env_usize("RPOOL_CAPACITY") {
      config.capacity = capacity;
    }

    // RPOOL_MAP_LIMIT: blocks shown per memory map
    if let Some(limit) = env_usize("RPOOL_MAP_LIMIT") {
      config.map_limit = limit;
    }

    // RPOOL_TRACK_SITES: 1/true/0/false
    if let Ok(val) = std::env::var("RPOOL_TRACK_SITES") {
      config.track_sites = val == "1" || val.eq_ignore_ascii_case("true");
    }

    config
  }

  pub fn validate(&self) -> Result<()> {
    if self.capacity <= HEADER_SIZE {
      return Err(AllocError::invalid_request(format!(
        "pool capacity {} cannot hold a single {HEADER_SIZE}-byte header",
        self.capacity
      )));
    }

    if self.map_limit == 0 {
      return Err(AllocError::invalid_request("memory map limit must be at least 1"));
    }

    Ok(())
  }
}

fn env_usize(name: &str) -> Option<usize> {
  std::env::var(name).ok()?.trim().parse().ok()
}
