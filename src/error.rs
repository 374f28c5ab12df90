//! Error types for pool operations.

use thiserror::Error;

use crate::sites::Site;

/// Errors reported by pool operations. None of them leave the pool in a
/// modified state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The request can never be satisfied, whatever the pool holds.
  #[error("invalid request: {reason}")]
  InvalidRequest {
    reason: String,
  },

  /// No free block is currently large enough.
  #[error("out of memory: no free block can hold {requested} bytes (largest free block is {largest_free} bytes)")]
  OutOfMemory {
    requested: usize,
    largest_free: usize,
  },

  /// Null, outside the arena, or not an address the pool handed out.
  #[error("invalid pointer {addr:#x}: {reason}")]
  InvalidPointer {
    addr: usize,
    reason: &'static str,
  },

  /// The block behind this address is already free.
  #[error("double free of block #{block_id} at {addr:#x}")]
  DoubleFree {
    addr: usize,
    block_id: u32,
    /// Where the first free happened, when call sites are tracked.
    freed_at: Option<Site>,
  },

  /// `count * elem_size` does not fit in a `usize`.
  #[error("size overflow: {count} * {elem_size} does not fit in usize")]
  OverflowDetected {
    count: usize,
    elem_size: usize,
  },
}

/// The class of an [`AllocError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  InvalidRequest,
  OutOfMemory,
  InvalidPointer,
  DoubleFree,
  OverflowDetected,
}

impl AllocError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
      Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
      Self::InvalidPointer { .. } => ErrorKind::InvalidPointer,
      Self::DoubleFree { .. } => ErrorKind::DoubleFree,
      Self::OverflowDetected { .. } => ErrorKind::OverflowDetected,
    }
  }

  pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
    Self::InvalidRequest { reason: reason.into() }
  }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, AllocError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let err = AllocError::InvalidPointer {
      addr: 0x1234_5678,
      reason: "outside the pool",
    };
    assert_eq!(err.to_string(), "invalid pointer 0x12345678: outside the pool");

    let err = AllocError::OverflowDetected {
      count: usize::MAX,
      elem_size: 2,
    };
    assert_eq!(err.kind(), ErrorKind::OverflowDetected);
    assert!(err.to_string().starts_with("size overflow"));
  }
}
