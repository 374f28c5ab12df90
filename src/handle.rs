use std::fmt;

/// Address of a payload handed out by a [`Pool`](crate::Pool).
///
/// A handle is only a number: it carries no borrow of the pool and can be
/// printed, parsed back from hex, or forged. The pool checks every handle it
/// receives before touching the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(usize);

impl Handle {
  pub const NULL: Handle = Handle(0);

  pub const fn from_addr(addr: usize) -> Self {
    Self(addr)
  }

  pub const fn addr(self) -> usize {
    self.0
  }

  pub const fn is_null(self) -> bool {
    self.0 == 0
  }

  /// The address `bytes` further on. Never valid to free, but useful to
  /// probe the pool's pointer checks.
  pub const fn offset(
    self,
    bytes: usize,
  ) -> Self {
    Self(self.0 + bytes)
  }
}

impl fmt::Display for Handle {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:#014x}", self.0)
  }
}

impl fmt::LowerHex for Handle {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    fmt::LowerHex::fmt(&self.0, f)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_null() {
    assert!(Handle::NULL.is_null());
    assert!(Handle::default().is_null());
    assert!(!Handle::from_addr(0x10).is_null());
  }

  #[test]
  fn test_format() {
    let handle = Handle::from_addr(0xbeef);

    assert_eq!(format!("{handle}"), "0x00000000beef");
    assert_eq!(format!("{handle:x}"), "beef");
    assert_eq!(handle.offset(1).addr(), 0xbef0);
  }
}
