/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use rpool::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; callers check this before reaching
/// for the macro.
///
/// ```rust
/// use rpool::align_to;
///
/// assert_eq!(align_to!(0x1001, 16), 0x1010);
/// assert_eq!(align_to!(0x1010, 16), 0x1010);
/// assert_eq!(align_to!(7, 1), 7);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}
