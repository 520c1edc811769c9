/// Rounds `value` up to the allocator's double-word alignment (8 bytes).
///
/// Every block size and payload offset handed out by the heap is a multiple
/// of this alignment, which keeps the low 3 bits of a size word free for
/// flags.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::ALIGNMENT - 1) & !($crate::ALIGNMENT - 1)
  };
}

/// Overflow-checked version of [`align!`], for sizes coming from callers.
#[inline]
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(crate::ALIGNMENT - 1) {
    Some(v) => Some(v & !(crate::ALIGNMENT - 1)),
    None => None,
  }
}
