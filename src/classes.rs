//! Segregated free-list directory.

use crate::block::FreeBlock;

/// Upper bound (inclusive) of each size class. The last class is unbounded.
const BREAKPOINTS: [usize; NUM_CLASSES - 1] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Number of size classes.
pub const NUM_CLASSES: usize = 10;

/// Index of the class holding blocks of `size` bytes.
///
/// Monotonic: a larger size never maps to a smaller class.
///
/// ```rust
/// use segalloc::class_of;
///
/// assert_eq!(class_of(16), 0);
/// assert_eq!(class_of(32), 1);
/// assert_eq!(class_of(33), 2);
/// assert_eq!(class_of(1 << 20), 9);
/// ```
#[inline]
pub fn class_of(size: usize) -> usize {
  BREAKPOINTS.partition_point(|&bound| bound < size)
}

/// Heads of the per-class doubly linked lists. The links themselves live in
/// the free blocks, so every operation takes the heap bytes.
#[derive(Debug, Clone, Default)]
pub(crate) struct SizeClasses {
  heads: [Option<FreeBlock>; NUM_CLASSES],
}

impl SizeClasses {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn clear(&mut self) {
    self.heads = [None; NUM_CLASSES];
  }

  #[inline]
  pub fn head(
    &self,
    class: usize,
  ) -> Option<FreeBlock> {
    self.heads[class]
  }

  /// Pushes `block` at the head of its class.
  pub fn insert(
    &mut self,
    mem: &mut [u8],
    block: FreeBlock,
  ) {
    let class = class_of(block.size(mem));
    let head = self.heads[class];

    block.set_prev_link(mem, None);
    block.set_next_link(mem, head);
    if let Some(head) = head {
      head.set_prev_link(mem, Some(block));
    }

    self.heads[class] = Some(block);
  }

  /// Unlinks `block` from its class. The block must still carry the size it
  /// was inserted with.
  pub fn remove(
    &mut self,
    mem: &mut [u8],
    block: FreeBlock,
  ) {
    let class = class_of(block.size(mem));
    let prev = block.prev_link(mem);
    let next = block.next_link(mem);

    match prev {
      Some(prev) => prev.set_next_link(mem, next),
      None => {
        debug_assert_eq!(self.heads[class], Some(block));
        self.heads[class] = next;
      }
    }

    if let Some(next) = next {
      next.set_prev_link(mem, prev);
    }
  }

  /// Walks one class list from its head.
  pub fn iter<'a>(
    &self,
    mem: &'a [u8],
    class: usize,
  ) -> ClassIter<'a> {
    ClassIter {
      mem,
      current: self.head(class),
    }
  }
}

pub(crate) struct ClassIter<'a> {
  mem: &'a [u8],
  current: Option<FreeBlock>,
}

impl Iterator for ClassIter<'_> {
  type Item = FreeBlock;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;
    self.current = block.next_link(self.mem);
    Some(block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::Block;

  #[test]
  fn test_class_breakpoints() {
    assert_eq!(class_of(0), 0);
    assert_eq!(class_of(16), 0);
    assert_eq!(class_of(17), 1);
    assert_eq!(class_of(32), 1);
    assert_eq!(class_of(33), 2);
    assert_eq!(class_of(2048), 7);
    assert_eq!(class_of(4096), 8);
    assert_eq!(class_of(4097), 9);
    assert_eq!(class_of(usize::MAX), NUM_CLASSES - 1);
  }

  #[test]
  fn test_class_of_is_monotonic() {
    let mut last = 0;
    for size in (0..10_000).step_by(8) {
      let class = class_of(size);
      assert!(class >= last, "class_of({size}) went backwards");
      last = class;
    }
  }

  /// Three 32-byte free blocks, all in class 1.
  fn blocks(mem: &mut [u8]) -> [FreeBlock; 3] {
    [16, 48, 80].map(|bp| Block::at(bp).mark_free(mem, 32))
  }

  fn listed(
    classes: &SizeClasses,
    mem: &[u8],
  ) -> Vec<usize> {
    classes.iter(mem, 1).map(FreeBlock::offset).collect()
  }

  #[test]
  fn test_insert_is_lifo() {
    let mut mem = vec![0u8; 128];
    let [a, b, c] = blocks(&mut mem);
    let mut classes = SizeClasses::new();

    classes.insert(&mut mem, a);
    classes.insert(&mut mem, b);
    classes.insert(&mut mem, c);

    assert_eq!(listed(&classes, &mem), vec![80, 48, 16]);
    assert_eq!(classes.head(1), Some(c));
    assert_eq!(classes.head(0), None);
    assert_eq!(a.prev_link(&mem), Some(b));
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let mut mem = vec![0u8; 128];
    let [a, b, c] = blocks(&mut mem);
    let mut classes = SizeClasses::new();
    for block in [a, b, c] {
      classes.insert(&mut mem, block);
    }

    // middle
    classes.remove(&mut mem, b);
    assert_eq!(listed(&classes, &mem), vec![80, 16]);
    assert_eq!(a.prev_link(&mem), Some(c));

    // tail
    classes.remove(&mut mem, a);
    assert_eq!(listed(&classes, &mem), vec![80]);
    assert_eq!(c.next_link(&mem), None);

    // head, and the list empties
    classes.remove(&mut mem, c);
    assert_eq!(classes.head(1), None);
  }

  #[test]
  fn test_remove_head_promotes_successor() {
    let mut mem = vec![0u8; 128];
    let [a, b, _] = blocks(&mut mem);
    let mut classes = SizeClasses::new();
    classes.insert(&mut mem, a);
    classes.insert(&mut mem, b);

    classes.remove(&mut mem, b);
    assert_eq!(classes.head(1), Some(a));
    assert_eq!(a.prev_link(&mem), None);
  }

  #[test]
  fn test_clear() {
    let mut mem = vec![0u8; 128];
    let [a, ..] = blocks(&mut mem);
    let mut classes = SizeClasses::new();
    classes.insert(&mut mem, a);
    classes.clear();
    assert!((0..NUM_CLASSES).all(|class| classes.head(class).is_none()));
  }
}
