//! Heap walking, consistency checking and usage statistics.

use std::collections::HashSet;

use crate::{
  block::{Block, DSIZE, MIN_BLOCK},
  classes::{class_of, NUM_CLASSES},
  error::CheckError,
  heap::{Heap, FIRST_BLOCK, PROLOGUE},
  source::HeapSource,
  ALIGNMENT,
};

/// One block of the heap, as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset.
  pub offset: usize,
  /// Total size, tags included.
  pub size: usize,
  pub allocated: bool,
}

/// Snapshot of heap usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the source, sentinels included.
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub allocated_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// Address-ordered walk over every block between the sentinels.
pub struct Blocks<'a> {
  mem: &'a [u8],
  current: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current >= self.mem.len() {
      return None;
    }

    let block = Block::at(self.current);
    let size = block.size(self.mem);
    if size == 0 {
      // epilogue
      return None;
    }

    self.current += size;
    Some(BlockInfo {
      offset: block.offset(),
      size,
      allocated: block.is_allocated(self.mem),
    })
  }
}

impl<S: HeapSource> Heap<S> {
  /// Walks the heap in address order. Empty before `init`.
  ///
  /// The walk trusts the size words, so it is only meaningful on a heap that
  /// [`Heap::check`] accepts.
  pub fn blocks(&self) -> Blocks<'_> {
    let mem = self.source.memory();
    Blocks {
      mem,
      current: if self.is_initialized() { FIRST_BLOCK } else { mem.len() },
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.source.len(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      if block.allocated {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      }
    }

    stats
  }

  /// Verifies every structural invariant of the heap: sentinels, block
  /// alignment and size, matching tags, full coalescing, and that the size
  /// classes hold exactly the free blocks, each in its own class.
  ///
  /// Runs in time linear in the number of blocks.
  pub fn check(&self) -> Result<(), CheckError> {
    if !self.is_initialized() {
      return Ok(());
    }

    let mem = self.source.memory();
    let prologue = Block::at(PROLOGUE);
    if mem.len() < FIRST_BLOCK
      || prologue.size(mem) != DSIZE
      || !prologue.is_allocated(mem)
      || prologue.footer_tag(mem) != (DSIZE, true)
    {
      return Err(CheckError::BadPrologue);
    }

    let mut free = HashSet::new();
    let mut previous_free: Option<usize> = None;
    let mut current = FIRST_BLOCK;

    loop {
      let block = Block::at(current);
      if block.header() + DSIZE / 2 > mem.len() {
        return Err(CheckError::Overrun { offset: current });
      }

      let size = block.size(mem);
      if size == 0 {
        if current != mem.len() || !block.is_allocated(mem) {
          return Err(CheckError::BadEpilogue { offset: current });
        }
        break;
      }

      if current % ALIGNMENT != 0 || size % ALIGNMENT != 0 {
        return Err(CheckError::Misaligned { offset: current });
      }
      if size < MIN_BLOCK {
        return Err(CheckError::TooSmall { offset: current, size });
      }
      if current + size > mem.len() {
        return Err(CheckError::Overrun { offset: current });
      }

      let allocated = block.is_allocated(mem);
      if block.footer_tag(mem) != (size, allocated) {
        return Err(CheckError::TagMismatch { offset: current });
      }

      if allocated {
        previous_free = None;
      } else {
        if let Some(offset) = previous_free {
          return Err(CheckError::Uncoalesced { offset, next: current });
        }
        previous_free = Some(current);
        free.insert(current);
      }

      current += size;
    }

    self.check_classes(mem, free)
  }

  fn check_classes(
    &self,
    mem: &[u8],
    mut unlisted: HashSet<usize>,
  ) -> Result<(), CheckError> {
    for class in 0..NUM_CLASSES {
      let mut prev = None;

      for block in self.classes.iter(mem, class) {
        let offset = block.offset();
        if !unlisted.remove(&offset) {
          // Either allocated, not a block at all, or reached a second time.
          return Err(if block.block().is_allocated(mem) {
            CheckError::ListedAllocated { offset }
          } else {
            CheckError::BrokenLink { offset }
          });
        }

        let expected = class_of(block.size(mem));
        if expected != class {
          return Err(CheckError::WrongClass { offset, class, expected });
        }
        if block.prev_link(mem) != prev {
          return Err(CheckError::BrokenLink { offset });
        }
        prev = Some(block);
      }
    }

    match unlisted.into_iter().min() {
      Some(offset) => Err(CheckError::Unlisted { offset }),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{
    block::{pack, put, Block},
    config::HeapConfig,
    error::CheckError,
    heap::Heap,
    source::HeapSource,
  };

  fn heap() -> Heap {
    Heap::arena_with_config(HeapConfig::default().with_max_heap(1 << 16)).unwrap()
  }

  #[test]
  fn test_fresh_heap_is_consistent() {
    let heap = heap();
    assert_eq!(heap.check(), Ok(()));

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].allocated);
    assert_eq!(blocks[0].size, 4096);
  }

  #[test]
  fn test_stats() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();
    heap.allocate(30).unwrap();
    heap.release(a);

    let stats = heap.stats();
    assert_eq!(stats.allocated_blocks, 1);
    assert_eq!(stats.allocated_bytes, 40);
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.free_bytes, 4096 - 40);
    assert_eq!(stats.largest_free, 4096 - 40 - 112);
    assert_eq!(stats.heap_size, 16 + 4096);
  }

  #[test]
  fn test_detects_tag_mismatch() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();

    let footer = a.offset() + 112 - 8;
    put(heap.source.memory_mut(), footer, pack(104, true));
    assert_eq!(heap.check(), Err(CheckError::TagMismatch { offset: a.offset() }));
  }

  #[test]
  fn test_detects_unlisted_free_block() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();
    heap.allocate(100).unwrap();

    // Free behind the allocator's back.
    Block::at(a.offset()).mark_free(heap.source.memory_mut(), 112);
    assert_eq!(heap.check(), Err(CheckError::Unlisted { offset: a.offset() }));
  }

  #[test]
  fn test_detects_uncoalesced_neighbours() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();
    let b = heap.allocate(100).unwrap();
    heap.allocate(100).unwrap();
    heap.release(a);

    Block::at(b.offset()).mark_free(heap.source.memory_mut(), 112);
    assert_eq!(
      heap.check(),
      Err(CheckError::Uncoalesced {
        offset: a.offset(),
        next: b.offset(),
      })
    );
  }

  #[test]
  fn test_detects_listed_allocated_block() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();
    heap.allocate(100).unwrap();
    heap.release(a);

    Block::at(a.offset()).mark_allocated(heap.source.memory_mut(), 112);
    assert_eq!(heap.check(), Err(CheckError::ListedAllocated { offset: a.offset() }));
  }
}
