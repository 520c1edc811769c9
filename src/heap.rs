use std::{cmp, num::NonZeroUsize};

use log::{debug, trace, warn};

use crate::{
  align::checked_align,
  block::{pack, put, Block, BlockState, FreeBlock, DSIZE, MIN_BLOCK, WSIZE},
  classes::{class_of, SizeClasses, NUM_CLASSES},
  config::HeapConfig,
  error::{HeapError, Result},
  source::{ArenaSource, HeapSource},
};

/// Payload offset of the prologue block.
pub(crate) const PROLOGUE: usize = DSIZE;
/// Offset of the first real block's payload.
pub(crate) const FIRST_BLOCK: usize = 2 * DSIZE;

/// Handle to an allocated payload: its byte offset inside the heap.
///
/// Offsets are never zero, so `Option<HeapPtr>` is a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(NonZeroUsize);

impl HeapPtr {
  #[inline]
  fn new(offset: usize) -> Option<Self> {
    NonZeroUsize::new(offset).map(Self)
  }

  /// Offset of the payload from the start of the heap region.
  #[inline]
  pub fn offset(self) -> usize {
    self.0.get()
  }

  #[inline]
  fn block(self) -> Block {
    Block::at(self.offset())
  }
}

/// A segregated free-list heap over a [`HeapSource`].
///
/// All allocator state lives here: the source holding the blocks, the
/// size-class list heads and the configuration. Nothing is global, so any
/// number of independent heaps can coexist.
pub struct Heap<S: HeapSource = ArenaSource> {
  pub(crate) source: S,
  pub(crate) classes: SizeClasses,
  config: HeapConfig,
  initialized: bool,
}

impl Heap<ArenaSource> {
  /// An initialized heap over a default-sized simulated arena.
  pub fn arena() -> Result<Self> {
    Self::arena_with_config(HeapConfig::default())
  }

  pub fn arena_with_config(config: HeapConfig) -> Result<Self> {
    let mut heap = Heap::with_config(ArenaSource::new(config.max_heap), config)?;
    heap.init()?;
    Ok(heap)
  }
}

impl<S: HeapSource> Heap<S> {
  /// Wraps `source` with the default configuration. Call [`Heap::init`]
  /// before anything else.
  pub fn new(source: S) -> Self {
    Self {
      source,
      classes: SizeClasses::new(),
      config: HeapConfig::default(),
      initialized: false,
    }
  }

  pub fn with_config(
    source: S,
    config: HeapConfig,
  ) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      config,
      ..Self::new(source)
    })
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Resets the heap: empties every size class, writes the prologue and
  /// epilogue sentinels and performs the initial extension.
  ///
  /// ```text
  ///   0      4          8          12         16
  ///   ┌──────┬──────────┬──────────┬──────────┐
  ///   │ pad  │ prologue │ prologue │ epilogue │
  ///   │      │ header   │ footer   │ header   │
  ///   └──────┴──────────┴──────────┴──────────┘
  /// ```
  pub fn init(&mut self) -> Result<()> {
    self.initialized = false;
    self.classes.clear();
    self.source.reset();

    let start = self.source.grow(2 * DSIZE)?;
    debug_assert_eq!(start, 0);

    let mem = self.source.memory_mut();
    put(mem, 0, 0);
    put(mem, PROLOGUE - WSIZE, pack(DSIZE, true));
    put(mem, PROLOGUE, pack(DSIZE, true));
    put(mem, FIRST_BLOCK - WSIZE, pack(0, true));
    self.initialized = true;

    self.extend(self.config.initial_extension)?;
    debug!("heap initialized with {} bytes", self.source.len());
    Ok(())
  }

  /// Allocates at least `size` bytes, 8-byte aligned.
  ///
  /// Returns `None` for zero-sized requests and when the source cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<HeapPtr> {
    if size == 0 {
      return None;
    }
    if !self.initialized {
      warn!("allocate({size}) on an uninitialized heap");
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!("allocate({size}) exceeds the heap word size");
      return None;
    };

    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => {
        let extend = cmp::max(asize, self.config.chunk_size);
        match self.extend(extend) {
          Ok(block) => block,
          Err(err) => {
            warn!("allocate({size}) failed: {err}");
            return None;
          }
        }
      }
    };

    let placed = self.place(block, asize);
    trace!("allocate({size}) -> {:#x}", placed.offset());
    HeapPtr::new(placed.offset())
  }

  /// Returns a block to the heap.
  ///
  /// `ptr` must come from this heap and still be allocated. That is not
  /// checked outside debug builds: a double free or a foreign pointer
  /// corrupts the heap.
  pub fn release(
    &mut self,
    ptr: HeapPtr,
  ) {
    let block = ptr.block();
    let mem = self.source.memory_mut();

    debug_assert!(block.is_allocated(mem), "release of a free block at {:#x}", ptr.offset());
    debug_assert_eq!(block.footer_tag(mem), (block.size(mem), true));

    let size = block.size(mem);
    let free = block.mark_free(mem, size);
    trace!("release({:#x}) of {size} bytes", ptr.offset());
    self.coalesce(free);
  }

  /// Changes the size of the allocation at `ptr`, moving it only when it
  /// cannot grow in place.
  ///
  /// - `size == 0` releases `ptr` and hands the now dead handle back.
  /// - Shrinking or growing within the block keeps `ptr`.
  /// - Growing into a free successor keeps `ptr`.
  /// - Otherwise the payload moves to a new block. If that allocation fails
  ///   the result is `None` and `ptr` is still allocated and intact.
  pub fn resize(
    &mut self,
    ptr: HeapPtr,
    size: usize,
  ) -> Option<HeapPtr> {
    if size == 0 {
      self.release(ptr);
      return Some(ptr);
    }

    let asize = adjusted_size(size)?;
    let block = ptr.block();
    let mem = self.source.memory();
    let current = block.size(mem);

    if asize <= current {
      trace!("resize({:#x}, {size}) fits in place", ptr.offset());
      self.carve(block, current, asize);
      return Some(ptr);
    }

    if let BlockState::Free(next) = block.next(mem).state(mem) {
      let combined = current + next.size(mem);
      if combined >= asize {
        trace!("resize({:#x}, {size}) absorbs {:#x}", ptr.offset(), next.offset());
        self.classes.remove(self.source.memory_mut(), next);
        self.carve(block, combined, asize);
        return Some(ptr);
      }
    }

    let old_capacity = block.capacity(mem);
    let moved = self.allocate(size)?;
    let len = cmp::min(size, old_capacity);
    self
      .source
      .memory_mut()
      .copy_within(ptr.offset()..ptr.offset() + len, moved.offset());
    self.release(ptr);

    trace!("resize({:#x}, {size}) moved to {:#x}", ptr.offset(), moved.offset());
    Some(moved)
  }

  /// Payload bytes available at `ptr`, which may exceed what was requested.
  pub fn usable_size(
    &self,
    ptr: HeapPtr,
  ) -> usize {
    ptr.block().capacity(self.source.memory())
  }

  pub fn payload(
    &self,
    ptr: HeapPtr,
  ) -> &[u8] {
    let mem = self.source.memory();
    let start = ptr.offset();
    &mem[start..start + ptr.block().capacity(mem)]
  }

  pub fn payload_mut(
    &mut self,
    ptr: HeapPtr,
  ) -> &mut [u8] {
    let start = ptr.offset();
    let capacity = ptr.block().capacity(self.source.memory());
    &mut self.source.memory_mut()[start..start + capacity]
  }

  /// Raw address of the payload. Stable for sources that never move their
  /// region; for an [`ArenaSource`] it is invalidated by the next extension.
  pub fn as_mut_ptr(
    &mut self,
    ptr: HeapPtr,
  ) -> *mut u8 {
    self.payload_mut(ptr).as_mut_ptr()
  }

  /// Grows the heap by `bytes` (rounded up to a double word) and returns
  /// the resulting free block, already merged and listed.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<FreeBlock> {
    if !self.initialized {
      return Err(HeapError::Uninitialized);
    }

    let size = checked_align(bytes).ok_or(HeapError::OutOfMemory { requested: bytes })?;
    let limit = u32::MAX as usize;
    if self.source.len().checked_add(size).is_none_or(|end| end > limit) {
      return Err(HeapError::OutOfMemory { requested: size });
    }

    // The new block's header overwrites the old epilogue.
    let bp = self.source.grow(size)?;
    let mem = self.source.memory_mut();
    let free = Block::at(bp).mark_free(mem, size);
    put(mem, bp + size - WSIZE, pack(0, true));

    debug!("heap extended by {size} bytes to {}", self.source.len());
    Ok(self.coalesce(free))
  }

  /// Merges `block` with free neighbours and lists the result.
  ///
  /// Every block that becomes free goes through here; it is the only place
  /// that inserts into the size classes.
  fn coalesce(
    &mut self,
    block: FreeBlock,
  ) -> FreeBlock {
    let mem = self.source.memory_mut();
    let prev = block.block().prev(mem).state(mem);
    let next = block.block().next(mem).state(mem);
    let mut size = block.size(mem);

    let merged = match (prev, next) {
      (BlockState::Allocated(_), BlockState::Allocated(_)) => block,
      (BlockState::Allocated(_), BlockState::Free(next)) => {
        size += next.size(mem);
        self.classes.remove(mem, next);
        block.block().mark_free(mem, size)
      }
      (BlockState::Free(prev), BlockState::Allocated(_)) => {
        size += prev.size(mem);
        self.classes.remove(mem, prev);
        prev.block().mark_free(mem, size)
      }
      (BlockState::Free(prev), BlockState::Free(next)) => {
        size += prev.size(mem) + next.size(mem);
        self.classes.remove(mem, prev);
        self.classes.remove(mem, next);
        prev.block().mark_free(mem, size)
      }
    };

    self.classes.insert(mem, merged);
    merged
  }

  /// First fit, starting at the class of `asize` and escalating.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<FreeBlock> {
    let mem = self.source.memory();
    (class_of(asize)..NUM_CLASSES)
      .find_map(|class| self.classes.iter(mem, class).find(|block| block.size(mem) >= asize))
  }

  /// Takes `block` off its list and allocates its first `asize` bytes.
  fn place(
    &mut self,
    block: FreeBlock,
    asize: usize,
  ) -> Block {
    let mem = self.source.memory_mut();
    let size = block.size(mem);
    self.classes.remove(mem, block);
    self.carve(block.block(), size, asize);
    block.block()
  }

  /// Marks the first `asize` of `total` bytes at `block` allocated, giving
  /// the tail back as a free block when it can stand on its own.
  fn carve(
    &mut self,
    block: Block,
    total: usize,
    asize: usize,
  ) {
    let mem = self.source.memory_mut();

    if total - asize >= MIN_BLOCK {
      block.mark_allocated(mem, asize);
      let rest = Block::at(block.offset() + asize).mark_free(mem, total - asize);
      self.coalesce(rest);
    } else {
      block.mark_allocated(mem, total);
    }
  }
}

/// Block size needed for a `size`-byte payload: payload plus both tags,
/// aligned, and never below the minimum block.
pub(crate) fn adjusted_size(size: usize) -> Option<usize> {
  let asize = checked_align(size.checked_add(DSIZE)?)?;
  (asize <= u32::MAX as usize).then_some(cmp::max(asize, MIN_BLOCK))
}
