//! In-band block layout.
//!
//! A block is addressed by the offset of its payload (`bp`). The size word
//! sits one word before it and a copy of it, the footer, ends the block:
//!
//! ```text
//!   bp - 4    bp                                  bp + size - 8
//!   ┌────────┬────────────────────────────────────┬────────┐
//!   │ header │ payload (free: prev link, next link)│ footer │
//!   └────────┴────────────────────────────────────┴────────┘
//!   size | allocated bit, duplicated in both tags
//! ```
//!
//! All reads and writes go through the heap's byte slice, so a corrupted
//! size word panics on slice bounds instead of reaching foreign memory.

/// Size of one tag or link word.
pub const WSIZE: usize = 4;
/// Double word: the alignment and the per-block metadata overhead.
pub const DSIZE: usize = 8;
/// Smallest block able to hold both tags and both free-list links.
pub const MIN_BLOCK: usize = 2 * DSIZE;

const ALLOCATED: u32 = 0x1;
const FLAGS: u32 = 0x7;
/// Link value meaning "no block". Offset 0 is the alignment pad, never a payload.
const NIL: u32 = 0;

#[inline]
pub(crate) fn pack(
  size: usize,
  allocated: bool,
) -> u32 {
  debug_assert!(size % DSIZE == 0);
  size as u32 | if allocated { ALLOCATED } else { 0 }
}

#[inline]
pub(crate) fn get(
  mem: &[u8],
  at: usize,
) -> u32 {
  let mut word = [0u8; WSIZE];
  word.copy_from_slice(&mem[at..at + WSIZE]);
  u32::from_ne_bytes(word)
}

#[inline]
pub(crate) fn put(
  mem: &mut [u8],
  at: usize,
  value: u32,
) {
  mem[at..at + WSIZE].copy_from_slice(&value.to_ne_bytes());
}

#[inline]
fn tag_size(tag: u32) -> usize {
  (tag & !FLAGS) as usize
}

#[inline]
fn tag_allocated(tag: u32) -> bool {
  tag & ALLOCATED != 0
}

/// Handle to a block, identified by its payload offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

/// A block seen through its allocated bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
  Allocated(Block),
  Free(FreeBlock),
}

impl Block {
  #[inline]
  pub fn at(bp: usize) -> Self {
    Self(bp)
  }

  #[inline]
  pub fn offset(self) -> usize {
    self.0
  }

  #[inline]
  pub fn header(self) -> usize {
    self.0 - WSIZE
  }

  #[inline]
  pub fn footer(
    self,
    mem: &[u8],
  ) -> usize {
    self.0 + self.size(mem) - DSIZE
  }

  #[inline]
  pub fn size(
    self,
    mem: &[u8],
  ) -> usize {
    tag_size(get(mem, self.header()))
  }

  #[inline]
  pub fn is_allocated(
    self,
    mem: &[u8],
  ) -> bool {
    tag_allocated(get(mem, self.header()))
  }

  /// Bytes the caller may use.
  #[inline]
  pub fn capacity(
    self,
    mem: &[u8],
  ) -> usize {
    self.size(mem) - DSIZE
  }

  #[inline]
  pub fn next(
    self,
    mem: &[u8],
  ) -> Block {
    Block(self.0 + self.size(mem))
  }

  /// Walks back through the predecessor's footer.
  #[inline]
  pub fn prev(
    self,
    mem: &[u8],
  ) -> Block {
    Block(self.0 - tag_size(get(mem, self.0 - DSIZE)))
  }

  /// The raw footer word, for consistency checks.
  #[inline]
  pub fn footer_tag(
    self,
    mem: &[u8],
  ) -> (usize, bool) {
    let tag = get(mem, self.footer(mem));
    (tag_size(tag), tag_allocated(tag))
  }

  /// Writes header and footer.
  pub fn set_tags(
    self,
    mem: &mut [u8],
    size: usize,
    allocated: bool,
  ) {
    let tag = pack(size, allocated);
    put(mem, self.header(), tag);
    put(mem, self.0 + size - DSIZE, tag);
  }

  /// Marks the block allocated with the given extent.
  pub fn mark_allocated(
    self,
    mem: &mut [u8],
    size: usize,
  ) -> Block {
    self.set_tags(mem, size, true);
    self
  }

  /// Marks the block free with the given extent. Links are left as garbage
  /// until the block is pushed onto a list.
  pub fn mark_free(
    self,
    mem: &mut [u8],
    size: usize,
  ) -> FreeBlock {
    self.set_tags(mem, size, false);
    FreeBlock(self)
  }

  pub fn state(
    self,
    mem: &[u8],
  ) -> BlockState {
    if self.is_allocated(mem) {
      BlockState::Allocated(self)
    } else {
      BlockState::Free(FreeBlock(self))
    }
  }
}

/// A block whose allocated bit is clear. Only this view exposes the
/// free-list links overlaid on the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct FreeBlock(Block);

impl FreeBlock {
  #[inline]
  pub fn block(self) -> Block {
    self.0
  }

  #[inline]
  pub fn offset(self) -> usize {
    self.0.offset()
  }

  #[inline]
  pub fn size(
    self,
    mem: &[u8],
  ) -> usize {
    self.0.size(mem)
  }

  #[inline]
  pub fn prev_link(
    self,
    mem: &[u8],
  ) -> Option<FreeBlock> {
    decode(get(mem, self.offset()))
  }

  #[inline]
  pub fn next_link(
    self,
    mem: &[u8],
  ) -> Option<FreeBlock> {
    decode(get(mem, self.offset() + WSIZE))
  }

  #[inline]
  pub fn set_prev_link(
    self,
    mem: &mut [u8],
    prev: Option<FreeBlock>,
  ) {
    put(mem, self.offset(), encode(prev));
  }

  #[inline]
  pub fn set_next_link(
    self,
    mem: &mut [u8],
    next: Option<FreeBlock>,
  ) {
    put(mem, self.offset() + WSIZE, encode(next));
  }
}

#[inline]
fn encode(link: Option<FreeBlock>) -> u32 {
  link.map_or(NIL, |block| block.offset() as u32)
}

#[inline]
fn decode(link: u32) -> Option<FreeBlock> {
  (link != NIL).then(|| FreeBlock(Block(link as usize)))
}

#[cfg(test)]
mod tests {
  use super::*;

  /// pad | prologue | 32-byte free | 16-byte allocated | epilogue
  fn sample() -> Vec<u8> {
    let mut mem = vec![0u8; 64];
    put(&mut mem, 4, pack(DSIZE, true));
    put(&mut mem, 8, pack(DSIZE, true));
    Block::at(16).mark_free(&mut mem, 32);
    Block::at(48).mark_allocated(&mut mem, 16);
    put(&mut mem, 60, pack(0, true));
    mem
  }

  #[test]
  fn test_pack_keeps_flags_out_of_size() {
    let tag = pack(4096, true);
    assert_eq!(tag_size(tag), 4096);
    assert!(tag_allocated(tag));
    assert!(!tag_allocated(pack(24, false)));
  }

  #[test]
  fn test_navigation() {
    let mem = sample();
    let free = Block::at(16);

    assert_eq!(free.size(&mem), 32);
    assert!(!free.is_allocated(&mem));
    assert_eq!(free.header(), 12);
    assert_eq!(free.footer(&mem), 40);
    assert_eq!(free.capacity(&mem), 24);

    let used = free.next(&mem);
    assert_eq!(used, Block::at(48));
    assert!(used.is_allocated(&mem));
    assert_eq!(used.prev(&mem), free);

    let prologue = free.prev(&mem);
    assert_eq!(prologue, Block::at(8));
    assert!(prologue.is_allocated(&mem));

    let epilogue = used.next(&mem);
    assert_eq!(epilogue.offset(), 64);
    assert_eq!(epilogue.size(&mem), 0);
    assert!(epilogue.is_allocated(&mem));
  }

  #[test]
  fn test_footer_mirrors_header() {
    let mem = sample();
    assert_eq!(Block::at(16).footer_tag(&mem), (32, false));
    assert_eq!(Block::at(48).footer_tag(&mem), (16, true));
  }

  #[test]
  fn test_links_only_through_free_view() {
    let mut mem = sample();
    let BlockState::Free(free) = Block::at(16).state(&mem) else {
      panic!("block at 16 should be free");
    };
    free.set_prev_link(&mut mem, None);
    free.set_next_link(&mut mem, Some(free));
    assert_eq!(free.prev_link(&mem), None);
    assert_eq!(free.next_link(&mem), Some(free));

    // Links live in the payload and leave the tags alone.
    assert_eq!(free.size(&mem), 32);
    assert_eq!(Block::at(16).footer_tag(&mem), (32, false));
  }

  #[test]
  fn test_state() {
    let mem = sample();
    assert!(matches!(Block::at(16).state(&mem), BlockState::Free(_)));
    assert!(matches!(Block::at(48).state(&mem), BlockState::Allocated(_)));
  }
}
