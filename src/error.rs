use thiserror::Error;

/// Errors reported by heap setup, heap sources and the consistency checker.
///
/// Failed `allocate`/`resize` calls do not surface these: they return `None`,
/// matching the `malloc` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  /// The heap source could not provide `requested` more bytes.
  #[error("out of memory: could not extend the heap by {requested} bytes")]
  OutOfMemory { requested: usize },
  /// The program break moved between two extensions.
  #[error("heap region is no longer contiguous")]
  NonContiguous,
  #[error("invalid heap configuration: {0}")]
  InvalidConfig(&'static str),
  /// An operation that needs the sentinels ran before `init`.
  #[error("heap is not initialized")]
  Uninitialized,
  #[error("heap is corrupt: {0}")]
  Corrupt(#[from] CheckError),
}

/// A violated heap invariant, as found by [`Heap::check`](crate::Heap::check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckError {
  #[error("bad prologue block")]
  BadPrologue,
  #[error("bad epilogue block at {offset:#x}")]
  BadEpilogue { offset: usize },
  #[error("block at {offset:#x} is not 8-byte aligned")]
  Misaligned { offset: usize },
  #[error("block at {offset:#x} has size {size}, below the minimum block size")]
  TooSmall { offset: usize, size: usize },
  #[error("block at {offset:#x} overruns the heap")]
  Overrun { offset: usize },
  #[error("header and footer of block at {offset:#x} disagree")]
  TagMismatch { offset: usize },
  #[error("free blocks at {offset:#x} and {next:#x} were not coalesced")]
  Uncoalesced { offset: usize, next: usize },
  #[error("free block at {offset:#x} is not on any free list")]
  Unlisted { offset: usize },
  #[error("block at {offset:#x} is on a free list but allocated")]
  ListedAllocated { offset: usize },
  #[error("block at {offset:#x} is on free list {class} but belongs to {expected}")]
  WrongClass { offset: usize, class: usize, expected: usize },
  #[error("free list link at {offset:#x} is broken")]
  BrokenLink { offset: usize },
}

pub type Result<T> = core::result::Result<T, HeapError>;
