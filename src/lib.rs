//! # segalloc - A Segregated Free-List Allocator
//!
//! This crate provides a classic `malloc`-style allocator built on
//! **boundary tags** and **segregated explicit free lists**, managing one
//! contiguous region that grows like the program break.
//!
//! ## Overview
//!
//! Every block carries its size in a header and a footer. Free blocks also
//! carry two links that thread them into one of ten size-class lists:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬──────────┬───────────┬────────────┬───────────┬──────────┐
//!   │ pad │ prologue │ allocated │    free    │ allocated │ epilogue │
//!   │     │  (8, a)  │  (48, a)  │  (208, f)  │  (32, a)  │  (0, a)  │
//!   └─────┴──────────┴───────────┴────────────┴───────────┴──────────┘
//!                                      ▲                              ▲
//!                                      │                              │
//!                              linked into class                Region end
//!                              "≤ 256" of the directory         (grows →)
//!
//!   Size-Class Directory:
//!
//!   ≤16  ≤32  ≤64  ≤128  ≤256  ≤512  ≤1024  ≤2048  ≤4096  >4096
//!    │    │    │    │     │
//!    ∅    ∅    ∅    ∅     └──▶ free(208) ──▶ ∅
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro (align!) and checked rounding
//!   ├── block      - Boundary-tag layout (internal)
//!   ├── classes    - Size-class directory
//!   ├── config     - HeapConfig
//!   ├── error      - HeapError, CheckError
//!   ├── heap       - Heap: init / allocate / release / resize
//!   ├── check      - Heap walk, consistency checker, statistics
//!   └── source     - HeapSource trait, ArenaSource, SbrkSource
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::Heap;
//!
//! let mut heap = Heap::arena().unwrap();
//!
//! let ptr = heap.allocate(64).unwrap();
//! heap.payload_mut(ptr)[..5].copy_from_slice(b"hello");
//!
//! // Grows in place when the next block is free.
//! let ptr = heap.resize(ptr, 256).unwrap();
//! assert_eq!(&heap.payload(ptr)[..5], b"hello");
//!
//! heap.release(ptr);
//! assert_eq!(heap.check(), Ok(()));
//! ```
//!
//! ## How It Works
//!
//! - **allocate**: the request plus 8 bytes of tags is rounded up to a
//!   multiple of 8 (at least 16). The matching size class and every larger
//!   one are searched first-fit. On a miss the heap grows by at least one
//!   4 KiB chunk. The chosen block is split when the tail can form a block
//!   of its own.
//! - **release**: the block is marked free and coalesced with free
//!   neighbours, found in O(1) through the boundary tags. The merged block
//!   is pushed onto the list of its class.
//! - **resize**: shrinks in place, grows in place by absorbing a free
//!   successor, and only otherwise moves the payload.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a `Heap` is a plain value, use one per thread
//!   or wrap it in a lock.
//! - **No validation**: releasing a pointer twice or one that did not come
//!   from the heap corrupts it. Debug builds assert on the obvious cases and
//!   [`Heap::check`] verifies the whole structure.
//! - **4 GiB**: sizes and links are stored in 32-bit words.
//! - **Never shrinks**: memory goes back to the source only on `init`.
//!
//! ## Safety
//!
//! The allocator itself works on offsets into a byte slice and is safe
//! code. [`SbrkSource`] is the only part that talks to the operating system.

pub mod align;
mod block;
mod check;
mod classes;
mod config;
mod error;
mod heap;
mod source;

pub use block::{DSIZE, MIN_BLOCK, WSIZE};
pub use check::{BlockInfo, Blocks, HeapStats};
pub use classes::{class_of, NUM_CLASSES};
pub use config::{HeapConfig, CHUNK_SIZE, MAX_HEAP};
pub use error::{CheckError, HeapError, Result};
pub use heap::{Heap, HeapPtr};
pub use source::{ArenaSource, HeapSource, SbrkSource};

/// Alignment of every block and payload.
pub const ALIGNMENT: usize = DSIZE;
