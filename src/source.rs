//! Where heap memory comes from.
//!
//! A [`HeapSource`] behaves like `brk`: it hands out one contiguous region
//! that only grows at its high end and never moves what it already returned,
//! at least not in terms of offsets.

use std::{ptr, slice};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, warn};

use crate::error::{HeapError, Result};

/// A brk-like region the heap is laid out in.
pub trait HeapSource {
  /// Extends the region by `bytes` and returns the offset of the old end.
  ///
  /// Either the whole extension succeeds or nothing changes.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize>;

  /// Drops the whole region.
  fn reset(&mut self);

  /// Current region size.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];
}

/// A simulated break over a `Vec<u8>`, capped at `max_heap` bytes.
#[derive(Debug, Clone)]
pub struct ArenaSource {
  bytes: Vec<u8>,
  max_heap: usize,
}

impl ArenaSource {
  pub fn new(max_heap: usize) -> Self {
    Self {
      bytes: Vec::new(),
      max_heap,
    }
  }

  pub fn max_heap(&self) -> usize {
    self.max_heap
  }
}

impl HeapSource for ArenaSource {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let old_end = self.bytes.len();

    match old_end.checked_add(bytes) {
      Some(new_end) if new_end <= self.max_heap => {
        self.bytes.resize(new_end, 0);
        Ok(old_end)
      }
      _ => Err(HeapError::OutOfMemory { requested: bytes }),
    }
  }

  fn reset(&mut self) {
    self.bytes.clear();
  }

  fn len(&self) -> usize {
    self.bytes.len()
  }

  fn memory(&self) -> &[u8] {
    &self.bytes
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

/// The process data segment, extended with `sbrk(2)`.
///
/// The break is process-global: other code moving it between two extensions
/// makes the region non-contiguous, which is reported rather than papered
/// over. Keep at most one of these alive.
#[derive(Debug)]
pub struct SbrkSource {
  base: *mut u8,
  len: usize,
}

impl SbrkSource {
  pub fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      len: 0,
    }
  }

  /// Current program break.
  pub fn program_break() -> *mut c_void {
    unsafe { sbrk(0) }
  }

  fn end(&self) -> *mut u8 {
    self.base.wrapping_add(self.len)
  }
}

impl Default for SbrkSource {
  fn default() -> Self {
    Self::new()
  }
}

fn sbrk_failed(address: *mut c_void) -> bool {
  address == usize::MAX as *mut c_void
}

impl HeapSource for SbrkSource {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let increment = intptr_t::try_from(bytes).map_err(|_| HeapError::OutOfMemory { requested: bytes })?;

    if self.base.is_null() {
      // First extension: pad the break up to the allocator's alignment.
      let current = Self::program_break() as usize;
      let padding = crate::align!(current) - current;
      let total = increment
        .checked_add(padding as intptr_t)
        .ok_or(HeapError::OutOfMemory { requested: bytes })?;

      let address = unsafe { sbrk(total) };
      if sbrk_failed(address) {
        warn!("sbrk({total}) failed");
        return Err(HeapError::OutOfMemory { requested: bytes });
      }

      self.base = (address as *mut u8).wrapping_add(padding);
      self.len = bytes;
      debug!("sbrk heap starts at {:?}", self.base);
      return Ok(0);
    }

    let address = unsafe { sbrk(increment) };
    if sbrk_failed(address) {
      warn!("sbrk({increment}) failed");
      return Err(HeapError::OutOfMemory { requested: bytes });
    }

    if address as *mut u8 != self.end() {
      warn!("program break moved from {:?} to {:?} behind the heap", self.end(), address);
      // Hand the stray extension back if nobody moved the break since.
      if Self::program_break() as *mut u8 == (address as *mut u8).wrapping_add(bytes) {
        unsafe { sbrk(-increment) };
      }
      return Err(HeapError::NonContiguous);
    }

    let old_end = self.len;
    self.len += bytes;
    Ok(old_end)
  }

  fn reset(&mut self) {
    if self.base.is_null() {
      return;
    }

    // Only shrink when the heap still ends at the break.
    if Self::program_break() as *mut u8 == self.end() {
      unsafe { sbrk(-(self.len as intptr_t)) };
    }

    self.base = ptr::null_mut();
    self.len = 0;
  }

  fn len(&self) -> usize {
    self.len
  }

  fn memory(&self) -> &[u8] {
    if self.base.is_null() {
      return &[];
    }
    // SAFETY: `base..base + len` was handed to us by sbrk and is only
    // released by `reset`, which requires `&mut self`.
    unsafe { slice::from_raw_parts(self.base, self.len) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    if self.base.is_null() {
      return &mut [];
    }
    // SAFETY: as in `memory`; `&mut self` makes the borrow exclusive.
    unsafe { slice::from_raw_parts_mut(self.base, self.len) }
  }
}
