use crate::{
  block::MIN_BLOCK,
  error::{HeapError, Result},
  ALIGNMENT,
};

/// Default heap extension granularity.
pub const CHUNK_SIZE: usize = 1 << 12;
/// Default cap of a simulated arena.
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// Tunables of a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the source on an allocation miss.
  pub chunk_size: usize,
  /// Bytes requested by `init` right after the sentinels are written.
  pub initial_extension: usize,
  /// Upper bound on the region size for sources built from this config.
  pub max_heap: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      initial_extension: CHUNK_SIZE,
      max_heap: MAX_HEAP,
    }
  }
}

impl HeapConfig {
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn with_initial_extension(
    mut self,
    initial_extension: usize,
  ) -> Self {
    self.initial_extension = initial_extension;
    self
  }

  pub fn with_max_heap(
    mut self,
    max_heap: usize,
  ) -> Self {
    self.max_heap = max_heap;
    self
  }

  pub fn validate(&self) -> Result<()> {
    for size in [self.chunk_size, self.initial_extension] {
      if size % ALIGNMENT != 0 {
        return Err(HeapError::InvalidConfig("extension sizes must be multiples of 8"));
      }
      if size < MIN_BLOCK {
        return Err(HeapError::InvalidConfig("extension sizes must hold a minimum block"));
      }
    }
    if self.max_heap > u32::MAX as usize {
      return Err(HeapError::InvalidConfig("heap offsets must fit in 32 bits"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_valid() {
    let config = HeapConfig::default();
    assert_eq!(config.validate(), Ok(()));
    assert_eq!(config.chunk_size, 4096);
  }

  #[test]
  fn test_rejects_bad_sizes() {
    let unaligned = HeapConfig::default().with_chunk_size(4100);
    assert!(matches!(unaligned.validate(), Err(HeapError::InvalidConfig(_))));

    let tiny = HeapConfig::default().with_initial_extension(8);
    assert!(matches!(tiny.validate(), Err(HeapError::InvalidConfig(_))));

    let huge = HeapConfig::default().with_max_heap(usize::MAX);
    assert!(matches!(huge.validate(), Err(HeapError::InvalidConfig(_))));
  }

  #[test]
  fn test_builders() {
    let config = HeapConfig::default()
      .with_chunk_size(64)
      .with_initial_extension(16)
      .with_max_heap(1024);
    assert_eq!(
      config,
      HeapConfig {
        chunk_size: 64,
        initial_extension: 16,
        max_heap: 1024,
      }
    );
    assert_eq!(config.validate(), Ok(()));
  }
}
