//! Smoke test of a heap living on the real program break.
//!
//! Kept to a single test so nothing else in this binary moves the break
//! while it runs.

use segalloc::{Heap, HeapSource, SbrkSource};

#[test]
fn test_sbrk_heap() {
  let mut heap = Heap::new(SbrkSource::new());
  heap.init().unwrap();
  assert_eq!(heap.source().len(), 16 + 4096);

  let a = heap.allocate(100).unwrap();
  let b = heap.allocate(200).unwrap();

  let raw = heap.as_mut_ptr(a);
  assert_eq!(raw as usize % 8, 0);
  unsafe { raw.write_bytes(0xAB, 100) };
  heap.payload_mut(b)[..200].fill(0xCD);

  assert!(heap.payload(a)[..100].iter().all(|&byte| byte == 0xAB));

  heap.release(a);
  let c = heap.resize(b, 1000).unwrap();
  assert_eq!(c, b);
  assert!(heap.payload(c)[..200].iter().all(|&byte| byte == 0xCD));
  assert_eq!(heap.check(), Ok(()));

  // Growth may be refused if something else moved the break meanwhile.
  match heap.allocate(64 * 1024) {
    Some(big) => {
      heap.payload_mut(big).fill(1);
      heap.release(big);
    }
    None => assert_eq!(heap.source().len(), 16 + 4096),
  }
  assert_eq!(heap.check(), Ok(()));

  heap.release(c);
  assert_eq!(heap.stats().allocated_blocks, 0);
  assert_eq!(heap.stats().free_blocks, 1);

  heap.init().unwrap();
  assert_eq!(heap.source().len(), 16 + 4096);
}
