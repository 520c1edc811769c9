use std::io::Read;

use segalloc::{Heap, HeapPtr, HeapSource, SbrkSource};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkSource::program_break(),
  );
}

fn print_alloc(
  heap: &mut Heap<SbrkSource>,
  requested: usize,
  ptr: HeapPtr,
) {
  println!(
    "Allocated {} bytes ({} usable), offset = {:#x}, address = {:?}, program break = {:?}",
    requested,
    heap.usable_size(ptr),
    ptr.offset(),
    heap.as_mut_ptr(ptr),
    SbrkSource::program_break(),
  );
}

fn print_heap(heap: &Heap<SbrkSource>) {
  for block in heap.blocks() {
    println!(
      "    {:#06x}  {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
  println!("    {:?}", heap.stats());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  pretty_env_logger::init();

  print_program_break("start");
  block_until_enter_pressed();

  let mut heap = Heap::new(SbrkSource::new());
  heap.init()?;
  println!("\n[0] Heap initialized, {} bytes from sbrk", heap.source().len());
  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three small neighbours out of the first chunk.
  // --------------------------------------------------------------------
  let a = heap.allocate(16).ok_or("out of memory")?;
  let b = heap.allocate(16).ok_or("out of memory")?;
  let c = heap.allocate(16).ok_or("out of memory")?;
  println!("\n[1] Allocate three 16-byte blocks");
  for ptr in [a, b, c] {
    print_alloc(&mut heap, 16, ptr);
  }
  heap.payload_mut(c)[..4].copy_from_slice(&0xDEADBEEFu32.to_ne_bytes());
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release b then a: the two slots coalesce into one free block,
  //    large enough for a request neither could serve alone.
  // --------------------------------------------------------------------
  heap.release(b);
  heap.release(a);
  println!("\n[2] Released b and a");
  print_heap(&heap);

  let merged = heap.allocate(40).ok_or("out of memory")?;
  println!(
    "[2] allocate(40) -> {:#x}, reused the merged slot? {}",
    merged.offset(),
    if merged == a { "Yes" } else { "No" }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) c is followed by the free tail of the chunk, so it grows in place.
  // --------------------------------------------------------------------
  let grown = heap.resize(c, 1000).ok_or("out of memory")?;
  println!(
    "\n[3] resize(c, 16 -> 1000) -> {:#x}, in place? {}",
    grown.offset(),
    grown == c
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A large block forces the heap to grow.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = heap.allocate(64 * 1024).ok_or("out of memory")?;
  println!("\n[4] Allocate large 64 KiB block");
  print_alloc(&mut heap, 64 * 1024, big);
  print_program_break("after large alloc");
  print_heap(&heap);

  let value = u32::from_ne_bytes(heap.payload(grown)[..4].try_into()?);
  println!("[4] c still holds 0x{:X}", value);
  block_until_enter_pressed();

  heap.release(big);
  heap.release(grown);
  heap.release(merged);
  heap.check()?;
  println!("\n[5] Everything released, heap is one free block again:");
  print_heap(&heap);

  // --------------------------------------------------------------------
  // 6) init gives the memory back to the OS when nobody else moved the break.
  // --------------------------------------------------------------------
  heap.init()?;
  print_program_break("after re-init");
  println!("\n[6] End of example.");
  Ok(())
}
