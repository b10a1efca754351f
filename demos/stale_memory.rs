use std::{io::Read, mem};

use vmalloc::{THRESHOLD, allocate, deallocate, deallocate_sized, stats};

/// Waits until the user presses ENTER when started with `--pause`.
/// Useful when you want to inspect the mappings with `pmap` or `/proc/<pid>/maps`
/// between steps.
fn block_until_enter_pressed(
  pause: bool,
) {
  if !pause {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_alloc(
  label: &str,
  size: usize,
  addr: *mut u8,
) {
  println!("[{}] allocate({}) = {:?}, {:?}", label, size, addr, stats());
}

fn main() {
  let pause = std::env::args().any(|arg| arg == "--pause");
  let int = mem::size_of::<i32>();

  println!("PID = {}", std::process::id());

  unsafe {
    // --------------------------------------------------------------------
    // 1) Four small blocks. a, c and d share the 16 byte class, b gets 32.
    // --------------------------------------------------------------------
    let mut a = allocate(int) as *mut i32;
    let mut b = allocate(32) as *mut i32;
    let mut c = allocate(int) as *mut i32;
    let mut d = allocate(int) as *mut i32;

    *a = 1;
    *b = 2;
    *c = 3;
    *d = 4;

    print_alloc("a", int, a as *mut u8);
    print_alloc("b", 32, b as *mut u8);
    print_alloc("c", int, c as *mut u8);
    print_alloc("d", int, d as *mut u8);

    block_until_enter_pressed(pause);

    // --------------------------------------------------------------------
    // 2) Free c and d, then allocate twice more. First fit hands the lowest
    //    free slot out first, so the new d lands where c was, and the old
    //    values are still sitting there.
    // --------------------------------------------------------------------
    let (old_c, old_d) = (c, d);
    deallocate(c as *mut u8);
    deallocate(d as *mut u8);

    d = allocate(int) as *mut i32;
    c = allocate(int) as *mut i32;

    println!("\n[2] stale memory: c = {}, d = {}", *c, *d);
    println!("[2] d reused old c slot? {}", d == old_c);
    println!("[2] c reused old d slot? {}", c == old_d);

    block_until_enter_pressed(pause);

    // --------------------------------------------------------------------
    // 3) One byte past the threshold goes to its own mapping.
    // --------------------------------------------------------------------
    let big_size = THRESHOLD + 1;

    deallocate(a as *mut u8);
    a = allocate(big_size) as *mut i32;
    print_alloc("3", big_size, a as *mut u8);
    *a = big_size as i32;
    deallocate_sized(a as *mut u8, big_size);

    a = allocate(int) as *mut i32;
    *a = 1;

    block_until_enter_pressed(pause);

    // --------------------------------------------------------------------
    // 4) Move b into a larger class.
    // --------------------------------------------------------------------
    deallocate(b as *mut u8);
    b = allocate(102) as *mut i32;
    *b = 102;
    print_alloc("4", 102, b as *mut u8);

    block_until_enter_pressed(pause);

    // --------------------------------------------------------------------
    // 5) Keep allocating from the 16 byte class. Once the first arena is
    //    full the chain grows instead of failing.
    // --------------------------------------------------------------------
    let mut extra = Vec::new();
    for i in 0..1024 {
      let foo = allocate(int) as *mut i32;

      if foo.is_null() {
        eprintln!("failed to allocate memory: {}", std::io::Error::last_os_error());
        break;
      }

      *foo = -i;
      extra.push(foo);
    }
    println!("\n[5] {} more blocks, {:?}", extra.len(), stats());

    println!("\na b c d: {} {} {} {}", *a, *b, *c, *d);

    for foo in extra {
      deallocate_sized(foo as *mut u8, int);
    }
    for ptr in [a, b, c, d] {
      deallocate(ptr as *mut u8);
    }

    println!("[6] after freeing everything: {:?}", stats());
  }
}
