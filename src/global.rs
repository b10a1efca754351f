//! Free-function entry points backed by one [`Allocator`] per thread.
//!
//! Each thread lazily gets its own instance, so no locking is involved. A
//! pointer must be freed on the thread that allocated it; freeing it elsewhere
//! is reported as an invalid free.

use std::cell::RefCell;

use crate::allocator::{Allocator, AllocatorStats};

thread_local! {
  static ALLOCATOR: RefCell<Allocator> = const { RefCell::new(Allocator::new()) };
}

/// Allocates at least `size` bytes from the calling thread's allocator.
///
/// Returns null for `size == 0` or when the OS refuses to map more memory, in
/// which case `errno` is set to `ENOMEM`.
pub fn allocate(
  size: usize,
) -> *mut u8 {
  ALLOCATOR.with_borrow_mut(|allocator| allocator.allocate(size))
}

/// Frees a pointer returned by [`allocate`].
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by [`allocate`] on this thread.
pub unsafe fn deallocate(
  ptr: *mut u8,
) {
  ALLOCATOR.with_borrow_mut(|allocator| unsafe { allocator.deallocate(ptr) })
}

/// Frees a pointer returned by [`allocate`] for exactly `size` bytes.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by `allocate(size)` on this
/// thread.
pub unsafe fn deallocate_sized(
  ptr: *mut u8,
  size: usize,
) {
  ALLOCATOR.with_borrow_mut(|allocator| unsafe { allocator.deallocate_sized(ptr, size) })
}

/// Stats of the calling thread's allocator.
pub fn stats() -> AllocatorStats {
  ALLOCATOR.with_borrow(|allocator| allocator.stats())
}
