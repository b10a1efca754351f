//! Anonymous virtual-memory mappings.

use std::ptr::{self, NonNull};

use libc::c_void;

use crate::error::AllocError;

/// Source of zero-filled, read-write memory mappings.
///
/// # Safety
///
/// `map` must return a fresh, zeroed region of at least `len` bytes aligned to a
/// page, that stays valid until passed to `unmap` with the same `len`.
pub unsafe trait VirtualMemory {
  fn map(
    &self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError>;

  /// # Safety
  ///
  /// `addr` and `len` must describe a whole region returned by `map`, which must
  /// not be touched afterwards.
  unsafe fn unmap(
    &self,
    addr: NonNull<u8>,
    len: usize,
  );
}

/// `mmap(2)` / `munmap(2)` backed mappings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mmap;

unsafe impl VirtualMemory for Mmap {
  fn map(
    &self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(AllocError::OutOfMemory { requested: len });
    }

    NonNull::new(addr as *mut u8).ok_or(AllocError::OutOfMemory { requested: len })
  }

  unsafe fn unmap(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    let result = unsafe { libc::munmap(addr.as_ptr() as *mut c_void, len) };

    if result != 0 {
      log::warn!("munmap({:p}, {}) failed: {}", addr, len, std::io::Error::last_os_error());
    }
  }
}
