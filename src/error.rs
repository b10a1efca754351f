use thiserror::Error;

/// Failures reported by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The OS declined a mapping request.
  #[error("out of memory: failed to map {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The address is neither an arena slot nor a large allocation.
  #[error("invalid free of {addr:#x}")]
  InvalidFree { addr: usize },

  /// The slot at this address is not currently allocated.
  #[error("double free of {addr:#x}")]
  DoubleFree { addr: usize },

  /// `deallocate_sized` got a size the allocation was not made with.
  #[error("size {size} does not match the allocation at {addr:#x}")]
  MisreportedSize { addr: usize, size: usize },
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn errno_location() -> Option<*mut libc::c_int> {
  Some(unsafe { libc::__errno_location() })
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn errno_location() -> Option<*mut libc::c_int> {
  Some(unsafe { libc::__error() })
}

#[cfg(not(any(
  target_os = "linux",
  target_os = "android",
  target_os = "macos",
  target_os = "ios",
  target_os = "freebsd"
)))]
fn errno_location() -> Option<*mut libc::c_int> {
  None
}

/// Sets the calling thread's `errno`.
pub(crate) fn set_errno(
  code: libc::c_int,
) {
  if let Some(errno) = errno_location() {
    unsafe { *errno = code };
  }
}
