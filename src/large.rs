//! Direct mappings for requests above the arena threshold.
//!
//! ```text
//!   ┌──────────────────────────┬──────────────────────────────┐
//!   │   LargeHeader            │        User Data             │
//!   │  magic, mapped_len       │     size bytes usable        │
//!   │  prev, next ◄──► others  │                              │
//!   └──────────────────────────┴──────────────────────────────┘
//!   ▲                          ▲
//!   mapping base               └── Pointer returned to user
//! ```
//!
//! Live mappings are linked through their headers, so a free can check that a
//! pointer belongs to this list before anything behind it is read or unmapped.

use std::{
  mem,
  ptr::{self, NonNull},
};

use crate::{error::AllocError, os::VirtualMemory};

const LARGE_MAGIC: u64 = 0x4c41_5247_4542_4c4b;

#[repr(C, align(16))]
pub struct LargeHeader {
  magic: u64,
  /// Header plus payload, exactly as passed to `map`.
  mapped_len: usize,
  prev: Option<NonNull<LargeHeader>>,
  next: Option<NonNull<LargeHeader>>,
}

pub const HEADER_SIZE: usize = mem::size_of::<LargeHeader>();

/// Every large allocation one allocator currently has outstanding.
pub struct LargeList {
  head: Option<NonNull<LargeHeader>>,
  len: usize,
  bytes: usize,
}

impl LargeList {
  pub const fn new() -> Self {
    Self {
      head: None,
      len: 0,
      bytes: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Payload bytes across the list.
  pub fn bytes(&self) -> usize {
    self.bytes
  }

  /// Maps `size + HEADER_SIZE` bytes, links the mapping in and returns the
  /// address past the header.
  pub fn allocate<V: VirtualMemory>(
    &mut self,
    memory: &V,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let mapped_len = size
      .checked_add(HEADER_SIZE)
      .ok_or(AllocError::OutOfMemory { requested: size })?;

    let base = memory.map(mapped_len)?;
    let header = base.cast::<LargeHeader>();

    unsafe {
      ptr::write(
        header.as_ptr(),
        LargeHeader {
          magic: LARGE_MAGIC,
          mapped_len,
          prev: None,
          next: self.head,
        },
      );

      if let Some(mut old_head) = self.head {
        old_head.as_mut().prev = Some(header);
      }
    }

    self.head = Some(header);
    self.len += 1;
    self.bytes += size;

    log::trace!("+ large allocation of {} at {:p}", size, base);

    Ok(unsafe { base.add(HEADER_SIZE) })
  }

  /// Header of the live allocation whose payload starts at `ptr`.
  ///
  /// Only addresses are compared, so a foreign `ptr` is never dereferenced.
  fn find(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<NonNull<LargeHeader>> {
    let wanted = (ptr.as_ptr() as usize).wrapping_sub(HEADER_SIZE);
    let mut current = self.head;

    while let Some(header) = current {
      if header.as_ptr() as usize == wanted {
        debug_assert_eq!(unsafe { header.as_ref().magic }, LARGE_MAGIC);
        return Some(header);
      }
      current = unsafe { header.as_ref().next };
    }

    None
  }

  /// Usable bytes behind a live large allocation.
  pub fn payload_len(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<usize> {
    self
      .find(ptr)
      .map(|header| unsafe { header.as_ref().mapped_len } - HEADER_SIZE)
  }

  /// Unlinks and unmaps the whole mapping behind `ptr`, header included.
  ///
  /// A pointer that is not in the list is an `InvalidFree`. When
  /// `expected_size` is given it must match the size the allocation was made
  /// with. Returns the payload length that was released.
  pub fn deallocate<V: VirtualMemory>(
    &mut self,
    memory: &V,
    ptr: NonNull<u8>,
    expected_size: Option<usize>,
  ) -> Result<usize, AllocError> {
    let addr = ptr.as_ptr() as usize;
    let mut header = self.find(ptr).ok_or(AllocError::InvalidFree { addr })?;

    let (size, mapped_len, prev, next) = {
      let header = unsafe { header.as_mut() };
      (header.mapped_len - HEADER_SIZE, header.mapped_len, header.prev, header.next)
    };

    if let Some(expected) = expected_size
      && expected != size
    {
      return Err(AllocError::MisreportedSize {
        addr,
        size: expected,
      });
    }

    unsafe {
      match prev {
        Some(mut prev) => prev.as_mut().next = next,
        None => self.head = next,
      }
      if let Some(mut next) = next {
        next.as_mut().prev = prev;
      }

      header.as_mut().magic = 0;
    }

    self.len -= 1;
    self.bytes -= size;

    log::trace!("- large deallocation of {} at {:p}", size, ptr);

    unsafe { memory.unmap(header.cast::<u8>(), mapped_len) };

    Ok(size)
  }
}
