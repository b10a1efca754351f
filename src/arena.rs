//! Arenas: one mapping per arena, sliced into equal slots of a single size class.
//!
//! The [`Arena`] header lives at the start of its own mapping, followed by the
//! data region. Arenas of the same class form a singly-linked chain through
//! `next`; a new arena is only appended once the tail's bitmap is full.

use std::ptr::{self, NonNull};

use crate::{
  bitmap::SlotBitmap,
  config::ArenaGeometry,
  error::AllocError,
  os::VirtualMemory,
  size_class::SizeClass,
};

const ARENA_MAGIC: u64 = 0x5641_4d41_4c4c_4f43;

#[repr(C)]
pub struct Arena {
  magic: u64,
  class: SizeClass,
  capacity: usize,
  mapping_len: usize,
  base: NonNull<u8>,
  data: NonNull<u8>,
  next: Option<NonNull<Arena>>,
  bitmap: SlotBitmap,
}

impl Arena {
  /// Maps a fresh arena for `class` with every slot free.
  pub fn create<V: VirtualMemory>(
    memory: &V,
    class: SizeClass,
  ) -> Result<NonNull<Arena>, AllocError> {
    let geometry = ArenaGeometry::for_class(class.bytes());
    let base = memory.map(geometry.mapping_len)?;

    let arena = base.cast::<Arena>();
    unsafe {
      ptr::write(
        arena.as_ptr(),
        Arena {
          magic: ARENA_MAGIC,
          class,
          capacity: geometry.capacity,
          mapping_len: geometry.mapping_len,
          base,
          data: base.add(geometry.data_offset),
          next: None,
          bitmap: SlotBitmap::new(),
        },
      );
    }

    log::debug!(
      "new arena {:p}, class {}, {} slots, {} bytes mapped",
      base,
      class,
      geometry.capacity,
      geometry.mapping_len
    );

    Ok(arena)
  }

  /// Appends a new arena of the same class after the full arena `tail`.
  ///
  /// # Safety
  ///
  /// `tail` must point to a live arena with no successor.
  pub unsafe fn grow_chain<V: VirtualMemory>(
    mut tail: NonNull<Arena>,
    memory: &V,
  ) -> Result<NonNull<Arena>, AllocError> {
    let tail = unsafe { tail.as_mut() };

    debug_assert!(tail.is_full());
    debug_assert!(tail.next.is_none());

    let arena = Arena::create(memory, tail.class)?;
    tail.next = Some(arena);

    log::debug!("grew class {} chain: {:p} -> {:p}", tail.class, tail.base, arena);

    Ok(arena)
  }

  /// Returns the arena's mapping to the OS.
  ///
  /// # Safety
  ///
  /// `arena` must be live and no slot pointer into it may be used afterwards.
  pub unsafe fn destroy<V: VirtualMemory>(
    arena: NonNull<Arena>,
    memory: &V,
  ) {
    let (base, len) = unsafe {
      let arena = arena.as_ref();
      (arena.base, arena.mapping_len)
    };

    unsafe { memory.unmap(base, len) };
  }

  pub fn is_valid(&self) -> bool {
    self.magic == ARENA_MAGIC
  }

  pub fn class(&self) -> SizeClass {
    self.class
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn next(&self) -> Option<NonNull<Arena>> {
    self.next
  }

  pub fn data_base(&self) -> NonNull<u8> {
    self.data
  }

  pub fn live_slots(&self) -> usize {
    self.bitmap.count_set()
  }

  pub fn is_full(&self) -> bool {
    self.bitmap.find_first_free(self.capacity).is_none()
  }

  /// Whether `addr` falls inside `[data_base, data_base + capacity * class)`.
  pub fn contains(
    &self,
    addr: usize,
  ) -> bool {
    let begin = self.data.as_ptr() as usize;
    let end = begin + self.capacity * self.class.bytes();

    addr >= begin && addr < end
  }

  /// Whether `addr` is the start of a slot that is currently handed out.
  pub fn is_allocated(
    &self,
    addr: usize,
  ) -> bool {
    debug_assert!(self.contains(addr));

    let offset = addr - self.data.as_ptr() as usize;
    offset % self.class.bytes() == 0 && self.bitmap.test(offset / self.class.bytes())
  }

  /// Hands out the lowest free slot, or `None` when the arena is full.
  pub fn take_slot(&mut self) -> Option<NonNull<u8>> {
    let slot = self.bitmap.find_first_free(self.capacity)?;
    self.bitmap.set(slot);

    log::trace!("+ allocating {} in slot {}", self.class, slot);

    Some(unsafe { self.data.add(slot * self.class.bytes()) })
  }

  /// Frees the slot at `addr`, which must be inside this arena.
  pub fn release(
    &mut self,
    addr: usize,
  ) -> Result<usize, AllocError> {
    debug_assert!(self.contains(addr));

    let offset = addr - self.data.as_ptr() as usize;
    if offset % self.class.bytes() != 0 {
      return Err(AllocError::InvalidFree { addr });
    }

    let slot = offset / self.class.bytes();
    if !self.bitmap.test(slot) {
      return Err(AllocError::DoubleFree { addr });
    }

    self.bitmap.clear(slot);

    log::trace!("- deallocating {} in slot {}", self.class, slot);

    Ok(slot)
  }
}
