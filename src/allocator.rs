use std::{fmt, ptr, ptr::NonNull};

use crate::{
  arena::Arena,
  config::{CLASS_COUNT, THRESHOLD},
  error::{AllocError, set_errno},
  large::LargeList,
  os::{Mmap, VirtualMemory},
  size_class::SizeClass,
};

/// Snapshot of what an [`Allocator`] currently holds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
  /// Arenas mapped across every chain.
  pub arenas: usize,
  /// Slots handed out and not yet freed.
  pub live_slots: usize,
  /// Outstanding direct mappings.
  pub live_large: usize,
  /// Payload bytes behind `live_large`.
  pub large_bytes: usize,
}

/// Walks a chain from its head, following the `next` links.
struct Chain {
  next: Option<NonNull<Arena>>,
}

impl Iterator for Chain {
  type Item = NonNull<Arena>;

  fn next(&mut self) -> Option<Self::Item> {
    let arena = self.next?;
    let current = unsafe { arena.as_ref() };

    debug_assert!(current.is_valid());
    self.next = current.next();

    Some(arena)
  }
}

/// Size-class allocator over anonymous mappings.
///
/// Requests up to [`THRESHOLD`] bytes are rounded to a power-of-two class and
/// served from per-class arena chains; larger ones get their own mapping.
///
/// ```text
///   chains[0]  16B ──► ┌───────┐    ┌───────┐
///                      │ arena │───►│ arena │
///                      └───────┘    └───────┘
///   chains[1]  32B ──► ┌───────┐
///                      │ arena │
///                      └───────┘
///   chains[2]  64B ──► (empty)
///   ...
///   chains[16] 1MiB ─► (empty)
/// ```
///
/// An `Allocator` is not thread-safe and is neither `Send` nor `Sync`. Slot
/// pointers must not outlive it: dropping the allocator unmaps its arenas.
pub struct Allocator<V: VirtualMemory = Mmap> {
  memory: V,
  chains: [Option<NonNull<Arena>>; CLASS_COUNT],
  /// Arena that served the latest allocation of each class.
  recent: [Option<NonNull<Arena>>; CLASS_COUNT],
  large: LargeList,
  last_error: Option<AllocError>,
}

impl Allocator<Mmap> {
  pub const fn new() -> Self {
    Self::with_memory(Mmap)
  }
}

impl Default for Allocator<Mmap> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: VirtualMemory> Allocator<V> {
  pub const fn with_memory(
    memory: V,
  ) -> Self {
    Self {
      memory,
      chains: [None; CLASS_COUNT],
      recent: [None; CLASS_COUNT],
      large: LargeList::new(),
      last_error: None,
    }
  }

  /// Allocates at least `size` bytes.
  ///
  /// Returns `Ok(None)` for a zero-byte request.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    if size <= THRESHOLD {
      self.allocate_small(size).map(Some)
    } else {
      self.large.allocate(&self.memory, size).map(Some)
    }
  }

  /// Allocates at least `size` bytes, or returns null.
  ///
  /// Null comes back for `size == 0` and when the OS refuses a mapping; in the
  /// latter case `errno` is set to `ENOMEM` and [`last_error`](Self::last_error)
  /// records the failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(Some(ptr)) => ptr.as_ptr(),
      Ok(None) => ptr::null_mut(),
      Err(err) => {
        log::warn!("allocate({}) failed: {}", size, err);
        self.last_error = Some(err);
        set_errno(libc::ENOMEM);
        ptr::null_mut()
      }
    }
  }

  fn allocate_small(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let class = SizeClass::classify(size);
    let index = class.index();

    let mut arena = match self.chains[index] {
      Some(head) => head,
      None => {
        let head = Arena::create(&self.memory, class)?;
        self.chains[index] = Some(head);
        head
      }
    };

    loop {
      let current = unsafe { &mut *arena.as_ptr() };
      debug_assert!(current.is_valid());

      if let Some(slot) = current.take_slot() {
        self.recent[index] = Some(arena);
        return Ok(slot);
      }

      arena = match current.next() {
        Some(next) => next,
        None => unsafe { Arena::grow_chain(arena, &self.memory)? },
      };
    }
  }

  /// Frees `ptr`, working out on its own which arena or mapping owns it.
  ///
  /// Null is a no-op.
  ///
  /// Only addresses are compared while looking for the owner, so a pointer
  /// this allocator never handed out comes back as [`AllocError::InvalidFree`]
  /// without being read.
  ///
  /// # Safety
  ///
  /// Once freed, the memory behind `ptr` must not be used again.
  pub unsafe fn try_deallocate(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    let Some(ptr) = NonNull::new(ptr) else {
      return Ok(());
    };
    let addr = ptr.as_ptr() as usize;

    if let Some(arena) = self.find_owner(addr) {
      unsafe { &mut *arena.as_ptr() }.release(addr)?;
      return Ok(());
    }

    self.large.deallocate(&self.memory, ptr, None).map(drop)
  }

  /// Frees `ptr` given the size it was allocated with, skipping the scan over
  /// unrelated size classes.
  ///
  /// # Safety
  ///
  /// Same as [`try_deallocate`](Self::try_deallocate).
  pub unsafe fn try_deallocate_sized(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<(), AllocError> {
    let Some(ptr) = NonNull::new(ptr) else {
      return Ok(());
    };
    let addr = ptr.as_ptr() as usize;

    if size == 0 {
      return Err(AllocError::MisreportedSize { addr, size });
    }

    if size > THRESHOLD {
      return self.large.deallocate(&self.memory, ptr, Some(size)).map(drop);
    }

    let index = SizeClass::classify(size).index();

    let cached = self.recent[index].filter(|arena| unsafe { arena.as_ref() }.contains(addr));
    let arena = cached
      .or_else(|| self.chain(index).find(|arena| unsafe { arena.as_ref() }.contains(addr)))
      .ok_or(AllocError::MisreportedSize { addr, size })?;

    unsafe { &mut *arena.as_ptr() }.release(addr)?;

    Ok(())
  }

  /// Frees `ptr`. Null is a no-op.
  ///
  /// # Panics
  ///
  /// Panics when `ptr` is detected not to be a live allocation.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    let result = unsafe { self.try_deallocate(ptr) };
    self.fail_loudly(result);
  }

  /// Frees `ptr`, which was allocated with exactly `size` bytes. Null is a no-op.
  ///
  /// # Panics
  ///
  /// Panics when `ptr` is detected not to be a live allocation of `size` bytes.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn deallocate_sized(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) {
    let result = unsafe { self.try_deallocate_sized(ptr, size) };
    self.fail_loudly(result);
  }

  fn fail_loudly(
    &mut self,
    result: Result<(), AllocError>,
  ) {
    if let Err(err) = result {
      log::error!("{}", err);
      self.last_error = Some(err);
      panic!("{}", err);
    }
  }

  fn chain(
    &self,
    index: usize,
  ) -> Chain {
    Chain {
      next: self.chains[index],
    }
  }

  /// Scans every chain for the arena whose data region holds `addr`.
  fn find_owner(
    &self,
    addr: usize,
  ) -> Option<NonNull<Arena>> {
    (0..CLASS_COUNT)
      .flat_map(|index| self.chain(index))
      .find(|arena| unsafe { arena.as_ref() }.contains(addr))
  }

  /// Bytes usable behind `ptr`: its slot class, or the payload of a large
  /// allocation. `None` when `ptr` is not a live allocation of this allocator.
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let ptr = NonNull::new(ptr as *mut u8)?;
    let addr = ptr.as_ptr() as usize;

    match self.find_owner(addr) {
      Some(arena) => {
        let arena = unsafe { arena.as_ref() };
        arena.is_allocated(addr).then(|| arena.class().bytes())
      }
      None => self.large.payload_len(ptr),
    }
  }

  /// Number of arenas linked in the chain for `class_index`.
  pub fn chain_len(
    &self,
    class_index: usize,
  ) -> usize {
    self.chain(class_index).count()
  }

  pub fn stats(&self) -> AllocatorStats {
    let mut stats = AllocatorStats {
      live_large: self.large.len(),
      large_bytes: self.large.bytes(),
      ..AllocatorStats::default()
    };

    for arena in (0..CLASS_COUNT).flat_map(|index| self.chain(index)) {
      stats.arenas += 1;
      stats.live_slots += unsafe { arena.as_ref() }.live_slots();
    }

    stats
  }

  /// Most recent failure, kept until the next one.
  pub fn last_error(&self) -> Option<AllocError> {
    self.last_error
  }
}

impl<V: VirtualMemory> Drop for Allocator<V> {
  fn drop(&mut self) {
    for index in 0..CLASS_COUNT {
      let mut released = 0;

      // `Chain` reads each link before yielding the arena it came from.
      for arena in self.chain(index) {
        unsafe { Arena::destroy(arena, &self.memory) };
        released += 1;
      }

      if released > 0 {
        log::debug!("unmapped {} arenas of class {}", released, SizeClass::from_index(index));
      }

      self.chains[index] = None;
      self.recent[index] = None;
    }
  }
}

impl<V: VirtualMemory> fmt::Debug for Allocator<V> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Allocator")
      .field("stats", &self.stats())
      .field("last_error", &self.last_error)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};

  use super::*;
  use crate::config::{ArenaGeometry, BITMAP_CAPACITY};

  /// Maps through `Mmap` until `remaining` runs out, then refuses.
  struct Limited {
    remaining: Cell<usize>,
    unmapped: RefCell<Vec<usize>>,
  }

  impl Limited {
    fn new(
      maps: usize,
    ) -> Self {
      Self {
        remaining: Cell::new(maps),
        unmapped: RefCell::new(Vec::new()),
      }
    }
  }

  unsafe impl VirtualMemory for &Limited {
    fn map(
      &self,
      len: usize,
    ) -> Result<NonNull<u8>, AllocError> {
      if self.remaining.get() == 0 {
        return Err(AllocError::OutOfMemory { requested: len });
      }

      self.remaining.set(self.remaining.get() - 1);
      Mmap.map(len)
    }

    unsafe fn unmap(
      &self,
      addr: NonNull<u8>,
      len: usize,
    ) {
      self.unmapped.borrow_mut().push(addr.as_ptr() as usize);
      unsafe { Mmap.unmap(addr, len) };
    }
  }

  #[test]
  fn test_zero_size() {
    let mut allocator = Allocator::new();

    assert_eq!(allocator.try_allocate(0), Ok(None));
    assert!(allocator.allocate(0).is_null());
    assert_eq!(allocator.last_error(), None);
    assert_eq!(allocator.stats(), AllocatorStats::default());
  }

  #[test]
  fn test_lazy_chain_creation() {
    let mut allocator = Allocator::new();

    let a = allocator.allocate(4);
    let b = allocator.allocate(32);
    let c = allocator.allocate(4);

    assert_eq!(allocator.chain_len(0), 1);
    assert_eq!(allocator.chain_len(1), 1);
    assert_eq!(allocator.chain_len(2), 0);

    assert_eq!(c as usize - a as usize, 16);

    unsafe {
      assert_eq!(allocator.usable_size(a), Some(16));
      assert_eq!(allocator.usable_size(b), Some(32));

      allocator.deallocate(a);
      allocator.deallocate(b);
      allocator.deallocate(c);
    }

    assert_eq!(allocator.stats().live_slots, 0);
    assert_eq!(allocator.stats().arenas, 2);
  }

  #[test]
  fn test_sized_free_past_chain_head() {
    let mut allocator = Allocator::new();
    let capacity = ArenaGeometry::for_class(16).capacity;

    let ptrs: Vec<_> = (0..capacity + 2).map(|_| allocator.allocate(8)).collect();
    assert_eq!(allocator.chain_len(0), 2);

    unsafe {
      // Lives in the second arena, which is also the cached one.
      allocator.deallocate_sized(ptrs[capacity + 1], 8);

      // Lives in the head, so the cache misses and the chain is walked.
      allocator.deallocate_sized(ptrs[0], 8);

      assert_eq!(allocator.allocate(8), ptrs[0]);

      // Make the head the cached arena, then free from the second one.
      allocator.deallocate_sized(ptrs[capacity], 16);
    }

    assert_eq!(allocator.stats().live_slots, capacity);
  }

  #[test]
  fn test_sized_free_rejects_wrong_class() {
    let mut allocator = Allocator::new();
    let ptr = allocator.allocate(100);

    unsafe {
      assert_eq!(
        allocator.try_deallocate_sized(ptr, 8),
        Err(AllocError::MisreportedSize {
          addr: ptr as usize,
          size: 8
        })
      );
      assert_eq!(
        allocator.try_deallocate_sized(ptr, 0),
        Err(AllocError::MisreportedSize {
          addr: ptr as usize,
          size: 0
        })
      );
      assert_eq!(allocator.try_deallocate_sized(ptr, 100), Ok(()));
    }
  }

  #[test]
  fn test_sized_free_large() {
    let mut allocator = Allocator::new();
    let size = THRESHOLD + 1;
    let ptr = allocator.allocate(size);

    assert_eq!(allocator.stats().live_large, 1);
    assert_eq!(allocator.stats().large_bytes, size);

    unsafe {
      assert_eq!(allocator.usable_size(ptr), Some(size));
      assert!(allocator.try_deallocate_sized(ptr, size + 1).is_err());
      allocator.deallocate_sized(ptr, size);
    }

    assert_eq!(allocator.stats().live_large, 0);
    assert_eq!(allocator.stats().large_bytes, 0);
  }

  #[test]
  fn test_usable_size_tracks_liveness() {
    let mut allocator = Allocator::new();
    let small = allocator.allocate(20);
    let large = allocator.allocate(THRESHOLD + 7);

    assert_eq!(allocator.usable_size(small), Some(32));
    assert_eq!(allocator.usable_size(large), Some(THRESHOLD + 7));
    assert_eq!(allocator.usable_size(unsafe { small.add(4) }), None);

    unsafe {
      allocator.deallocate(small);
      allocator.deallocate(large);
    }

    assert_eq!(allocator.usable_size(small), None);
    assert_eq!(allocator.usable_size(large), None);
    assert_eq!(allocator.usable_size(ptr::null()), None);
  }

  #[test]
  fn test_large_free_from_other_allocator_rejected() {
    let mut mine = Allocator::new();
    let mut theirs = Allocator::new();
    let size = 2 * THRESHOLD;

    let ptr = theirs.allocate(size);

    unsafe {
      assert_eq!(
        mine.try_deallocate(ptr),
        Err(AllocError::InvalidFree { addr: ptr as usize })
      );
      assert_eq!(
        mine.try_deallocate_sized(ptr, size),
        Err(AllocError::InvalidFree { addr: ptr as usize })
      );
    }

    assert_eq!(mine.stats(), AllocatorStats::default());
    assert_eq!(theirs.stats().live_large, 1);
    assert_eq!(theirs.stats().large_bytes, size);

    unsafe {
      ptr.write_bytes(0x42, size);
      theirs.deallocate(ptr);
    }

    assert_eq!(theirs.stats().live_large, 0);
  }

  #[test]
  fn test_large_double_free_detected() {
    let mut allocator = Allocator::new();
    let ptr = allocator.allocate(THRESHOLD + 1);

    unsafe {
      assert_eq!(allocator.try_deallocate(ptr), Ok(()));
      assert_eq!(
        allocator.try_deallocate(ptr),
        Err(AllocError::InvalidFree { addr: ptr as usize })
      );
    }

    assert_eq!(allocator.stats().large_bytes, 0);
  }

  #[test]
  fn test_double_free_detected() {
    let mut allocator = Allocator::new();
    let ptr = allocator.allocate(24);

    unsafe {
      assert_eq!(allocator.try_deallocate(ptr), Ok(()));
      assert_eq!(
        allocator.try_deallocate(ptr),
        Err(AllocError::DoubleFree { addr: ptr as usize })
      );
    }
  }

  #[test]
  fn test_interior_pointer_rejected() {
    let mut allocator = Allocator::new();
    let ptr = allocator.allocate(64);

    unsafe {
      let interior = ptr.add(8);

      assert_eq!(
        allocator.try_deallocate(interior),
        Err(AllocError::InvalidFree {
          addr: interior as usize
        })
      );
      assert_eq!(allocator.stats().live_slots, 1);
    }
  }

  #[test]
  #[should_panic(expected = "invalid free")]
  fn test_deallocate_fails_loudly() {
    let mut allocator = Allocator::new();
    let mut local = [0u8; 64];

    unsafe { allocator.deallocate(local.as_mut_ptr().add(3)) };
  }

  #[test]
  fn test_null_free_is_noop() {
    let mut allocator = Allocator::new();

    unsafe {
      allocator.deallocate(ptr::null_mut());
      allocator.deallocate_sized(ptr::null_mut(), 16);
    }
  }

  #[test]
  fn test_growth_failure() {
    let memory = Limited::new(1);
    let mut allocator = Allocator::with_memory(&memory);

    let first = allocator.allocate(THRESHOLD);
    assert!(!first.is_null());

    unsafe { first.write_bytes(0x11, THRESHOLD) };

    let capacity = ArenaGeometry::for_class(THRESHOLD).capacity;
    for _ in 1..capacity {
      assert!(!allocator.allocate(THRESHOLD).is_null());
    }

    assert!(allocator.allocate(THRESHOLD).is_null());
    assert_eq!(
      allocator.last_error(),
      Some(AllocError::OutOfMemory {
        requested: ArenaGeometry::for_class(THRESHOLD).mapping_len
      })
    );
    assert_eq!(allocator.chain_len(SizeClass::classify(THRESHOLD).index()), 1);

    unsafe { assert_eq!(*first.add(THRESHOLD - 1), 0x11) };
  }

  #[test]
  fn test_drop_unmaps_arenas() {
    let memory = Limited::new(usize::MAX);

    {
      let mut allocator = Allocator::with_memory(&memory);

      for _ in 0..BITMAP_CAPACITY + 1 {
        allocator.allocate(16);
      }
      allocator.allocate(1000);

      assert_eq!(allocator.stats().arenas, 3);
    }

    assert_eq!(memory.unmapped.borrow().len(), 3);
  }
}
