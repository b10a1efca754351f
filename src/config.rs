//! Compile-time allocator constants and per-class arena geometry.

use std::mem;

use crate::{align::log2, align_to, arena::Arena};

/// Largest request served from arenas. Anything above is mapped directly.
pub const THRESHOLD: usize = 1 << 20;

/// Smallest size class.
pub const MIN_CLASS: usize = 16;

/// Number of distinct size classes, `MIN_CLASS..=THRESHOLD`.
pub const CLASS_COUNT: usize = (log2(THRESHOLD) - log2(MIN_CLASS)) as usize + 1;

/// Slots tracked by one arena bitmap.
pub const BITMAP_CAPACITY: usize = 512;

/// Data bytes an arena aims for. Caps the slot count of big classes.
pub const ARENA_DATA_BYTES: usize = 4 * 1024 * 1024;

pub const PAGE_SIZE: usize = 4096;

/// Layout of one arena mapping for a given size class.
///
/// ```text
///   base                 base + data_offset
///   ┌──────────────┬─────┬────────┬────────┬─────┬──────────────┐
///   │ Arena header │ pad │ slot 0 │ slot 1 │ ... │ slot cap - 1 │
///   └──────────────┴─────┴────────┴────────┴─────┴──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaGeometry {
  pub class: usize,
  pub capacity: usize,
  pub data_offset: usize,
  pub mapping_len: usize,
}

impl ArenaGeometry {
  pub const fn for_class(
    class: usize,
  ) -> Self {
    let mut capacity = ARENA_DATA_BYTES / class;
    if capacity > BITMAP_CAPACITY {
      capacity = BITMAP_CAPACITY;
    }
    if capacity == 0 {
      capacity = 1;
    }

    let slot_alignment = if class < PAGE_SIZE { class } else { PAGE_SIZE };
    let data_offset = align_to!(mem::size_of::<Arena>(), slot_alignment);
    let mapping_len = align_to!(data_offset + capacity * class, PAGE_SIZE);

    Self {
      class,
      capacity,
      data_offset,
      mapping_len,
    }
  }

  /// Length of the data region, `capacity * class`.
  pub const fn data_len(&self) -> usize {
    self.capacity * self.class
  }
}
