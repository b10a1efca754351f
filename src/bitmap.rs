use crate::config::BITMAP_CAPACITY;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = BITMAP_CAPACITY / WORD_BITS;

/// One bit per slot. A set bit means the slot is handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct SlotBitmap {
  words: [u64; WORDS],
}

impl SlotBitmap {
  pub const fn new() -> Self {
    Self { words: [0; WORDS] }
  }

  pub fn test(
    &self,
    bit: usize,
  ) -> bool {
    self.words[bit / WORD_BITS] & (1u64 << (bit % WORD_BITS)) != 0
  }

  pub fn set(
    &mut self,
    bit: usize,
  ) {
    self.words[bit / WORD_BITS] |= 1u64 << (bit % WORD_BITS);
  }

  pub fn clear(
    &mut self,
    bit: usize,
  ) {
    self.words[bit / WORD_BITS] &= !(1u64 << (bit % WORD_BITS));
  }

  /// Lowest clear bit below `capacity`, or `None` when every slot is taken.
  pub fn find_first_free(
    &self,
    capacity: usize,
  ) -> Option<usize> {
    debug_assert!(capacity <= BITMAP_CAPACITY);

    for (i, word) in self.words.iter().enumerate() {
      if *word == u64::MAX {
        continue;
      }

      let bit = i * WORD_BITS + word.trailing_ones() as usize;

      return (bit < capacity).then_some(bit);
    }

    None
  }

  pub fn count_set(&self) -> usize {
    self.words.iter().map(|word| word.count_ones() as usize).sum()
  }
}
