use std::fmt;

use crate::{
  align::log2,
  config::{CLASS_COUNT, MIN_CLASS, THRESHOLD},
};

/// A power-of-two slot size between [`MIN_CLASS`] and [`THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(usize);

impl SizeClass {
  /// Rounds `size` up to its size class.
  ///
  /// Requires `1 <= size <= THRESHOLD`.
  pub fn classify(
    size: usize,
  ) -> Self {
    debug_assert!(size >= 1 && size <= THRESHOLD);

    Self(size.next_power_of_two().max(MIN_CLASS))
  }

  /// The class stored at chain-table slot `index`.
  pub(crate) fn from_index(
    index: usize,
  ) -> Self {
    debug_assert!(index < CLASS_COUNT);

    Self(MIN_CLASS << index)
  }

  /// Chain-table slot of this class: `log2(class) - 4`.
  pub fn index(self) -> usize {
    (log2(self.0) - log2(MIN_CLASS)) as usize
  }

  pub fn bytes(self) -> usize {
    self.0
  }
}

impl fmt::Display for SizeClass {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{}B", self.0)
  }
}
