/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
///
/// # Examples
///
/// ```rust
/// use vmalloc::align_to;
///
/// assert_eq!(align_to!(13, 16), 16);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Base-two logarithm of a power of two.
#[inline]
pub const fn log2(
  value: usize,
) -> u32 {
  debug_assert!(value.is_power_of_two());
  value.trailing_zeros()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_to() {
    for alignment in [8usize, 16, 64, 4096] {
      for i in 0..4 {
        let sizes = (alignment * i + 1)..=(alignment * (i + 1));

        for size in sizes {
          assert_eq!(alignment * (i + 1), align_to!(size, alignment));
        }
      }
    }

    assert_eq!(align_to!(0usize, 16), 0);
  }

  #[test]
  fn test_log2() {
    assert_eq!(log2(1), 0);
    assert_eq!(log2(16), 4);
    assert_eq!(log2(1 << 20), 20);
  }
}
