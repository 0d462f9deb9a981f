/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; the result is meaningless otherwise.
///
/// # Examples
///
/// ```rust
/// use stagering::align_to;
///
/// assert_eq!(align_to!(13, 16), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// assert_eq!(align_to!(0, 256), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Returns `true` if `alignment` can be used with [`align_to!`].
pub const fn is_valid_alignment(alignment: usize) -> bool {
  alignment.is_power_of_two()
}
