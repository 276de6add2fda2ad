//! Alignment arithmetic on byte offsets and sizes.

/// Round unsigned values to multiples of an access granularity.
///
/// An alignment of zero leaves the value unchanged.
pub trait AlignableTo: Sized {
    /// Smallest multiple of `align` not below `self`.
    fn align_up(self, align: Self) -> Self;

    /// Largest multiple of `align` not above `self`.
    fn align_down(self, align: Self) -> Self;
}

macro_rules! impl_alignable {
    ($($ty: ty),*) => {
        $(
            impl AlignableTo for $ty {
                #[inline(always)]
                fn align_up(self, align: $ty) -> $ty {
                    match self.checked_rem(align) {
                        Some(0) | None => self,
                        Some(excess) => self + (align - excess),
                    }
                }

                #[inline(always)]
                fn align_down(self, align: $ty) -> $ty {
                    self - self.checked_rem(align).unwrap_or(0)
                }
            }
        )*
    };
}

impl_alignable!(u8, u16, u32, u64, usize);

/// Number of `unit`-sized pieces needed to hold `value`, rounding up.
pub const fn div_ceil(value: u64, unit: u64) -> u64 {
    value.div_ceil(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_both_ways() {
        assert_eq!(6u64.align_down(4), 4);
        assert_eq!(6u64.align_up(4), 8);
        assert_eq!(8u64.align_up(4), 8);
        assert_eq!(5u32.align_up(0), 5);
        assert_eq!(div_ceil(17, 8), 3);
    }
}
