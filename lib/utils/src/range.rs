//! Extensions for `Range<T>` used when comparing address spans.

use core::ops::Range;

pub trait RangeExt<T>
where
    Self: Sized,
    T: Copy + PartialOrd,
{
    /// Check if this range overlaps with another range.
    ///
    /// Always return false if either range is empty.
    fn overlap(&self, another: &Self) -> bool;
    /// Check if `another` lies completely inside this range.
    ///
    /// An empty `another` is contained by any range.
    fn covers(&self, another: &Self) -> bool;
}

impl<T> RangeExt<T> for Range<T>
where
    T: Copy + Ord,
{
    #[inline(always)]
    fn overlap(&self, another: &Range<T>) -> bool {
        if self.is_empty() || another.is_empty() {
            return false;
        }
        if self.end <= another.start {
            return false;
        }
        if self.start >= another.end {
            return false;
        }
        true
    }

    #[inline(always)]
    fn covers(&self, another: &Range<T>) -> bool {
        another.is_empty() || (self.start <= another.start && another.end <= self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::RangeExt;

    #[test]
    fn touching_ranges_do_not_overlap() {
        assert!(!(0u64..4).overlap(&(4..8)));
        assert!((0u64..5).overlap(&(4..8)));
        assert!(!(0u64..0).overlap(&(0..8)));
    }

    #[test]
    fn covers_inner_span() {
        assert!((0u64..8).covers(&(2..6)));
        assert!(!(0u64..8).covers(&(6..10)));
    }
}
