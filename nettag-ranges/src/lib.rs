//! Canonical tag range lists and the set algebra over them.
//!
//! A canonical range list is an ordered sequence of closed intervals `[start, end]` that
//! neither overlap nor touch, with every value inside `[MIN_TAG, MAX_TAG]`. Every function
//! in [`algebra`] takes canonical input and produces canonical output.
//!
//! ```rust
//! use nettag_ranges::{RangeList, algebra};
//!
//! let free = RangeList::from_pairs(&[(1, 100), (200, 300)]).unwrap();
//! let taken = RangeList::from_pairs(&[(50, 250)]).unwrap();
//!
//! let left = algebra::difference(&free, &taken);
//! assert_eq!(left, RangeList::from_pairs(&[(1, 49), (251, 300)]).unwrap());
//! ```
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::fmt;

use derive_more::Deref;
use thiserror::Error;

/// Set operations over canonical range lists.
pub mod algebra;
pub use algebra::{addition, contains, difference, intersection, is_subset, partition_by_bounds};

/// The lowest valid tag value.
pub const MIN_TAG: u16 = 1;
/// The highest valid tag value.
pub const MAX_TAG: u16 = 4095;

/// Reasons a list of ranges is not canonical.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRangeError {
    /// The list holds no range.
    #[error("Tag range is empty")]
    Empty,
    /// A range starts after its end.
    #[error("The range {0} is not ordered")]
    Unordered(TagRange),
    /// A range starts before the previous one.
    #[error("Tag ranges are not ordered: {prev} comes before {next}")]
    NotAscending {
        /// The earlier range in the list.
        prev: TagRange,
        /// The range that follows it.
        next: TagRange,
    },
    /// Two consecutive ranges share tags.
    #[error("Tag ranges {prev} and {next} overlap")]
    Overlapping {
        /// The earlier range in the list.
        prev: TagRange,
        /// The range that follows it.
        next: TagRange,
    },
    /// Two consecutive ranges touch and should be one range.
    #[error("Tag ranges {prev} and {next} have an unnecessary partition")]
    Unmerged {
        /// The earlier range in the list.
        prev: TagRange,
        /// The range that follows it.
        next: TagRange,
    },
    /// A tag below [`MIN_TAG`].
    #[error("Minimum value for a tag is {}, got {0}", MIN_TAG)]
    BelowMinimum(u16),
    /// A tag above [`MAX_TAG`].
    #[error("Maximum value for a tag is {}, got {0}", MAX_TAG)]
    AboveMaximum(u16),
}

/// A closed interval of tags, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagRange {
    /// The lowest tag of the range.
    pub start: u16,
    /// The highest tag of the range, inclusive.
    pub end: u16,
}

impl TagRange {
    /// Creates `[start, end]` without checking it.
    #[inline]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// A range covering exactly one tag.
    #[inline]
    pub const fn single(tag: u16) -> Self {
        Self { start: tag, end: tag }
    }

    /// Returns the number of tags covered by this range.
    #[inline]
    pub const fn count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Returns `true` if `tag` lies within the range.
    #[inline]
    pub const fn contains(&self, tag: u16) -> bool {
        self.start <= tag && tag <= self.end
    }

    /// Returns `true` if the range covers exactly one tag.
    #[inline]
    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl From<u16> for TagRange {
    fn from(tag: u16) -> Self {
        Self::single(tag)
    }
}

impl From<(u16, u16)> for TagRange {
    fn from((start, end): (u16, u16)) -> Self {
        Self::new(start, end)
    }
}

impl fmt::Display for TagRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Checks that `ranges` is a non-empty canonical range list.
pub fn validate(ranges: &[TagRange]) -> Result<(), InvalidRangeError> {
    if ranges.is_empty() {
        return Err(InvalidRangeError::Empty);
    }

    let mut prev: Option<TagRange> = None;
    for &range in ranges {
        if range.start > range.end {
            return Err(InvalidRangeError::Unordered(range));
        }
        if range.start < MIN_TAG {
            return Err(InvalidRangeError::BelowMinimum(range.start));
        }
        if range.end > MAX_TAG {
            return Err(InvalidRangeError::AboveMaximum(range.end));
        }

        if let Some(prev) = prev {
            if range.start < prev.start {
                return Err(InvalidRangeError::NotAscending { prev, next: range });
            }
            if range.start <= prev.end {
                return Err(InvalidRangeError::Overlapping { prev, next: range });
            }
            if range.start == prev.end + 1 {
                return Err(InvalidRangeError::Unmerged { prev, next: range });
            }
        }
        prev = Some(range);
    }

    Ok(())
}

/// An owned canonical range list.
///
/// The only ways to obtain a non-empty list are [`RangeList::new`] (and its helpers),
/// which validate, and the functions in [`algebra`], which preserve canonical form.
/// An empty list is canonical too: it is what an exhausted pool holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deref)]
pub struct RangeList(Vec<TagRange>);

impl RangeList {
    /// Validates `ranges` and wraps them.
    pub fn new(ranges: Vec<TagRange>) -> Result<Self, InvalidRangeError> {
        validate(&ranges)?;
        Ok(Self(ranges))
    }

    /// Builds a list from `(start, end)` pairs.
    pub fn from_pairs(pairs: &[(u16, u16)]) -> Result<Self, InvalidRangeError> {
        Self::new(pairs.iter().copied().map(TagRange::from).collect())
    }

    /// A list holding the single range `[start, end]`.
    pub fn range(start: u16, end: u16) -> Result<Self, InvalidRangeError> {
        Self::new(vec![TagRange::new(start, end)])
    }

    /// A list holding the single tag `tag`.
    pub fn single(tag: u16) -> Result<Self, InvalidRangeError> {
        Self::range(tag, tag)
    }

    /// Every valid tag, `[[MIN_TAG, MAX_TAG]]`.
    pub fn full() -> Self {
        Self(vec![TagRange::new(MIN_TAG, MAX_TAG)])
    }

    /// The empty list, as held by an exhausted pool.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wraps a list produced by the algebra without re-validating it.
    pub(crate) fn from_canonical(ranges: Vec<TagRange>) -> Self {
        debug_assert!(ranges.is_empty() || validate(&ranges).is_ok(), "non-canonical: {ranges:?}");
        Self(ranges)
    }

    /// Returns the total number of tags covered.
    pub fn count(&self) -> usize {
        self.0.iter().map(TagRange::count).sum()
    }

    /// The ranges, in ascending order.
    pub fn as_slice(&self) -> &[TagRange] {
        &self.0
    }

    /// Unwraps the ranges.
    pub fn into_inner(self) -> Vec<TagRange> {
        self.0
    }
}

impl TryFrom<Vec<TagRange>> for RangeList {
    type Error = InvalidRangeError;

    fn try_from(ranges: Vec<TagRange>) -> Result<Self, Self::Error> {
        Self::new(ranges)
    }
}

impl AsRef<[TagRange]> for RangeList {
    fn as_ref(&self) -> &[TagRange] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a RangeList {
    type Item = &'a TagRange;
    type IntoIter = std::slice::Iter<'a, TagRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, range) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(u16, u16)]) -> Vec<TagRange> {
        pairs.iter().copied().map(TagRange::from).collect()
    }

    #[test]
    fn validate_accepts_canonical() {
        assert!(validate(&ranges(&[(100, 100), (150, 150), (200, 3000)])).is_ok());
        assert!(validate(&ranges(&[(1, 4095)])).is_ok());
    }

    #[test]
    fn validate_rejects_malformed() {
        assert_eq!(validate(&[]), Err(InvalidRangeError::Empty));

        assert!(matches!(
            validate(&ranges(&[(20, 19)])),
            Err(InvalidRangeError::Unordered(_))
        ));
        assert!(matches!(
            validate(&ranges(&[(20, 50), (10, 15)])),
            Err(InvalidRangeError::NotAscending { .. })
        ));
        assert!(matches!(
            validate(&ranges(&[(20, 50), (30, 3000)])),
            Err(InvalidRangeError::Overlapping { .. })
        ));
        assert!(matches!(
            validate(&ranges(&[(20, 50), (50, 3000)])),
            Err(InvalidRangeError::Overlapping { .. })
        ));
        assert!(matches!(
            validate(&ranges(&[(20, 50), (51, 3000)])),
            Err(InvalidRangeError::Unmerged { .. })
        ));
        assert_eq!(
            validate(&ranges(&[(20, 50), (52, 4096)])),
            Err(InvalidRangeError::AboveMaximum(4096))
        );
        assert_eq!(validate(&ranges(&[(0, 50), (52, 3000)])), Err(InvalidRangeError::BelowMinimum(0)));
    }

    #[test]
    fn range_list_display_and_count() {
        let list = RangeList::from_pairs(&[(1, 5), (7, 7)]).unwrap();
        assert_eq!(list.to_string(), "[[1, 5], [7, 7]]");
        assert_eq!(list.count(), 6);
        assert_eq!(RangeList::empty().to_string(), "[]");
        assert_eq!(RangeList::full().count(), 4095);
    }

    #[test]
    fn range_list_rejects_empty_input() {
        assert_eq!(RangeList::new(Vec::new()), Err(InvalidRangeError::Empty));
    }
}
