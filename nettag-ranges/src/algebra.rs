//! Set operations over canonical range lists.
//!
//! Long-lived pools get fragmented into many small intervals, so every operation first
//! narrows its operands with [`partition_by_bounds`] (two binary searches) and only walks
//! the part of each list that can actually interact with the other operand.

use std::iter;

use crate::{RangeList, TagRange};

/// Returns `(lowest, highest)` tag covered by `ranges`, or `None` if it is empty.
#[inline]
fn span(ranges: &[TagRange]) -> Option<(u16, u16)> {
    Some((ranges.first()?.start, ranges.last()?.end))
}

/// Splits a canonical list into `(left, overlapping, right)` around the bounds `[lo, hi]`.
///
/// - `left` holds the ranges that end before `lo`.
/// - `overlapping` holds the ranges that intersect `[lo, hi]`.
/// - `right` holds the ranges that start after `hi`.
///
/// Runs in O(log n). If `lo > hi`, `overlapping` is empty.
pub fn partition_by_bounds(
    ranges: &[TagRange],
    lo: u16,
    hi: u16,
) -> (&[TagRange], &[TagRange], &[TagRange]) {
    let left = ranges.partition_point(|range| range.end < lo);
    let right = ranges.partition_point(|range| range.start <= hi).max(left);

    (&ranges[..left], &ranges[left..right], &ranges[right..])
}

/// Returns `true` if `tag` is covered by `ranges`.
pub fn contains(ranges: &[TagRange], tag: u16) -> bool {
    let idx = ranges.partition_point(|range| range.end < tag);
    ranges.get(idx).is_some_and(|range| range.start <= tag)
}

/// Returns `true` if every tag in `a` is also in `b`. Both operands must be canonical.
pub fn is_subset(a: &[TagRange], b: &[TagRange]) -> bool {
    difference(a, b).is_empty()
}

/// The intersection `a ∩ b`.
///
/// Both operands must be canonical, as a [`RangeList`] always is. Slices built by hand
/// should go through [`validate`](crate::validate) first. A non-canonical operand panics in
/// debug builds and gives an unspecified list otherwise.
pub fn intersection(a: &[TagRange], b: &[TagRange]) -> RangeList {
    let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (span(a), span(b)) else {
        return RangeList::empty();
    };

    let lo = a_lo.max(b_lo);
    let hi = a_hi.min(b_hi);
    if lo > hi {
        return RangeList::empty();
    }

    let (_, a, _) = partition_by_bounds(a, lo, hi);
    let (_, b, _) = partition_by_bounds(b, lo, hi);

    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start <= end {
            out.push(TagRange::new(start, end));
        }

        // Whichever range finishes first can't overlap anything further along the other list.
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }

    RangeList::from_canonical(out)
}

/// The difference `a \ b`: every tag of `a` that is not in `b`.
///
/// Both operands must be canonical, see [`intersection`].
pub fn difference(a: &[TagRange], b: &[TagRange]) -> RangeList {
    let Some((b_lo, b_hi)) = span(b) else {
        return RangeList::from_canonical(a.to_vec());
    };

    let (left, mid, right) = partition_by_bounds(a, b_lo, b_hi);

    let mut out = Vec::with_capacity(a.len() + 1);
    out.extend_from_slice(left);

    if let Some((lo, hi)) = span(mid) {
        let (_, cuts, _) = partition_by_bounds(b, lo, hi);

        let mut j = 0;
        for range in mid {
            while j < cuts.len() && cuts[j].end < range.start {
                j += 1;
            }

            // The lowest tag of `range` not yet known to be covered by `cuts`.
            let mut next = Some(range.start);
            while let Some(start) = next {
                let Some(cut) = cuts.get(j).filter(|cut| cut.start <= range.end) else {
                    break;
                };

                if cut.start > start {
                    out.push(TagRange::new(start, cut.start - 1));
                }

                if cut.end >= range.end {
                    // The cut may also cover the next range of `a`, so it is not consumed.
                    next = None;
                } else {
                    next = Some(cut.end + 1);
                    j += 1;
                }
            }

            if let Some(start) = next {
                out.push(TagRange::new(start, range.end));
            }
        }
    }

    out.extend_from_slice(right);

    RangeList::from_canonical(out)
}

/// The union `a ∪ b`, together with the tags that were present in both operands.
///
/// The second list is non-empty exactly when some tag of `b` was already in `a`. Both
/// operands must be canonical, see [`intersection`].
pub fn addition(a: &[TagRange], b: &[TagRange]) -> (RangeList, RangeList) {
    let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (span(a), span(b)) else {
        let union = if a.is_empty() { b } else { a };
        return (RangeList::from_canonical(union.to_vec()), RangeList::empty());
    };

    // Widen the bounds by one so ranges that only touch across the boundary get merged too.
    let lo = a_lo.max(b_lo).saturating_sub(1);
    let hi = a_hi.min(b_hi).saturating_add(1);

    let (a_left, a_mid, a_right) = partition_by_bounds(a, lo, hi);
    let (b_left, b_mid, b_right) = partition_by_bounds(b, lo, hi);

    let mut union = Vec::with_capacity(a.len() + b.len());
    let mut overlap = Vec::new();

    // At most one of the operands has ranges on each unaffected side.
    union.extend_from_slice(a_left);
    union.extend_from_slice(b_left);

    let mut top: Option<TagRange> = None;
    for range in merge_by_start(a_mid, b_mid) {
        let Some(current) = &mut top else {
            top = Some(range);
            continue;
        };

        if range.start <= current.end {
            overlap.push(TagRange::new(range.start, range.end.min(current.end)));
            current.end = current.end.max(range.end);
        } else if range.start == current.end + 1 {
            current.end = range.end;
        } else {
            union.push(*current);
            *current = range;
        }
    }
    union.extend(top);

    union.extend_from_slice(a_right);
    union.extend_from_slice(b_right);

    (RangeList::from_canonical(union), RangeList::from_canonical(overlap))
}

/// Merges two sorted lists into one sequence ordered by range start.
fn merge_by_start<'a>(
    a: &'a [TagRange],
    b: &'a [TagRange],
) -> impl Iterator<Item = TagRange> + 'a {
    let (mut a, mut b) = (a.iter().peekable(), b.iter().peekable());
    iter::from_fn(move || {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x <= y,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let next = if take_a { a.next() } else { b.next() };
        next.copied()
    })
}
