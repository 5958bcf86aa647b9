use nettag_ranges::TagRange;

/// Chooses a tag from `available`, scanning from the low end or, with `take_highest`, from
/// the high end.
///
/// If the boundary of a range equals `avoid`, its neighbour inside the same range is taken
/// instead. A range holding only `avoid` is skipped, and `avoid` is returned only if no
/// other range yields a tag.
pub(crate) fn pick(
    available: &[TagRange],
    take_highest: bool,
    avoid: Option<u16>,
) -> Option<u16> {
    let choose = |range: &TagRange| {
        if range.is_single() && Some(range.start) == avoid {
            return None;
        }

        Some(if take_highest {
            if Some(range.end) == avoid {
                range.end - 1
            } else {
                range.end
            }
        } else if Some(range.start) == avoid {
            range.start + 1
        } else {
            range.start
        })
    };

    let found = if take_highest {
        available.iter().rev().find_map(choose)
    } else {
        available.iter().find_map(choose)
    };

    found.or_else(|| avoid.filter(|&tag| nettag_ranges::contains(available, tag)))
}
