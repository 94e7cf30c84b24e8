//! Closed integer interval arithmetic used by the coverage engine.

/// A closed, 1-based `(start, end)` residue interval.
pub type Interval = (usize, usize);

/// Merges overlapping or touching intervals.
///
/// Intervals are sorted by start; an interval is folded into the previous
/// one when it starts at most one residue after the previous end. The result
/// is sorted and every pair of consecutive intervals is separated by a gap of
/// at least one uncovered residue.
///
/// ```ignore
/// assert_eq!(union(&[(1, 3), (2, 5), (8, 10)]), vec![(1, 5), (8, 10)]);
/// assert_eq!(union(&[(1, 3), (4, 6)]), vec![(1, 6)]);
/// ```
pub fn union(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Number of residues covered by already disjoint intervals.
pub fn covered_length(intervals: &[Interval]) -> usize {
    intervals
        .iter()
        .map(|(start, end)| end.saturating_sub(*start) + 1)
        .sum()
}
