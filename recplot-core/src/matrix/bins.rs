//! Bin boundaries for recruitment matrices.

use crate::types::GenomicPos;

/// Identity boundaries: 100, 100 - step, ... while still above `lower`,
/// returned in ascending order.
///
/// Boundaries are computed as `100 - k * step` rather than by repeated
/// subtraction so that steps like 0.1 do not drift.
pub fn identity_bins(step: f64, lower: f64) -> Vec<f64> {
    let mut bins = Vec::new();
    let mut k = 0u64;
    loop {
        let boundary = 100.0 - k as f64 * step;
        if boundary <= lower {
            break;
        }
        bins.push(boundary);
        k += 1;
    }
    bins.reverse();
    bins
}

/// Index of the rightmost boundary `<= pct_identity`, or `None` when the
/// identity lies below the lowest boundary.
pub fn identity_bin(bins: &[f64], pct_identity: f64) -> Option<usize> {
    bins.partition_point(|&b| b <= pct_identity).checked_sub(1)
}

/// Number of position bins for a contig: `floor(length / width)`, at least
/// one, and never more than `length - 1` so that bin starts stay distinct.
pub fn position_bin_count(length: GenomicPos, width: GenomicPos) -> usize {
    let count = (length / width).min(length.saturating_sub(1));
    count.max(1) as usize
}

/// Evenly spaced bin starts over `[1, length)` and the matching inclusive
/// ends; the last end is `length`.
pub fn position_bins(length: GenomicPos, width: GenomicPos) -> (Vec<GenomicPos>, Vec<GenomicPos>) {
    let n = position_bin_count(length, width);
    let span = u128::from(length.saturating_sub(1));

    let starts: Vec<GenomicPos> = (0..n)
        .map(|i| 1 + (i as u128 * span / n as u128) as GenomicPos)
        .collect();
    let mut ends: Vec<GenomicPos> = starts.iter().skip(1).map(|&s| s - 1).collect();
    ends.push(length);

    (starts, ends)
}

/// Index of the first bin whose end is `>= pos`.
pub fn position_bin(ends: &[GenomicPos], pos: GenomicPos) -> usize {
    ends.partition_point(|&end| end < pos)
}
