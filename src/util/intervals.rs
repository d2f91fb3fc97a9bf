
/// Merges inclusive (begin, end) intervals that overlap or touch.
/// Input does not need to be sorted; output is sorted and non-overlapping.
/// # Arguments
/// * `intervals` - the inclusive intervals to merge
pub fn merge_intervals(mut intervals: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    intervals.sort_unstable();
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
    for (begin, end) in intervals.into_iter() {
        match merged.last_mut() {
            Some(last) if begin <= last.1 + 1 => {
                last.1 = last.1.max(end);
            },
            _ => merged.push((begin, end))
        }
    }
    merged
}

/// Builds the ±tolerance windows around a set of positions, clamped to the chromosome and merged
/// # Arguments
/// * `positions` - breakpoint positions, 0-based
/// * `tolerance` - bases to add on either side
/// * `chrom_len` - length of the chromosome
pub fn breakpoint_windows(positions: &[u64], tolerance: u64, chrom_len: u64) -> Vec<(i64, i64)> {
    let last = chrom_len.saturating_sub(1) as i64;
    let windows = positions.iter()
        .map(|&p| {
            let begin = p.saturating_sub(tolerance) as i64;
            let end = ((p + tolerance) as i64).min(last);
            (begin, end)
        })
        .collect();
    merge_intervals(windows)
}
