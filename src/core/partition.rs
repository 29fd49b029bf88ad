use crate::types::RowRange;

/// Split `n_rows` into contiguous row ranges for `worker_count` workers.
///
/// `worker_count` evenly spaced boundaries `floor(i * n_rows / (worker_count - 1))`
/// give `worker_count - 1` ranges, the last one ending exactly at `n_rows`. A
/// worker count below two yields a single range. Empty ranges (more workers than
/// rows) are dropped, so the result is ordered, non-overlapping and covers
/// `[0, n_rows)` exactly.
pub fn partition_rows(n_rows: usize, worker_count: usize) -> Vec<RowRange> {
    let segments = worker_count.saturating_sub(1).max(1);
    let boundary = |i: usize| ((i as u128 * n_rows as u128) / segments as u128) as usize;

    (0..segments)
        .map(|i| RowRange::new(boundary(i), boundary(i + 1)))
        .filter(|range| !range.is_empty())
        .collect()
}
