//! Key-range chunk planning
//!
//! Large extractions are sliced into fixed-width, half-open intervals over
//! a monotonically increasing key column. The generated sequence is
//! contiguous and non-overlapping, and its union covers the inclusive
//! `[min_key, max_key]` range: the final interval's upper bound always
//! exceeds the true maximum so no rows are dropped.

/// A half-open key interval `[lo, hi)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub lo: i64,
    pub hi: i64,
}

/// Iterator over the chunk sequence covering `[min_key, max_key]`
pub fn chunks(min_key: i64, max_key: i64, chunk_size: i64) -> impl Iterator<Item = Chunk> {
    debug_assert!(chunk_size > 0);
    let mut lo = min_key;
    std::iter::from_fn(move || {
        if lo > max_key {
            return None;
        }
        let chunk = Chunk {
            lo,
            hi: lo.saturating_add(chunk_size),
        };
        lo = chunk.hi;
        Some(chunk)
    })
}
