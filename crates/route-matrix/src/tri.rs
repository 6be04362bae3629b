//! Triangular indexing for symmetric pairwise values
//!
//! One canonical slot per unordered pair `(i, j)`, `i != j`. Row `i` holds the
//! pairs `(i, 0) .. (i, i - 1)` in a contiguous run starting at `row_start(i)`.

/// Slot of the unordered pair `(i, j)`
#[inline]
pub fn tri_index(i: usize, j: usize) -> usize {
    debug_assert_ne!(i, j, "diagonal has no slot");
    let (i, j) = if i >= j { (i, j) } else { (j, i) };
    i * (i + 1) / 2 - i + j
}

/// Number of slots needed for `n` relays
#[inline]
pub fn tri_len(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// First slot of row `i`
#[inline]
pub fn row_start(i: usize) -> usize {
    i * i.saturating_sub(1) / 2
}
