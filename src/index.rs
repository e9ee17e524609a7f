//! Leadership index calculation
//!
//! The index is the largest `u` such that `u` publications each have at
//! least `u` citations. Callers decide which publications count (the
//! pipeline passes only first/last-author papers).

/// Compute the index over a set of citation counts.
///
/// Input order does not matter; counts are ranked here.
pub fn compute_index(citation_counts: &[u64]) -> usize {
    if citation_counts.is_empty() {
        return 0;
    }

    let mut ranked = citation_counts.to_vec();
    ranked.sort_unstable_by(|a, b| b.cmp(a));

    let mut index = 0;
    for (i, &count) in ranked.iter().enumerate() {
        let rank = i + 1;
        // Sorted descending: once a rank fails, every later rank fails too
        if count >= rank as u64 {
            index = rank;
        } else {
            break;
        }
    }

    index
}
