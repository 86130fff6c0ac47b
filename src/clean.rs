use itertools::Itertools;

use crate::correlate::MatchTriple;

/// Sorts by old opcode, drops low-confidence pairs, and collapses duplicate
/// `(old, new)` opcode pairs down to the first occurrence after sorting.
/// Dedup is order-based, not score-maximizing: a later duplicate with a
/// higher score is still the one removed.
pub fn clean(mut triples: Vec<MatchTriple<'_>>, threshold_percent: u32) -> Vec<MatchTriple<'_>> {
    triples.sort_by_key(|t| t.old.opcode);

    triples
        .into_iter()
        .filter(|t| t.score >= threshold_percent as f64)
        .unique_by(|t| (t.old.opcode, t.new.opcode))
        .collect()
}
