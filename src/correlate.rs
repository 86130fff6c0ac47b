use tracing::{debug, warn};

use crate::extract::FunctionRecord;
use crate::similarity::similarity;

/// A numeric opcode tied to the function that implements it. Several entries
/// may reference the same record (multiple call sites or branch arms).
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry<'a> {
    pub opcode: u32,
    pub function: Option<&'a FunctionRecord>,
}

/// One proposed old-to-new opcode correspondence, scored in percent.
#[derive(Debug, Clone, Copy)]
pub struct MatchTriple<'a> {
    pub old: OpcodeEntry<'a>,
    pub new: OpcodeEntry<'a>,
    pub score: f64,
}

// The fixed +2 gives low opcodes some leeway where the percentage term
// truncates to nothing.
pub(crate) fn within_variance(base: u32, candidate: u32, variance_percent: u32) -> bool {
    let slack = (base as f64 * (variance_percent as f64 / 100.0)) as i64 + 2;
    let candidate = candidate as i64;
    candidate >= base as i64 - slack && candidate <= base as i64 + slack
}

/// Pairs every old entry with the candidate inside its variance window whose
/// function body scores highest. Entries with an empty window are dropped.
///
/// The running best starts at score 0 on the first candidate, so a window
/// where nothing scores above zero still selects its first candidate. Treat
/// zero-score pairs with suspicion when reading the reports.
pub fn correlate<'a>(
    old_entries: &[OpcodeEntry<'a>],
    new_entries: &[OpcodeEntry<'a>],
    variance_percent: u32,
) -> Vec<MatchTriple<'a>> {
    let mut paired = Vec::new();

    for old in old_entries {
        let candidates: Vec<&OpcodeEntry<'a>> = new_entries
            .iter()
            .filter(|new| within_variance(old.opcode, new.opcode, variance_percent))
            .collect();

        if candidates.is_empty() {
            warn!(opcode = old.opcode, "no candidate within variance window");
            continue;
        }

        let mut best_index = 0usize;
        let mut best_score = 0f64;
        for (index, candidate) in candidates.iter().enumerate() {
            let (Some(old_function), Some(new_function)) = (old.function, candidate.function)
            else {
                continue;
            };

            let score = similarity(&old_function.body, &new_function.body) * 100.0;
            if score > best_score {
                best_index = index;
                best_score = score;
            }
        }

        let selected = *candidates[best_index];
        debug!(
            old = old.opcode,
            new = selected.opcode,
            score = best_score,
            "marked opcode pair"
        );

        paired.push(MatchTriple {
            old: *old,
            new: selected,
            score: best_score,
        });
    }

    paired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, body: &str) -> FunctionRecord {
        FunctionRecord {
            start_line: 1,
            short_name: name.to_string(),
            declaration: String::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn variance_window_bounds_are_inclusive() {
        // 100 at 15% reaches 15 + 2 either way.
        assert!(within_variance(100, 83, 15));
        assert!(within_variance(100, 117, 15));
        assert!(!within_variance(100, 82, 15));
        assert!(!within_variance(100, 118, 15));

        // Low opcodes survive on the fixed leeway alone.
        assert!(within_variance(3, 5, 15));
        assert!(!within_variance(3, 6, 15));
    }

    #[test]
    fn best_scoring_candidate_wins() {
        let old_fn = record("OnFoo", "aaaa bbbb cccc");
        let close = record("OnFoo", "aaaa bbbb cccd");
        let far = record("OnBar", "zzzz yyyy xxxx");

        let old = [OpcodeEntry { opcode: 100, function: Some(&old_fn) }];
        let new = [
            OpcodeEntry { opcode: 99, function: Some(&far) },
            OpcodeEntry { opcode: 101, function: Some(&close) },
        ];

        let paired = correlate(&old, &new, 15);
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].new.opcode, 101);
        assert!(paired[0].score > 90.0);
    }

    #[test]
    fn empty_window_drops_the_entry() {
        let old_fn = record("OnFoo", "aaaa");
        let new_fn = record("OnFoo", "aaaa");

        let old = [OpcodeEntry { opcode: 100, function: Some(&old_fn) }];
        let new = [OpcodeEntry { opcode: 200, function: Some(&new_fn) }];

        assert!(correlate(&old, &new, 15).is_empty());
    }

    #[test]
    fn first_candidate_kept_when_all_scores_zero() {
        // No candidate has a body to score against, so the strict `>` never
        // fires and index 0 is force-selected with score 0.
        let old_fn = record("OnFoo", "aaaa");

        let old = [OpcodeEntry { opcode: 100, function: Some(&old_fn) }];
        let new = [
            OpcodeEntry { opcode: 98, function: None },
            OpcodeEntry { opcode: 99, function: None },
        ];

        let paired = correlate(&old, &new, 15);
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].new.opcode, 98);
        assert_eq!(paired[0].score, 0.0);
    }

    #[test]
    fn old_entry_without_function_is_never_scored() {
        let new_fn = record("OnFoo", "aaaa");

        let old = [OpcodeEntry { opcode: 100, function: None }];
        let new = [
            OpcodeEntry { opcode: 99, function: Some(&new_fn) },
            OpcodeEntry { opcode: 100, function: Some(&new_fn) },
        ];

        let paired = correlate(&old, &new, 15);
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].new.opcode, 99);
        assert_eq!(paired[0].score, 0.0);
    }
}
