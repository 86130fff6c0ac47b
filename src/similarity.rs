// Approximate string matching based on Levenshtein distance.
//
// Decompiled handler bodies can run to hundreds of kilobytes; a full DP table
// over two of those is not feasible, so anything longer than BLOCK_SIZE is
// compared block-by-block and the per-block distances are summed. The result
// is an approximation, accepted for the sake of bounded memory and time.

const BLOCK_SIZE: usize = 12000;

/// Ratio in [0, 1] measuring how similar two strings are. Both strings empty
/// counts as identical. Above BLOCK_SIZE the chunked approximation kicks in;
/// its result is reported as computed, without clamping.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (longer, shorter) = if a.len() < b.len() {
        (b.as_bytes(), a.as_bytes())
    } else {
        (a.as_bytes(), b.as_bytes())
    };

    let longer_len = longer.len();
    if longer_len == 0 {
        return 1.0;
    }

    if longer_len <= BLOCK_SIZE {
        return (longer_len - edit_distance(longer, shorter)) as f64 / longer_len as f64;
    }

    let long_blocks: Vec<&[u8]> = blocks(longer);
    let short_blocks: Vec<&[u8]> = blocks(shorter);

    let mut total_distance = 0usize;
    for (long, short) in long_blocks.iter().zip(&short_blocks) {
        total_distance += edit_distance(long, short);
    }
    if long_blocks.len() > short_blocks.len() {
        // Everything in the longer string past the compared blocks counts
        // fully against the similarity.
        total_distance += longer_len - short_blocks.len() * BLOCK_SIZE;
    }

    (longer_len as f64 - total_distance as f64) / longer_len as f64
}

// A length that is an exact multiple of BLOCK_SIZE yields a trailing empty
// block; the block count is always len / BLOCK_SIZE + 1.
fn blocks(s: &[u8]) -> Vec<&[u8]> {
    let count = s.len() / BLOCK_SIZE + 1;
    (0..count)
        .map(|i| &s[i * BLOCK_SIZE..s.len().min((i + 1) * BLOCK_SIZE)])
        .collect()
}

/// Classic edit distance: insertion, deletion and substitution each cost 1.
pub fn edit_distance(s: &[u8], t: &[u8]) -> usize {
    if s.is_empty() {
        return t.len();
    }
    if t.is_empty() {
        return s.len();
    }

    let mut prev: Vec<usize> = (0..=t.len()).collect();
    let mut row = vec![0usize; t.len() + 1];

    for (i, &sc) in s.iter().enumerate() {
        row[0] = i + 1;
        for (j, &tc) in t.iter().enumerate() {
            let cost = usize::from(sc != tc);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }

    prev[t.len()]
}
