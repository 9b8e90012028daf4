//! Adjacent-pair frequency counting and in-place merge rewriting.
//!
//! Both operations are embarrassingly parallel across words — a merge never
//! crosses a word boundary, so each word's contribution is independent.
//! Counting fans out with rayon and reduces per-word maps by summation;
//! rewriting mutates each word's ID sequence in place. The training loop
//! recounts from scratch after every merge, which is always equivalent to
//! an incremental update and has no stale-count states to reason about.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::corpus::Word;

/// An adjacent symbol pair: left immediately followed by right.
pub(crate) type Pair = (u32, u32);

/// Count every adjacent pair across all words, weighted by word count.
///
/// Words shorter than two symbols contribute nothing.
pub(crate) fn count_pairs(words: &[Word]) -> FxHashMap<Pair, u64> {
    words
        .par_iter()
        .map(|word| {
            let mut local: FxHashMap<Pair, u64> = FxHashMap::default();
            if word.ids.len() < 2 {
                return local;
            }
            let mut prev = word.ids[0];
            for &current in &word.ids[1..] {
                *local.entry((prev, current)).or_insert(0) += word.count;
                prev = current;
            }
            local
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (pair, count) in local {
                *acc.entry(pair).or_insert(0) += count;
            }
            acc
        })
}

/// Select the pair with the strictly highest count.
///
/// Ties break to the numerically smallest `(left, right)` pair. Initial IDs
/// are assigned in a fixed order (markers first, then characters by
/// codepoint), so this rule is deterministic across runs; map iteration
/// order never decides the winner.
pub(crate) fn best_pair(counts: &FxHashMap<Pair, u64>) -> Option<(Pair, u64)> {
    counts
        .iter()
        .map(|(&pair, &count)| (pair, count))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
}

/// Replace every non-overlapping occurrence of `pair` with `new_id`.
///
/// Each word is scanned left to right; a match consumes both positions, so
/// `(a, a)` over `a a a` merges the left pair and leaves the third symbol
/// alone. Returns the total occurrences replaced, weighted by word count —
/// zero means the merge made no progress.
pub(crate) fn apply_merge(words: &mut [Word], pair: Pair, new_id: u32) -> u64 {
    words
        .par_iter_mut()
        .map(|word| {
            if word.ids.len() < 2 {
                return 0;
            }
            let mut hits = 0u64;
            let mut out = Vec::with_capacity(word.ids.len());
            let mut i = 0;
            while i < word.ids.len() {
                if i + 1 < word.ids.len() && word.ids[i] == pair.0 && word.ids[i + 1] == pair.1 {
                    out.push(new_id);
                    hits += 1;
                    i += 2;
                } else {
                    out.push(word.ids[i]);
                    i += 1;
                }
            }
            if hits > 0 {
                word.ids = out;
            }
            hits * word.count
        })
        .sum()
}
