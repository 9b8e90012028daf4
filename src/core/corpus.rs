//! Corpus loading and initial encoding.
//!
//! The input contract is a cleaned UTF-8 text corpus: whitespace-delimited
//! words over the target script, with digit and Latin runs already replaced
//! by bracketed placeholder markers (`<num>`, `<eng>`). Loading streams the
//! file line by line so memory is bounded by the number of *distinct* words
//! rather than the corpus length; the reader is scoped to the load call and
//! released on return.
//!
//! Encoding turns each distinct word into a sequence of symbol IDs — one ID
//! per character, except that placeholder markers embedded in a word map
//! atomically to their special ID. Merges later operate on these sequences
//! and never cross a word boundary.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use aho_corasick::AhoCorasick;
use log::warn;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::symbols::SymbolTable;

/// Errors raised while loading a corpus file.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("corpus file not found: {0}")]
    NotFound(PathBuf),
    #[error("corpus file unreadable: {0}")]
    Unreadable(#[from] std::io::Error),
}

/// One distinct corpus word as an in-place-rewritable ID sequence.
///
/// `count` is the number of times the word occurred in the corpus; all
/// pair frequencies are weighted by it, which is arithmetically identical
/// to scanning every occurrence separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub ids: Vec<u32>,
    pub count: u64,
}

impl Word {
    /// Total symbol occurrences this word contributes to the corpus.
    pub fn token_count(&self) -> u64 {
        self.ids.len() as u64 * self.count
    }
}

/// A cleaned corpus, deduplicated into distinct words with multiplicities.
///
/// Distinct words keep their first-seen order; nothing downstream depends
/// on that order, but it makes corpus dumps stable and diffable.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    words: Vec<(String, u64)>,
}

impl Corpus {
    /// Load a corpus from a file with a streaming, line-buffered read.
    ///
    /// A missing file is [`CorpusError::NotFound`]; any other I/O failure
    /// is [`CorpusError::Unreadable`]. An empty file loads successfully as
    /// an empty corpus (training warns and converges with markers only).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorpusError::NotFound(path.to_path_buf())
            } else {
                CorpusError::Unreadable(e)
            }
        })?;

        let mut counts: FxHashMap<String, u64> = FxHashMap::default();
        let mut order: Vec<String> = Vec::new();
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            Self::count_words(&line, &mut counts, &mut order);
        }

        Ok(Self::from_counts(counts, order))
    }

    /// Build a corpus from in-memory text.
    pub fn from_text(text: &str) -> Self {
        let mut counts: FxHashMap<String, u64> = FxHashMap::default();
        let mut order: Vec<String> = Vec::new();
        Self::count_words(text, &mut counts, &mut order);
        Self::from_counts(counts, order)
    }

    fn count_words(text: &str, counts: &mut FxHashMap<String, u64>, order: &mut Vec<String>) {
        for word in text.split_whitespace() {
            match counts.get_mut(word) {
                Some(count) => *count += 1,
                None => {
                    counts.insert(word.to_string(), 1);
                    order.push(word.to_string());
                }
            }
        }
    }

    fn from_counts(mut counts: FxHashMap<String, u64>, order: Vec<String>) -> Self {
        let words = order
            .into_iter()
            .map(|word| {
                let count = counts.remove(&word).unwrap_or(0);
                (word, count)
            })
            .collect();
        Self { words }
    }

    /// Whether the corpus holds no words at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of distinct words.
    pub fn distinct_words(&self) -> usize {
        self.words.len()
    }

    /// Total word occurrences across the corpus.
    pub fn total_words(&self) -> u64 {
        self.words.iter().map(|(_, count)| count).sum()
    }

    /// Register every corpus character in the table, sorted by codepoint.
    ///
    /// Characters covered by a placeholder marker are part of the marker's
    /// atomic symbol and are not registered on their own. Sorting makes the
    /// initial ID assignment independent of word order.
    pub fn register_characters(&self, table: &mut SymbolTable, matcher: &AhoCorasick) {
        let mut chars: BTreeSet<char> = BTreeSet::new();
        for (word, _) in &self.words {
            for segment in split_outside_markers(word, matcher) {
                chars.extend(segment.chars());
            }
        }
        for ch in chars {
            table.add(ch.encode_utf8(&mut [0u8; 4]));
        }
    }

    /// Encode every distinct word into a symbol ID sequence.
    ///
    /// Marker occurrences map to their special IDs; every other character
    /// maps to its own symbol. Characters are expected to be pre-registered
    /// via [`Corpus::register_characters`], and `add` keeps encoding total
    /// even if one slipped past (the table simply grows).
    pub fn encode(&self, table: &mut SymbolTable, matcher: &AhoCorasick) -> Vec<Word> {
        if self.is_empty() {
            warn!("corpus is empty; no words to encode");
            return Vec::new();
        }

        self.words
            .iter()
            .map(|(word, count)| {
                let mut ids = Vec::with_capacity(word.chars().count());
                let mut last_end = 0;
                for m in matcher.find_iter(word) {
                    for ch in word[last_end..m.start()].chars() {
                        ids.push(table.add(ch.encode_utf8(&mut [0u8; 4])));
                    }
                    ids.push(table.add(&word[m.start()..m.end()]));
                    last_end = m.end();
                }
                for ch in word[last_end..].chars() {
                    ids.push(table.add(ch.encode_utf8(&mut [0u8; 4])));
                }
                Word { ids, count: *count }
            })
            .collect()
    }
}

/// Yield the substrings of `word` not covered by a marker match.
fn split_outside_markers<'a>(word: &'a str, matcher: &AhoCorasick) -> Vec<&'a str> {
    let mut segments = Vec::new();
    let mut last_end = 0;
    for m in matcher.find_iter(word) {
        if m.start() > last_end {
            segments.push(&word[last_end..m.start()]);
        }
        last_end = m.end();
    }
    if last_end < word.len() {
        segments.push(&word[last_end..]);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::markers;

    fn marker_matcher() -> AhoCorasick {
        AhoCorasick::new(markers::default_markers()).unwrap()
    }

    #[test]
    fn test_from_text_counts_words() {
        let corpus = Corpus::from_text("अब अब कल");
        assert_eq!(corpus.distinct_words(), 2);
        assert_eq!(corpus.total_words(), 3);
    }

    #[test]
    fn test_empty_text_is_empty_corpus() {
        let corpus = Corpus::from_text("   \n\t ");
        assert!(corpus.is_empty());
        assert_eq!(corpus.total_words(), 0);
    }

    #[test]
    fn test_register_characters_sorted_by_codepoint() {
        let corpus = Corpus::from_text("ब अ");
        let mut table = SymbolTable::new();
        corpus.register_characters(&mut table, &marker_matcher());
        // अ (U+0905) sorts before ब (U+092C) regardless of corpus order.
        assert_eq!(table.surface_of(0), Ok("अ"));
        assert_eq!(table.surface_of(1), Ok("ब"));
    }

    #[test]
    fn test_encode_per_character() {
        let corpus = Corpus::from_text("अब अ");
        let mut table = SymbolTable::new();
        let matcher = marker_matcher();
        corpus.register_characters(&mut table, &matcher);
        let words = corpus.encode(&mut table, &matcher);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].ids.len(), 2);
        assert_eq!(words[1].ids.len(), 1);
        assert_eq!(words[0].count, 1);
    }

    #[test]
    fn test_encode_marker_is_atomic() {
        let corpus = Corpus::from_text("अ <num> <num>");
        let mut table = SymbolTable::new();
        let matcher = marker_matcher();
        let num_id = table.add(markers::NUM);
        corpus.register_characters(&mut table, &matcher);
        let words = corpus.encode(&mut table, &matcher);
        // "<num>" is one symbol, not five characters, and none of the
        // bracket characters leak into the table.
        assert_eq!(words[1].ids, vec![num_id]);
        assert_eq!(words[1].count, 2);
        assert!(!table.contains("<"));
        assert!(!table.contains("n"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Corpus::from_file("/nonexistent/corpus.txt").unwrap_err();
        assert!(matches!(err, CorpusError::NotFound(_)));
    }

    #[test]
    fn test_word_token_count_is_weighted() {
        let word = Word {
            ids: vec![0, 1, 2],
            count: 4,
        };
        assert_eq!(word.token_count(), 12);
    }
}
