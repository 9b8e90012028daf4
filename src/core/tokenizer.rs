//! Inference tokenizer over a trained model.
//!
//! Segmentation is longest-match greedy over the final surface vocabulary:
//! within each whitespace-delimited word, the longest registered surface
//! starting at the current character wins; when nothing matches, the word
//! degrades to `<unk>` for that character and the scan advances by one.
//! This policy is re-derivable from the surface vocabulary alone, so a
//! tokenizer built from a persisted artifact reproduces training-time
//! segmentation exactly.
//!
//! Placeholder markers embedded in the input (`<num>`, `<eng>`, …) are
//! lifted out with an Aho-Corasick pass before longest-match runs on the
//! remaining segments, mirroring how the corpus encoder treats them as
//! atomic symbols during training.
//!
//! The trained model is immutable; the tokenizer is `Send + Sync` and the
//! only interior mutability is the per-word LRU cache behind a `Mutex`.
//! Independent documents encode in parallel via the batch methods; a
//! single document is strictly sequential left to right.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use aho_corasick::AhoCorasick;
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::FxHasher;
use thiserror::Error;

use super::model::{ArtifactError, Model};
use super::symbols::markers;

/// Default capacity of the per-word encode cache.
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Errors raised while building a tokenizer or decoding IDs.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("marker matcher build failed: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
    #[error("model defines no {} marker", markers::UNK)]
    MissingUnk,
    #[error("unknown token id: {0}")]
    UnknownId(u32),
}

/// Longest-match tokenizer over an immutable trained model.
pub struct Tokenizer {
    model: Model,
    matcher: AhoCorasick,
    /// Special ID for each matcher pattern, in pattern order.
    marker_ids: Vec<u32>,
    unk_id: u32,
    /// Longest surface length in characters; bounds the match scan.
    max_surface_chars: usize,
    cache: Mutex<LruCache<u64, Vec<u32>>>,
    cache_size: usize,
}

impl Tokenizer {
    /// Build a tokenizer from a trained model.
    pub fn new(model: Model) -> Result<Self, TokenizerError> {
        Self::with_cache_size(model, DEFAULT_CACHE_SIZE)
    }

    /// Build a tokenizer with a custom encode-cache capacity.
    pub fn with_cache_size(model: Model, cache_size: usize) -> Result<Self, TokenizerError> {
        let unk_id = model.unk_id().ok_or(TokenizerError::MissingUnk)?;

        let marker_surfaces = model.special_surfaces().to_vec();
        let matcher = AhoCorasick::new(&marker_surfaces)?;
        let marker_ids = marker_surfaces
            .iter()
            .filter_map(|surface| model.id_of(surface))
            .collect();

        let max_surface_chars = model
            .surfaces()
            .iter()
            .map(|surface| surface.chars().count())
            .max()
            .unwrap_or(0);

        let cache_size_nz = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Ok(Self {
            model,
            matcher,
            marker_ids,
            unk_id,
            max_surface_chars,
            cache: Mutex::new(LruCache::new(cache_size_nz)),
            cache_size,
        })
    }

    /// Load a model artifact and build a tokenizer from it.
    pub fn from_model_file<P: AsRef<Path>>(path: P) -> Result<Self, TokenizerError> {
        let model = Model::load_from_file(path)?;
        Self::new(model)
    }

    /// The underlying trained model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Total distinct symbols the tokenizer can emit.
    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    /// ID of the `<unk>` fallback marker.
    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    /// Encode text into a flat ID sequence.
    ///
    /// Words are split on Unicode whitespace and encoded independently;
    /// the word boundaries themselves are not represented in the output.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .flat_map(|word| self.encode_word(word))
            .collect()
    }

    /// Encode text into one ID sequence per whitespace-delimited word.
    pub fn encode_words(&self, text: &str) -> Vec<Vec<u32>> {
        text.split_whitespace()
            .map(|word| self.encode_word(word))
            .collect()
    }

    /// Encode many texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Decode IDs by concatenating their surfaces.
    ///
    /// An ID outside the vocabulary is an error; inputs produced by
    /// [`Tokenizer::encode`] always decode.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let mut out = String::new();
        for &id in ids {
            match self.model.surface(id) {
                Ok(surface) => out.push_str(surface),
                Err(_) => return Err(TokenizerError::UnknownId(id)),
            }
        }
        Ok(out)
    }

    /// Decode IDs, rendering out-of-vocabulary IDs as the `<unk>` marker.
    pub fn decode_lossy(&self, ids: &[u32]) -> String {
        let mut out = String::new();
        for &id in ids {
            match self.model.surface(id) {
                Ok(surface) => out.push_str(surface),
                Err(_) => out.push_str(markers::UNK),
            }
        }
        out
    }

    /// Decode many ID sequences in parallel.
    pub fn decode_batch(&self, batches: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        batches.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Number of cached word encodings.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Drop all cached word encodings.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Encode one word through the cache.
    fn encode_word(&self, word: &str) -> Vec<u32> {
        let hash = hash_word(word);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                return cached.clone();
            }
        }

        let mut ids = Vec::new();
        let mut last_end = 0;
        for m in self.matcher.find_iter(word) {
            self.encode_segment(&word[last_end..m.start()], &mut ids);
            ids.push(self.marker_ids[m.pattern().as_usize()]);
            last_end = m.end();
        }
        self.encode_segment(&word[last_end..], &mut ids);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(hash, ids.clone());
        }
        ids
    }

    /// Longest-match greedy scan over one marker-free segment.
    fn encode_segment(&self, segment: &str, ids: &mut Vec<u32>) {
        if segment.is_empty() {
            return;
        }
        let chars: Vec<usize> = segment.char_indices().map(|(i, _)| i).collect();
        let mut pos = 0;
        while pos < chars.len() {
            let start = chars[pos];
            let longest = (chars.len() - pos).min(self.max_surface_chars);
            let mut matched = None;
            for len in (1..=longest).rev() {
                let end = chars.get(pos + len).copied().unwrap_or(segment.len());
                if let Some(id) = self.model.id_of(&segment[start..end]) {
                    matched = Some((id, len));
                    break;
                }
            }
            match matched {
                Some((id, len)) => {
                    ids.push(id);
                    pos += len;
                }
                None => {
                    ids.push(self.unk_id);
                    pos += 1;
                }
            }
        }
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // The matcher and cache are rebuilt; both constructions already
        // succeeded for this model once.
        Self::with_cache_size(self.model.clone(), self.cache_size)
            .expect("cloning an already-validated tokenizer")
    }
}

fn hash_word(word: &str) -> u64 {
    let mut hasher = FxHasher::default();
    word.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::MergeRule;
    use crate::core::symbols::SymbolTable;

    /// Markers plus अ, ब, क and the merged symbol अब.
    fn test_tokenizer() -> Tokenizer {
        let mut symbols = SymbolTable::new();
        for marker in markers::default_markers() {
            symbols.add(&marker);
        }
        let a = symbols.add("अ");
        let b = symbols.add("ब");
        symbols.add("क");
        let merged = symbols.add("अब");
        let model = Model::new(
            symbols,
            6,
            vec![MergeRule {
                left: a,
                right: b,
                new_id: merged,
            }],
        );
        Tokenizer::new(model).unwrap()
    }

    #[test]
    fn test_longest_match_wins() {
        let tokenizer = test_tokenizer();
        // "अब" is one symbol, not two characters.
        assert_eq!(tokenizer.encode("अब"), vec![9]);
        // "अबक" = merged + क.
        assert_eq!(tokenizer.encode("अबक"), vec![9, 8]);
    }

    #[test]
    fn test_unseen_character_degrades_to_unk() {
        let tokenizer = test_tokenizer();
        let unk = tokenizer.unk_id();
        assert_eq!(tokenizer.encode("अxब"), vec![6, unk, 7]);
    }

    #[test]
    fn test_markers_are_atomic() {
        let tokenizer = test_tokenizer();
        let num = tokenizer.model().id_of(markers::NUM).unwrap();
        assert_eq!(tokenizer.encode("अ<num>ब"), vec![6, num, 7]);
    }

    #[test]
    fn test_whitespace_separates_words() {
        let tokenizer = test_tokenizer();
        assert_eq!(tokenizer.encode("अ ब"), vec![6, 7]);
        assert_eq!(tokenizer.encode_words("अ ब"), vec![vec![6], vec![7]]);
    }

    #[test]
    fn test_empty_input() {
        let tokenizer = test_tokenizer();
        assert!(tokenizer.encode("").is_empty());
        assert!(tokenizer.encode("   ").is_empty());
    }

    #[test]
    fn test_decode_round_trip() {
        let tokenizer = test_tokenizer();
        let ids = tokenizer.encode("अबक");
        assert_eq!(tokenizer.decode(&ids).unwrap(), "अबक");
    }

    #[test]
    fn test_decode_unknown_id_errors() {
        let tokenizer = test_tokenizer();
        let err = tokenizer.decode(&[999]).unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownId(999)));
    }

    #[test]
    fn test_decode_lossy_renders_unk() {
        let tokenizer = test_tokenizer();
        assert_eq!(
            tokenizer.decode_lossy(&[6, 999]),
            format!("अ{}", markers::UNK)
        );
    }

    #[test]
    fn test_cache_fills_and_clears() {
        let tokenizer = test_tokenizer();
        tokenizer.encode("अब अब कक");
        assert!(tokenizer.cache_len() > 0);
        tokenizer.clear_cache();
        assert_eq!(tokenizer.cache_len(), 0);
    }

    #[test]
    fn test_batch_matches_sequential() {
        let tokenizer = test_tokenizer();
        let texts = vec!["अब क".to_string(), "ब अ".to_string()];
        let batch = tokenizer.encode_batch(&texts);
        assert_eq!(batch[0], tokenizer.encode(&texts[0]));
        assert_eq!(batch[1], tokenizer.encode(&texts[1]));
    }

    #[test]
    fn test_missing_unk_marker_is_rejected() {
        let mut symbols = SymbolTable::new();
        symbols.add("<pad>");
        let model = Model::new(symbols, 1, Vec::new());
        assert!(matches!(
            Tokenizer::new(model),
            Err(TokenizerError::MissingUnk)
        ));
    }
}
