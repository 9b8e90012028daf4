//! Vocabulary training: the merge engine and its driving state machine.
//!
//! Training walks `Initializing → Training → Converged`. Initialization
//! registers the special markers in configured order, registers every
//! corpus character sorted by codepoint, and encodes the corpus into
//! per-word ID sequences. Each training iteration then recounts adjacent
//! pairs, selects the most frequent one (ties to the numerically smallest
//! pair), mints a symbol for the concatenated surface, records the merge
//! rule, and rewrites every occurrence. The loop converges when the target
//! vocabulary size is reached, no pairs remain, a merge makes no progress,
//! or an external cancellation flag is raised between iterations.
//!
//! Each merge changes the frequency landscape the next selection depends
//! on, so iterations are inherently sequential; the per-iteration work
//! parallelizes across words (see the `pairs` module).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use aho_corasick::AhoCorasick;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::corpus::{Corpus, CorpusError, Word};
use super::model::{MergeRule, Model};
use super::pairs::{apply_merge, best_pair, count_pairs};
use super::stats::{StopReason, TrainingStats};
use super::symbols::{markers, SymbolTable};

/// Errors raised before or during training.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("marker matcher build failed: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Upper bound on total distinct symbols, markers and characters
    /// included. If initialization alone meets it, no merges run.
    pub target_vocab_size: usize,
    /// Special marker surfaces, registered first in this order. Must be
    /// duplicate-free and contain the `<unk>` marker.
    pub special_tokens: Vec<String>,
    /// Log a progress line every this many merges; 0 disables.
    pub log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            target_vocab_size: 50_000,
            special_tokens: markers::default_markers(),
            log_interval: 500,
        }
    }
}

/// Everything a finished training run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    pub model: Model,
    pub stats: TrainingStats,
}

/// Phases of the vocabulary builder. `Converged` is terminal.
enum BuilderState {
    Initializing,
    Training,
    Converged(StopReason),
}

/// Learns a BPE vocabulary from a cleaned corpus.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Create a trainer with the given configuration.
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// The trainer's configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Load a corpus file and train on it.
    pub fn train_from_file<P: AsRef<Path>>(&self, path: P) -> Result<TrainingOutput, TrainError> {
        let corpus = Corpus::from_file(path)?;
        self.train(&corpus)
    }

    /// Train on in-memory text.
    pub fn train_from_text(&self, text: &str) -> Result<TrainingOutput, TrainError> {
        self.train(&Corpus::from_text(text))
    }

    /// Train on an already-loaded corpus.
    pub fn train(&self, corpus: &Corpus) -> Result<TrainingOutput, TrainError> {
        self.run(corpus, None)
    }

    /// Train with an external cancellation flag.
    ///
    /// The flag is checked between merge iterations; a run cancelled after
    /// `n` merges returns a valid model holding those `n` rules, with
    /// [`StopReason::Cancelled`] in its stats.
    pub fn train_with_cancel(
        &self,
        corpus: &Corpus,
        cancel: &AtomicBool,
    ) -> Result<TrainingOutput, TrainError> {
        self.run(corpus, Some(cancel))
    }

    fn run(
        &self,
        corpus: &Corpus,
        cancel: Option<&AtomicBool>,
    ) -> Result<TrainingOutput, TrainError> {
        self.validate_config()?;
        let matcher = AhoCorasick::new(&self.config.special_tokens)?;

        let mut symbols = SymbolTable::new();
        let mut words: Vec<Word> = Vec::new();
        let mut merges: Vec<MergeRule> = Vec::new();
        let mut initial_vocab_size = 0;
        let mut initial_token_count = 0;

        let mut state = BuilderState::Initializing;
        let stop_reason = loop {
            state = match state {
                BuilderState::Initializing => {
                    for marker in &self.config.special_tokens {
                        symbols.add(marker);
                    }
                    corpus.register_characters(&mut symbols, &matcher);
                    words = corpus.encode(&mut symbols, &matcher);
                    if corpus.is_empty() {
                        warn!(
                            "training on an empty corpus; the model will hold only its {} markers \
                             and tokenize everything else to {}",
                            symbols.len(),
                            markers::UNK
                        );
                    }
                    initial_vocab_size = symbols.len();
                    initial_token_count = words.iter().map(Word::token_count).sum();
                    BuilderState::Training
                }

                BuilderState::Training => {
                    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                        BuilderState::Converged(StopReason::Cancelled)
                    } else if symbols.len() >= self.config.target_vocab_size {
                        BuilderState::Converged(StopReason::TargetReached)
                    } else {
                        let counts = count_pairs(&words);
                        match best_pair(&counts) {
                            None => BuilderState::Converged(StopReason::NoPairs),
                            Some((pair, count)) => {
                                self.merge_step(&mut symbols, &mut words, &mut merges, pair, count)
                            }
                        }
                    }
                }

                BuilderState::Converged(reason) => break reason,
            };
        };

        let final_token_count = words.iter().map(Word::token_count).sum();
        let stats = TrainingStats {
            initial_vocab_size,
            initial_token_count,
            final_vocab_size: symbols.len(),
            final_token_count,
            merges_applied: merges.len(),
            stop_reason,
        };
        info!(
            "training converged ({:?}): {} merges, vocab {}, compression {:.2}",
            stop_reason,
            stats.merges_applied,
            stats.final_vocab_size,
            stats.compression_ratio()
        );

        let special_count = self.config.special_tokens.len();
        Ok(TrainingOutput {
            model: Model::new(symbols, special_count, merges),
            stats,
        })
    }

    /// Apply one selected merge; returns the next builder state.
    fn merge_step(
        &self,
        symbols: &mut SymbolTable,
        words: &mut [Word],
        merges: &mut Vec<MergeRule>,
        pair: (u32, u32),
        count: u64,
    ) -> BuilderState {
        let surfaces = symbols.surfaces();
        let surface = format!(
            "{}{}",
            surfaces[pair.0 as usize], surfaces[pair.1 as usize]
        );

        // Two different pairs can concatenate to the same surface (e.g.
        // (a, bc) and (ab, c)). The table stays one-to-one: such a pair is
        // consolidated onto the existing ID without minting a new rule.
        let (new_id, fresh) = match symbols.id_of(&surface) {
            Some(existing) => (existing, false),
            None => (symbols.len() as u32, true),
        };

        let replaced = apply_merge(words, pair, new_id);
        if replaced == 0 {
            return BuilderState::Converged(StopReason::NoProgress);
        }

        if fresh {
            symbols.add(&surface);
            merges.push(MergeRule {
                left: pair.0,
                right: pair.1,
                new_id,
            });
            if self.config.log_interval > 0 && merges.len() % self.config.log_interval == 0 {
                info!(
                    "merge {:>6}: ({}, {}) -> {:?} freq {:>8} vocab {:>6}",
                    merges.len(),
                    pair.0,
                    pair.1,
                    surface,
                    count,
                    symbols.len()
                );
            }
        } else {
            debug!(
                "pair ({}, {}) re-derives existing symbol {:?}; consolidated without a new rule",
                pair.0, pair.1, surface
            );
        }

        BuilderState::Training
    }

    fn validate_config(&self) -> Result<(), TrainError> {
        if !self
            .config
            .special_tokens
            .iter()
            .any(|s| s == markers::UNK)
        {
            return Err(TrainError::InvalidConfig(format!(
                "special tokens must include the {} marker",
                markers::UNK
            )));
        }
        let mut seen = FxHashSet::default();
        for token in &self.config.special_tokens {
            if !seen.insert(token.as_str()) {
                return Err(TrainError::InvalidConfig(format!(
                    "duplicate special token {token:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer(target: usize) -> Trainer {
        Trainer::new(TrainerConfig {
            target_vocab_size: target,
            log_interval: 0,
            ..TrainerConfig::default()
        })
    }

    #[test]
    fn test_single_merge_reaches_target() {
        // 6 markers + 2 characters = 8 initial symbols; target 9 allows
        // exactly one merge.
        let out = trainer(9).train_from_text("अब अब अब").unwrap();
        assert_eq!(out.stats.initial_vocab_size, 8);
        assert_eq!(out.stats.final_vocab_size, 9);
        assert_eq!(out.stats.merges_applied, 1);
        assert_eq!(out.stats.stop_reason, StopReason::TargetReached);
        assert_eq!(out.model.surface(8), Ok("अब"));
    }

    #[test]
    fn test_merge_rule_records_operands() {
        let out = trainer(9).train_from_text("अब अब").unwrap();
        let rule = out.model.merges()[0];
        assert_eq!(out.model.surface(rule.left), Ok("अ"));
        assert_eq!(out.model.surface(rule.right), Ok("ब"));
        assert_eq!(rule.new_id, 8);
    }

    #[test]
    fn test_target_already_met_means_zero_merges() {
        let out = trainer(5).train_from_text("अब अब").unwrap();
        assert_eq!(out.stats.merges_applied, 0);
        assert_eq!(out.stats.stop_reason, StopReason::TargetReached);
    }

    #[test]
    fn test_exhausting_pairs_converges_early() {
        // A single two-character word has one pair; after merging it no
        // pairs remain, far short of the target.
        let out = trainer(1000).train_from_text("अब").unwrap();
        assert_eq!(out.stats.stop_reason, StopReason::NoPairs);
        assert_eq!(out.stats.merges_applied, 1);
        assert_eq!(out.stats.final_token_count, 1);
    }

    #[test]
    fn test_empty_corpus_converges_with_markers_only() {
        let out = trainer(100).train_from_text("").unwrap();
        assert_eq!(out.stats.initial_vocab_size, 6);
        assert_eq!(out.stats.final_vocab_size, 6);
        assert_eq!(out.stats.merges_applied, 0);
        assert_eq!(out.stats.compression_ratio(), 0.0);
        assert_eq!(out.stats.stop_reason, StopReason::NoPairs);
    }

    #[test]
    fn test_cancel_before_first_iteration() {
        let cancel = AtomicBool::new(true);
        let out = trainer(1000)
            .train_with_cancel(&Corpus::from_text("अब अब कब"), &cancel)
            .unwrap();
        assert_eq!(out.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(out.stats.merges_applied, 0);
    }

    #[test]
    fn test_config_requires_unk_marker() {
        let trainer = Trainer::new(TrainerConfig {
            special_tokens: vec!["<pad>".to_string()],
            ..TrainerConfig::default()
        });
        let err = trainer.train_from_text("अब").unwrap_err();
        assert!(matches!(err, TrainError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_duplicate_markers() {
        let trainer = Trainer::new(TrainerConfig {
            special_tokens: vec!["<unk>".to_string(), "<unk>".to_string()],
            ..TrainerConfig::default()
        });
        let err = trainer.train_from_text("अब").unwrap_err();
        assert!(matches!(err, TrainError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_corpus_file_propagates() {
        let err = trainer(100)
            .train_from_file("/nonexistent/corpus.txt")
            .unwrap_err();
        assert!(matches!(err, TrainError::Corpus(CorpusError::NotFound(_))));
    }
}
