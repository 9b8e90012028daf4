//! Akshara - character-level BPE tokenizer for cleaned Devanagari corpora
//!
//! A vocabulary builder and tokenizer featuring:
//! - Deterministic BPE training with a documented tie-break (highest
//!   count, then numerically smallest pair)
//! - Character-level symbols, so merges and `<unk>` fallback always align
//!   to whole Unicode scalar values
//! - Rayon parallelism for pair counting, merge rewriting, and batch
//!   encoding
//! - FxHashMap for fast lookups
//! - Aho-Corasick matching for placeholder markers (`<num>`, `<eng>`)
//! - LRU cache for repeated word encodings
//! - A replayable text artifact that reconstructs the exact trained model
//!
//! Training consumes a cleaned, whitespace-delimited UTF-8 corpus and
//! produces a [`Model`] plus [`TrainingStats`]; the [`Tokenizer`] holds
//! only the immutable model and segments new text with longest-match
//! greedy scanning, degrading unseen characters to `<unk>`.
//!
//! ```no_run
//! use akshara::{Tokenizer, Trainer, TrainerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let trainer = Trainer::new(TrainerConfig {
//!     target_vocab_size: 8_000,
//!     ..TrainerConfig::default()
//! });
//! let output = trainer.train_from_file("data/corpus.txt")?;
//! println!("compression: {:.2}", output.stats.compression_ratio());
//!
//! output.model.save_to_file("model.akshara")?;
//! let tokenizer = Tokenizer::new(output.model)?;
//! let ids = tokenizer.encode("अच्छा <num> दिन");
//! # Ok(())
//! # }
//! ```

pub mod core;
#[cfg(feature = "python")]
mod python;

pub use crate::core::{
    markers, ArtifactError, Corpus, CorpusError, MergeRule, Model, StopReason, SymbolError,
    SymbolTable, Tokenizer, TokenizerError, TrainError, Trainer, TrainerConfig, TrainingOutput,
    TrainingStats, Word,
};
