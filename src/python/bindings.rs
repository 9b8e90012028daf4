//! Python bindings for the akshara tokenizer.
//!
//! This module provides PyO3 wrappers around the core Rust trainer and
//! tokenizer, exposing a Python-friendly API while keeping Rust
//! performance. The original system this crate grew out of was a Python
//! program; these bindings preserve that calling surface.
//!
//! # Thread Safety
//!
//! The tokenizer is thread-safe and can be shared across Python threads.
//! Batch operations use Rayon for true parallelism during Rust
//! computation.
//!
//! # Example
//!
//! ```python
//! from akshara import Trainer, Tokenizer
//!
//! trainer = Trainer(target_vocab_size=8000)
//! tokenizer, stats = trainer.train_file("data/hindi_corpus.txt")
//! print(stats["compression_ratio"])
//!
//! tokenizer.save_model("hindi.akshara")
//! tokenizer = Tokenizer.from_model_file("hindi.akshara")
//! ids = tokenizer.encode("अच्छा <num> दिन")
//! ```

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::core::{Tokenizer, TrainError, Trainer, TrainerConfig, TrainingStats};

/// Python wrapper for the Rust Trainer.
#[pyclass(name = "Trainer")]
pub struct PyTrainer {
    inner: Trainer,
}

#[pymethods]
impl PyTrainer {
    /// Create a trainer.
    ///
    /// Args:
    ///     target_vocab_size: Upper bound on total distinct symbols,
    ///         markers and characters included.
    ///     special_tokens: Optional marker list registered first, in
    ///         order; defaults to ``<pad> <eos> <bos> <unk> <num> <eng>``.
    ///     log_interval: Emit a log line every this many merges; 0 off.
    #[new]
    #[pyo3(signature = (target_vocab_size=50_000, special_tokens=None, log_interval=500))]
    fn new(
        target_vocab_size: usize,
        special_tokens: Option<Vec<String>>,
        log_interval: usize,
    ) -> Self {
        let defaults = TrainerConfig::default();
        let config = TrainerConfig {
            target_vocab_size,
            special_tokens: special_tokens.unwrap_or(defaults.special_tokens),
            log_interval,
        };
        Self {
            inner: Trainer::new(config),
        }
    }

    /// Train on in-memory text; returns ``(tokenizer, stats)``.
    fn train_text(&self, py: Python<'_>, text: &str) -> PyResult<(PyTokenizer, Py<PyDict>)> {
        let output = self.inner.train_from_text(text).map_err(train_err)?;
        let stats = stats_dict(py, &output.stats)?;
        let tokenizer = Tokenizer::new(output.model)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok((PyTokenizer { inner: tokenizer }, stats))
    }

    /// Train on a corpus file; returns ``(tokenizer, stats)``.
    fn train_file(&self, py: Python<'_>, path: &str) -> PyResult<(PyTokenizer, Py<PyDict>)> {
        let output = self.inner.train_from_file(path).map_err(train_err)?;
        let stats = stats_dict(py, &output.stats)?;
        let tokenizer = Tokenizer::new(output.model)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok((PyTokenizer { inner: tokenizer }, stats))
    }
}

/// Python wrapper for the Rust Tokenizer.
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    /// Load a tokenizer from a persisted model artifact.
    #[staticmethod]
    fn from_model_file(path: &str) -> PyResult<Self> {
        let inner =
            Tokenizer::from_model_file(path).map_err(|e| PyIOError::new_err(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encode text to a flat list of token IDs.
    fn encode(&self, text: &str) -> Vec<u32> {
        self.inner.encode(text)
    }

    /// Encode text to one ID list per whitespace-delimited word.
    fn encode_words(&self, text: &str) -> Vec<Vec<u32>> {
        self.inner.encode_words(text)
    }

    /// Encode a batch of texts in parallel.
    fn encode_batch(&self, texts: Vec<String>) -> Vec<Vec<u32>> {
        self.inner.encode_batch(&texts)
    }

    /// Decode token IDs back to text.
    fn decode(&self, ids: Vec<u32>) -> PyResult<String> {
        self.inner
            .decode(&ids)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Decode token IDs, rendering out-of-vocabulary IDs as ``<unk>``.
    fn decode_lossy(&self, ids: Vec<u32>) -> String {
        self.inner.decode_lossy(&ids)
    }

    /// Total distinct symbols in the vocabulary.
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    /// ID of the ``<unk>`` fallback marker.
    fn unk_id(&self) -> u32 {
        self.inner.unk_id()
    }

    /// Persist the underlying model artifact.
    fn save_model(&self, path: &str) -> PyResult<()> {
        self.inner
            .model()
            .save_to_file(path)
            .map_err(|e| PyIOError::new_err(e.to_string()))
    }
}

fn train_err(err: TrainError) -> PyErr {
    match err {
        TrainError::Corpus(_) => PyIOError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn stats_dict(py: Python<'_>, stats: &TrainingStats) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("initial_tokens", stats.initial_token_count)?;
    dict.set_item("initial_vocab", stats.initial_vocab_size)?;
    dict.set_item("final_tokens", stats.final_token_count)?;
    dict.set_item("final_vocab", stats.final_vocab_size)?;
    dict.set_item("merges", stats.merges_applied)?;
    dict.set_item("compression_ratio", stats.compression_ratio())?;
    dict.set_item("stop_reason", format!("{:?}", stats.stop_reason))?;
    Ok(dict.into())
}
