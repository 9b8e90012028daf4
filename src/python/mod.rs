mod bindings;

use crate::core::markers;
pub use bindings::{PyTokenizer, PyTrainer};

use pyo3::prelude::*;

/// Akshara - character-level BPE tokenizer for cleaned Devanagari corpora
///
/// A vocabulary builder and tokenizer featuring:
/// - Deterministic BPE training with a documented tie-break
/// - Character-level symbols (merges never split a Unicode scalar value)
/// - Rayon parallelism for training and batch encoding
/// - Aho-Corasick matching for placeholder markers
/// - A replayable text artifact for model persistence
#[pymodule]
fn _akshara(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTrainer>()?;
    m.add_class::<PyTokenizer>()?;
    m.add("PAD", markers::PAD)?;
    m.add("EOS", markers::EOS)?;
    m.add("BOS", markers::BOS)?;
    m.add("UNK", markers::UNK)?;
    m.add("NUM", markers::NUM)?;
    m.add("ENG", markers::ENG)?;
    Ok(())
}
