//! The trained model and its persisted artifact.
//!
//! A trained model is the final symbol table plus the ordered merge rule
//! list; both are immutable after training. The artifact is a line-oriented
//! text format with IDs implicit in record order:
//!
//! ```text
//! special <base64 surface>
//! char <base64 surface>
//! merge <left_id> <right_id>
//! ```
//!
//! Records must appear in that kind order — special markers, then initial
//! characters, then merges. Loading replays each record through the same
//! registration path training used, so a loaded model is identical to the
//! trained one and reproduces identical tokenization. Surfaces are base64
//! so the format never has to worry about what a symbol may contain.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use super::symbols::{markers, SymbolError, SymbolTable};

/// Errors raised while reading or writing a model artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("invalid base64 in artifact: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid artifact: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One learned merge: `left` immediately followed by `right` became `new_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    pub left: u32,
    pub right: u32,
    pub new_id: u32,
}

/// An immutable trained model: symbol table + ordered merge rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    symbols: SymbolTable,
    special_count: usize,
    merges: Vec<MergeRule>,
}

impl Model {
    pub(crate) fn new(symbols: SymbolTable, special_count: usize, merges: Vec<MergeRule>) -> Self {
        Self {
            symbols,
            special_count,
            merges,
        }
    }

    /// Total distinct symbols, markers and merges included.
    pub fn vocab_size(&self) -> usize {
        self.symbols.len()
    }

    /// Number of special markers (IDs `0..special_count`).
    pub fn special_count(&self) -> usize {
        self.special_count
    }

    /// Marker surfaces in registration order.
    pub fn special_surfaces(&self) -> &[String] {
        &self.symbols.surfaces()[..self.special_count]
    }

    /// Ordered merge rules.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Look up a surface's ID.
    pub fn id_of(&self, surface: &str) -> Option<u32> {
        self.symbols.id_of(surface)
    }

    /// Look up an ID's surface.
    pub fn surface(&self, id: u32) -> Result<&str, SymbolError> {
        self.symbols.surface_of(id)
    }

    /// ID of the `<unk>` marker, when the model defines one.
    pub fn unk_id(&self) -> Option<u32> {
        self.symbols.id_of(markers::UNK)
    }

    /// All surfaces in ID order.
    pub fn surfaces(&self) -> &[String] {
        self.symbols.surfaces()
    }

    /// Render the model as artifact text.
    pub fn to_artifact_string(&self) -> String {
        let surfaces = self.symbols.surfaces();
        let char_end = surfaces.len() - self.merges.len();
        let mut out = String::new();
        for surface in &surfaces[..self.special_count] {
            let _ = writeln!(out, "special {}", STANDARD.encode(surface));
        }
        for surface in &surfaces[self.special_count..char_end] {
            let _ = writeln!(out, "char {}", STANDARD.encode(surface));
        }
        for rule in &self.merges {
            let _ = writeln!(out, "merge {} {}", rule.left, rule.right);
        }
        out
    }

    /// Write the artifact to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        fs::write(path, self.to_artifact_string())?;
        Ok(())
    }

    /// Load a model from artifact bytes.
    ///
    /// Records are replayed in order through a fresh symbol table; any
    /// malformed line, out-of-order record, duplicate surface, or merge
    /// referencing a not-yet-registered ID fails the load.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ArtifactError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ArtifactError::Parse("artifact is not valid UTF-8".to_string()))?;

        let mut symbols = SymbolTable::new();
        let mut special_count = 0usize;
        let mut merges: Vec<MergeRule> = Vec::new();
        // Sections must appear in order: special (0), char (1), merge (2).
        let mut section = 0u8;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (kind, rest) = line.split_once(' ').ok_or_else(|| {
                ArtifactError::Parse(format!("line {}: missing field separator", lineno + 1))
            })?;

            match kind {
                "special" => {
                    if section > 0 {
                        return Err(ArtifactError::Parse(format!(
                            "line {}: special record after later section",
                            lineno + 1
                        )));
                    }
                    register_fresh(&mut symbols, &decode_surface(rest)?, lineno)?;
                    special_count += 1;
                }
                "char" => {
                    if section > 1 {
                        return Err(ArtifactError::Parse(format!(
                            "line {}: char record after merge section",
                            lineno + 1
                        )));
                    }
                    section = 1;
                    register_fresh(&mut symbols, &decode_surface(rest)?, lineno)?;
                }
                "merge" => {
                    section = 2;
                    let (left, right) = rest.split_once(' ').ok_or_else(|| {
                        ArtifactError::Parse(format!("line {}: merge needs two ids", lineno + 1))
                    })?;
                    let left = parse_id(left, lineno)?;
                    let right = parse_id(right, lineno)?;
                    let next = symbols.len() as u32;
                    if left >= next || right >= next {
                        return Err(ArtifactError::Parse(format!(
                            "line {}: merge references unregistered id",
                            lineno + 1
                        )));
                    }
                    let surfaces = symbols.surfaces();
                    let surface =
                        format!("{}{}", surfaces[left as usize], surfaces[right as usize]);
                    let new_id = register_fresh(&mut symbols, &surface, lineno)?;
                    merges.push(MergeRule {
                        left,
                        right,
                        new_id,
                    });
                }
                other => {
                    return Err(ArtifactError::Parse(format!(
                        "line {}: unknown record kind {other:?}",
                        lineno + 1
                    )));
                }
            }
        }

        Ok(Self {
            symbols,
            special_count,
            merges,
        })
    }

    /// Load a model from an artifact file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }
}

fn decode_surface(field: &str) -> Result<String, ArtifactError> {
    let bytes = STANDARD.decode(field.trim())?;
    String::from_utf8(bytes)
        .map_err(|_| ArtifactError::Parse("surface is not valid UTF-8".to_string()))
}

fn parse_id(field: &str, lineno: usize) -> Result<u32, ArtifactError> {
    field
        .trim()
        .parse()
        .map_err(|_| ArtifactError::Parse(format!("line {}: invalid id {field:?}", lineno + 1)))
}

fn register_fresh(
    symbols: &mut SymbolTable,
    surface: &str,
    lineno: usize,
) -> Result<u32, ArtifactError> {
    let expected = symbols.len() as u32;
    let id = symbols.add(surface);
    if id != expected {
        return Err(ArtifactError::Parse(format!(
            "line {}: duplicate symbol {surface:?}",
            lineno + 1
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> Model {
        let mut symbols = SymbolTable::new();
        for marker in markers::default_markers() {
            symbols.add(&marker);
        }
        let a = symbols.add("अ");
        let b = symbols.add("ब");
        let merged = symbols.add("अब");
        Model::new(
            symbols,
            6,
            vec![MergeRule {
                left: a,
                right: b,
                new_id: merged,
            }],
        )
    }

    #[test]
    fn test_artifact_round_trip() {
        let model = tiny_model();
        let text = model.to_artifact_string();
        let loaded = Model::from_bytes(text.as_bytes()).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_artifact_line_shape() {
        let model = tiny_model();
        let text = model.to_artifact_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with("special "));
        assert!(lines[6].starts_with("char "));
        assert_eq!(lines[8], "merge 6 7");
    }

    #[test]
    fn test_merge_rebuilds_surface() {
        let model = tiny_model();
        let loaded = Model::from_bytes(model.to_artifact_string().as_bytes()).unwrap();
        assert_eq!(loaded.surface(8), Ok("अब"));
        assert_eq!(loaded.id_of("अब"), Some(8));
    }

    #[test]
    fn test_unknown_record_kind_fails() {
        let err = Model::from_bytes(b"frob AAAA\n").unwrap_err();
        assert!(matches!(err, ArtifactError::Parse(_)));
    }

    #[test]
    fn test_out_of_order_record_fails() {
        let mut text = String::new();
        text.push_str(&format!("char {}\n", STANDARD.encode("अ")));
        text.push_str(&format!("special {}\n", STANDARD.encode("<unk>")));
        let err = Model::from_bytes(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ArtifactError::Parse(_)));
    }

    #[test]
    fn test_merge_with_unregistered_id_fails() {
        let text = format!("special {}\nmerge 0 5\n", STANDARD.encode("<unk>"));
        let err = Model::from_bytes(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ArtifactError::Parse(_)));
    }

    #[test]
    fn test_invalid_base64_fails() {
        let err = Model::from_bytes(b"special !!!!\n").unwrap_err();
        assert!(matches!(err, ArtifactError::Base64(_)));
    }

    #[test]
    fn test_duplicate_surface_fails() {
        let line = format!("special {}\n", STANDARD.encode("<unk>"));
        let text = format!("{line}{line}");
        let err = Model::from_bytes(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ArtifactError::Parse(_)));
    }

    #[test]
    fn test_unk_id_resolution() {
        let model = tiny_model();
        assert_eq!(model.unk_id(), Some(3));
    }
}
