use thiserror::Error;

use crate::types::FileFormat;

/// Errors raised by parsing, knowledge base loading and configuration.
///
/// Line-level variants are recoverable: the parsers log them and skip the
/// offending line. Only `FormatUndetected` and `NoVariants` abort a parse.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unable to detect file format; expected a 23andMe raw data file or a VCF file")]
    FormatUndetected,

    #[error("No recognizable variant records found in {format} input")]
    NoVariants { format: FileFormat },

    #[error("Invalid position at line {line}: {value}")]
    InvalidPosition { line: usize, value: String },

    #[error("Line {line} has {found} columns, expected at least {expected}")]
    InsufficientColumns {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("Invalid record at line {line}: {details}")]
    InvalidRecord { line: usize, details: String },

    #[error("Malformed genotype '{0}'")]
    MalformedGenotype(String),

    #[error("Allele index {index} out of range for {alternates} alternate allele(s)")]
    AlleleIndexOutOfRange { index: u32, alternates: usize },

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a parser may skip the line that produced this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidPosition { .. }
                | EngineError::InsufficientColumns { .. }
                | EngineError::InvalidRecord { .. }
                | EngineError::MalformedGenotype(_)
                | EngineError::AlleleIndexOutOfRange { .. }
        )
    }
}
