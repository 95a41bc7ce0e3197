//! Error types for the analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::finding::{Finding, Position};

/// Lexing failure. Fatal to the parse call that hit it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unterminated {quote} string starting at {position}")]
    UnterminatedString { quote: char, position: Position },

    #[error("unterminated command substitution starting at {position}")]
    UnterminatedSubstitution { position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString { position, .. }
            | LexError::UnterminatedSubstitution { position } => *position,
        }
    }
}

/// Parse failure. Carries the diagnostics collected before giving up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty command")]
    NoCommands { diagnostics: Vec<Finding> },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("lexing failed: {0}")]
    Lex(#[from] LexError),

    #[error("parsing failed: {0}")]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    /// Diagnostics gathered before the failure, if any
    pub fn diagnostics(&self) -> &[Finding] {
        match self {
            SyntaxError::Parse(ParseError::NoCommands { diagnostics }) => diagnostics,
            SyntaxError::Lex(_) => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern for rule '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{0}' already exists")]
    Duplicate(String),

    #[error("rule '{0}' not found")]
    NotFound(String),

    #[error("rule name and pattern are required")]
    MissingField,

    #[error("failed to access rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("failed to serialize rules: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type RuleResult<T> = std::result::Result<T, RuleError>;
