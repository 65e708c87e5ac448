use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the activity engine
pub type Result<T> = std::result::Result<T, Error>;

/// A single rule that could not be compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFailure {
    /// Name of the offending rule
    pub name: String,
    /// Parser message for its expression
    pub message: String,
}

impl fmt::Display for PatternFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A rule passed to `add_pattern` has an unparsable expression
    #[error("invalid pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A rule with this name is already in the library
    #[error("duplicate pattern name '{name}'")]
    DuplicatePattern { name: String },

    /// One or more rules were rejected by a compile or bulk add
    #[error("{} pattern(s) rejected: {}", .failures.len(), join_failures(.failures))]
    PatternCompile { failures: Vec<PatternFailure> },

    /// Velocity thresholds must satisfy high > medium > idle
    #[error("velocity thresholds must satisfy high > medium > idle (got {high} / {medium} / {idle})")]
    InvalidThresholds { high: f64, medium: f64, idle: f64 },

    #[error("failed to read pattern file {}: {source}", .path.display())]
    PatternFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pattern file: {0}")]
    PatternFormat(#[from] serde_json::Error),
}

impl Error {
    /// Names of the rules that caused this error, if it is a pattern error
    pub fn pattern_names(&self) -> Vec<&str> {
        match self {
            Error::InvalidPattern { name, .. } | Error::DuplicatePattern { name } => {
                vec![name.as_str()]
            }
            Error::PatternCompile { failures } => {
                failures.iter().map(|f| f.name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_failures(failures: &[PatternFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
