//! Error types for Mudkit
//!
//! This module provides error types for the shell and the filesystem layer
//! with the following design goals:
//! - Human-readable messages that can be shown to players verbatim
//! - One named variant per failure condition the parser can raise
//! - Permission denials are *not* errors (see [`crate::fs::Access`]); the
//!   [`Error::PermissionDenied`] variant exists only for callers that opt in
//!   via `Access::into_result`

use thiserror::Error;

/// Result type alias using Mudkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Mudkit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Syntax error in a command line (without location info).
    #[error("syntax error: {0}")]
    Parse(String),

    /// Syntax error with source location information.
    #[error("syntax error at line {line}, column {column}: {message}")]
    ParseAt {
        message: String,
        line: usize,
        column: usize,
    },

    /// A quoted string or backtick ran off the end of the input.
    #[error("unexpected end of input: unterminated {quote} at offset {offset}")]
    UnterminatedString { quote: char, offset: usize },

    /// A backslash was the last character of the input.
    #[error("unexpected end of input: unterminated escape at offset {offset}")]
    UnterminatedEscape { offset: usize },

    /// The line ends in a continuation and more input is required.
    #[error("incomplete input: line continues")]
    Incomplete,

    /// A history reference did not resolve to any entry.
    #[error("{0}: event not found")]
    EventNotFound(String),

    /// A history word designator or modifier could not be applied.
    #[error("{0}")]
    History(String),

    /// The input used a recognised but unsupported feature.
    #[error("{0} is not supported")]
    Unsupported(String),

    /// I/O error from filesystem operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed shadow file or mount configuration document.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Deployment or programmer mistake detected at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// No filesystem is mounted for the path.
    #[error("no filesystem mounted for {0}")]
    NoMount(String),

    /// Access refused by a security manager.
    #[error("permission denied: {action} {path}")]
    PermissionDenied { action: String, path: String },

    /// Internal error for unexpected failures.
    ///
    /// Use this for logic errors that indicate a bug (for example an operator
    /// reaching the linker that the tokenizer should never have produced).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a syntax error with source location.
    pub fn parse_at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::ParseAt {
            message: message.into(),
            line,
            column,
        }
    }

    /// True for syntax-class failures (unterminated input, bad operators).
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::ParseAt { .. }
                | Self::UnterminatedString { .. }
                | Self::UnterminatedEscape { .. }
                | Self::Unsupported(_)
        )
    }

    /// True for history resolution failures.
    pub fn is_history(&self) -> bool {
        matches!(self, Self::EventNotFound(_) | Self::History(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_not_found_message() {
        let err = Error::EventNotFound("!foo".to_string());
        assert_eq!(err.to_string(), "!foo: event not found");
        assert!(err.is_history());
        assert!(!err.is_syntax());
    }

    #[test]
    fn test_unsupported_message() {
        let err = Error::Unsupported("background execution".to_string());
        assert_eq!(err.to_string(), "background execution is not supported");
        assert!(err.is_syntax());
    }
}
