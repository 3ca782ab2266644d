//! Engine error kinds
//!
//! Every failure is local to one computation call; nothing here is fatal to
//! the process.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("degenerate computation: {0}")]
    DegenerateComputation(String),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}

impl EngineError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateComputation(message.into())
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateComputation(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub(crate) fn ensure_len(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }

    Err(EngineError::ShapeMismatch {
        context,
        expected,
        got: actual,
    })
}

#[cfg(test)]
mod tests {
    use super::{ensure_len, EngineError};

    #[test]
    fn ensure_len_reports_both_lengths() {
        let err = ensure_len("iq streams", 4, 3).unwrap_err();
        assert_eq!(
            err,
            EngineError::ShapeMismatch {
                context: "iq streams",
                expected: 4,
                got: 3,
            }
        );
        assert_eq!(err.to_string(), "iq streams length mismatch: expected 4, got 3");
    }

    #[test]
    fn only_degenerate_errors_are_flagged() {
        assert!(EngineError::degenerate("zero energy").is_degenerate());
        assert!(!EngineError::invalid("bad rate").is_degenerate());
    }
}
