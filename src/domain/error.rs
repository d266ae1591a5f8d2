//! Domain error types.

use chrono::NaiveDate;

/// A parse error with position information for filter and config parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for samselect.
#[derive(Debug, thiserror::Error)]
pub enum SamselectError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("factor '{name}' is already registered")]
    DuplicateFactor { name: String },

    #[error("factor '{name}' is not registered")]
    UnknownFactor { name: String },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("unknown source reference '{reference}'")]
    UnknownSource { reference: String },

    #[error(
        "conflicting observations for {subject} {field} at {timestamp}: sources '{first}' and '{second}'"
    )]
    ConflictingObservation {
        subject: String,
        field: String,
        timestamp: NaiveDate,
        first: String,
        second: String,
    },

    #[error("lookahead violation: {subject} {field} observed {observed} attached to {as_of}")]
    LookaheadViolation {
        subject: String,
        field: String,
        observed: NaiveDate,
        as_of: NaiveDate,
    },

    #[error("data unavailable on {date}: {reason}")]
    DataAvailability { date: NaiveDate, reason: String },

    #[error("no data for {subject}")]
    NoData { subject: String },

    #[error("data source error: {reason}")]
    Source { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SamselectError {
    /// Errors that must be surfaced before any rebalance date is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SamselectError::ConfigParse { .. }
                | SamselectError::ConfigMissing { .. }
                | SamselectError::ConfigInvalid { .. }
                | SamselectError::DuplicateFactor { .. }
                | SamselectError::UnknownFactor { .. }
                | SamselectError::RuleParse(_)
                | SamselectError::UnknownSource { .. }
                | SamselectError::ConflictingObservation { .. }
        )
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SamselectError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
