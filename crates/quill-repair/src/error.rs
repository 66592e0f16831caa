//! Error types for the repair pipeline
//!
//! Only failures that leave a caller without a required value are errors:
//! - Extraction of a structured value from model output
//! - Loading pipeline configuration
//!
//! Everything locally repairable (bad escapes, stray markers, missed patches,
//! unbalanced markup) is neutralized and reported through
//! [`crate::diagnostics`] instead.

/// Errors while recovering a structured value from raw model output
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Neither `{` nor `[` occurs anywhere in the input
    #[error("no JSON structure found in model output: '{preview}'")]
    NoStructureFound {
        /// Leading portion of the input
        preview: String,
    },

    /// Every recovery attempt failed to produce a parseable value
    #[error("malformed JSON ({message}) near: '{snippet}'")]
    MalformedJson {
        /// Trailing context of the candidate substring
        snippet: String,
        /// Underlying parser message
        message: String,
    },

    /// The parser ran out of input mid-value
    #[error("model output truncated: {message}")]
    TruncatedOutput {
        /// Underlying parser message
        message: String,
    },
}

impl ExtractError {
    /// Create malformed JSON error
    pub fn malformed(snippet: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedJson {
            snippet: snippet.into(),
            message: message.into(),
        }
    }

    /// Whether the output was cut off before the value ended
    #[inline]
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::TruncatedOutput { .. })
    }

    /// Whether re-issuing the same model call could plausibly succeed
    ///
    /// A truncated reply will be truncated again under the same output
    /// bound, so callers should abort rather than retry.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_truncated()
    }
}

/// Errors while loading [`crate::config::RepairConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML syntax or type error
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Combined pipeline error
#[derive(Debug, thiserror::Error)]
pub enum QuillError {
    /// Structured value could not be recovered
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Configuration rejected
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for pipeline operations
pub type QuillResult<T> = Result<T, QuillError>;
