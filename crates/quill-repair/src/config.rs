//! Pipeline configuration
//!
//! Every knob has a default matching the behavior callers expect with no
//! configuration at all; a TOML document may override any subset.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const STRUCTURAL_ENVIRONMENTS: &[&str] = &[
    "tabular",
    "tabular*",
    "tabularx",
    "tabulary",
    "longtable",
    "array",
    "align",
    "align*",
    "alignat",
    "alignat*",
    "aligned",
    "alignedat",
    "eqnarray",
    "eqnarray*",
    "flalign",
    "flalign*",
    "split",
    "cases",
    "matrix",
    "pmatrix",
    "bmatrix",
    "Bmatrix",
    "vmatrix",
    "Vmatrix",
    "smallmatrix",
];

const VERBATIM_COMMANDS: &[&str] = &["url", "href", "path", "nolinkurl", "lstinline", "verb"];

const VERBATIM_ENVIRONMENTS: &[&str] = &["verbatim", "Verbatim", "lstlisting", "minted", "comment"];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Configuration shared by all pipeline components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Characters of context kept in extraction error snippets
    pub snippet_chars: usize,
    /// Upper bound on adjacent-citation merge passes
    pub merge_iteration_limit: usize,
    /// Replacement for a citation that references unknown keys
    pub unresolved_glyph: String,
    /// Command name emitted for resolved citations
    pub citation_command: String,
    /// Marker separating preamble from body
    pub document_marker: String,
    /// Environments where `&` is a column separator
    pub structural_environments: Vec<String>,
    /// Commands whose arguments are copied unexamined
    pub verbatim_commands: Vec<String>,
    /// Environments whose contents are copied unexamined
    pub verbatim_environments: Vec<String>,
}

impl RepairConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML document and validate
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge_iteration_limit == 0 {
            return Err(ConfigError::Invalid(
                "merge_iteration_limit must be at least 1".to_string(),
            ));
        }
        if self.document_marker.is_empty() {
            return Err(ConfigError::Invalid(
                "document_marker must not be empty".to_string(),
            ));
        }
        if self.citation_command.is_empty()
            || !self.citation_command.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ConfigError::Invalid(format!(
                "citation_command must be a non-empty ASCII command name, got '{}'",
                self.citation_command
            )));
        }
        Ok(())
    }

    /// With snippet length
    #[inline]
    #[must_use]
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    /// With merge iteration bound
    #[inline]
    #[must_use]
    pub fn with_merge_iteration_limit(mut self, limit: usize) -> Self {
        self.merge_iteration_limit = limit;
        self
    }

    /// With unresolved-citation glyph
    #[inline]
    #[must_use]
    pub fn with_unresolved_glyph(mut self, glyph: impl Into<String>) -> Self {
        self.unresolved_glyph = glyph.into();
        self
    }

    /// With an additional structural environment
    #[must_use]
    pub fn with_structural_environment(mut self, name: impl Into<String>) -> Self {
        self.structural_environments.push(name.into());
        self
    }

    /// With an additional verbatim command
    #[must_use]
    pub fn with_verbatim_command(mut self, name: impl Into<String>) -> Self {
        self.verbatim_commands.push(name.into());
        self
    }

    /// Whether `name` is a structural environment
    #[must_use]
    pub fn is_structural(&self, name: &str) -> bool {
        self.structural_environments.iter().any(|e| e == name)
    }

    /// Whether `name` is a verbatim command
    #[must_use]
    pub fn is_verbatim_command(&self, name: &str) -> bool {
        self.verbatim_commands.iter().any(|c| c == name)
    }

    /// Whether `name` is a verbatim environment
    #[must_use]
    pub fn is_verbatim_environment(&self, name: &str) -> bool {
        self.verbatim_environments.iter().any(|e| e == name)
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            snippet_chars: 200,
            merge_iteration_limit: 32,
            unresolved_glyph: "[?]".to_string(),
            citation_command: "cite".to_string(),
            document_marker: "\\begin{document}".to_string(),
            structural_environments: owned(STRUCTURAL_ENVIRONMENTS),
            verbatim_commands: owned(VERBATIM_COMMANDS),
            verbatim_environments: owned(VERBATIM_ENVIRONMENTS),
        }
    }
}
