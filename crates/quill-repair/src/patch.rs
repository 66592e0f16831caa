//! Ordered text patches from revision passes
//!
//! Each patch replaces the first occurrence of its original text. When the
//! model reproduced the original with different whitespace, a tolerant
//! pattern is tried. A patch that matches neither way is skipped and the
//! batch continues.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::markup::MarkupSanitizer;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

const PREVIEW_CHARS: usize = 60;

/// One `original → replacement` edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Text expected in the document
    pub original: String,
    /// Text to put in its place, sanitized before use
    pub replacement: String,
}

impl Patch {
    /// Create patch
    pub fn new(original: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            replacement: replacement.into(),
        }
    }
}

/// How a single patch was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    /// First exact occurrence replaced
    Exact,
    /// First whitespace-tolerant match replaced
    Fuzzy,
    /// Skipped
    NotFound,
}

/// Result of applying a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// Patched document
    pub document: String,
    /// One outcome per patch, in input order
    pub outcomes: Vec<PatchOutcome>,
}

impl PatchReport {
    /// Count of patches that were applied exactly or fuzzily
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| **o != PatchOutcome::NotFound)
            .count()
    }

    /// Indices of skipped patches
    #[must_use]
    pub fn skipped(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == PatchOutcome::NotFound)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Apply `patches` to `document` in order
pub fn apply_patches(document: &str, patches: &[Patch], sink: &dyn DiagnosticSink) -> PatchReport {
    let sanitizer = MarkupSanitizer;
    let mut current = document.to_string();
    let mut outcomes = Vec::with_capacity(patches.len());

    for (index, patch) in patches.iter().enumerate() {
        let replacement = sanitizer.sanitize_fragment(&patch.replacement);
        let outcome = apply_one(&mut current, &patch.original, &replacement);

        match outcome {
            PatchOutcome::Exact | PatchOutcome::Fuzzy => sink.emit(&Diagnostic::PatchApplied {
                index,
                fuzzy: outcome == PatchOutcome::Fuzzy,
            }),
            PatchOutcome::NotFound => sink.emit(&Diagnostic::PatchNotFound {
                index,
                preview: patch.original.chars().take(PREVIEW_CHARS).collect(),
            }),
        }
        outcomes.push(outcome);
    }

    PatchReport {
        document: current,
        outcomes,
    }
}

fn apply_one(document: &mut String, original: &str, replacement: &str) -> PatchOutcome {
    if original.trim().is_empty() {
        return PatchOutcome::NotFound;
    }

    if document.contains(original) {
        *document = document.replacen(original, replacement, 1);
        return PatchOutcome::Exact;
    }

    let Some(pattern) = fuzzy_pattern(original) else {
        return PatchOutcome::NotFound;
    };
    if pattern.is_match(document) {
        *document = pattern.replace(document, NoExpand(replacement)).into_owned();
        PatchOutcome::Fuzzy
    } else {
        PatchOutcome::NotFound
    }
}

/// Escaped words of `original` joined by `\s+`
fn fuzzy_pattern(original: &str) -> Option<Regex> {
    let words: Vec<String> = original.split_whitespace().map(regex::escape).collect();
    Regex::new(&words.join(r"\s+")).ok()
}
