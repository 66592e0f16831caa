//! Diagnostics for locally repaired conditions
//!
//! Components never log directly. They emit a [`Diagnostic`] into an
//! injected [`DiagnosticSink`]; the default sink forwards to `tracing`.

use parking_lot::Mutex;
use std::fmt;

/// One repaired or skipped condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A code-fence wrapper was removed before extraction
    FenceStripped,
    /// Invalid escapes were doubled so the text would parse
    EscapesNormalized {
        /// Number of backslashes doubled
        repaired: usize,
    },
    /// A bare `"key": value` pair was wrapped in braces
    BarePairWrapped,
    /// The balanced matcher ran off the end of the input
    TruncatedCandidate {
        /// Characters taken as the candidate
        consumed: usize,
    },
    /// A patch was applied
    PatchApplied {
        /// Position in the patch list
        index: usize,
        /// Matched through the whitespace-tolerant pattern
        fuzzy: bool,
    },
    /// A patch matched neither exactly nor fuzzily
    PatchNotFound {
        /// Position in the patch list
        index: usize,
        /// Leading portion of the original text
        preview: String,
    },
    /// A citation marker had no valid key and was escaped
    CitationUnresolved {
        /// The marker as written
        marker: String,
    },
    /// A citation command referenced keys outside the valid set
    CitationHallucinated {
        /// Offending keys
        keys: Vec<String>,
    },
    /// A raw marker survived resolution and was escaped
    MarkerSwept {
        /// The marker as written
        marker: String,
    },
    /// A synthetic environment close was inserted
    SyntheticClose {
        /// Environment name
        environment: String,
    },
    /// Synthetic closing braces were inserted
    SyntheticBraces {
        /// Number of braces
        count: usize,
    },
    /// A close marker with no matching open frame was left as-is
    OrphanClose {
        /// Environment name
        environment: String,
    },
}

impl Diagnostic {
    /// Whether the condition suggests the model misbehaved, not just
    /// formatted sloppily
    #[must_use]
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::PatchNotFound { .. } | Self::CitationHallucinated { .. } | Self::OrphanClose { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FenceStripped => write!(f, "stripped code fence"),
            Self::EscapesNormalized { repaired } => {
                write!(f, "normalized {repaired} invalid escape(s)")
            }
            Self::BarePairWrapped => write!(f, "wrapped bare key/value pair"),
            Self::TruncatedCandidate { consumed } => {
                write!(f, "unbalanced candidate, took {consumed} chars to end of input")
            }
            Self::PatchApplied { index, fuzzy } => {
                let how = if *fuzzy { "fuzzy" } else { "exact" };
                write!(f, "applied patch #{index} ({how})")
            }
            Self::PatchNotFound { index, preview } => {
                write!(f, "patch #{index} not found: '{preview}'")
            }
            Self::CitationUnresolved { marker } => write!(f, "unresolved citation {marker}"),
            Self::CitationHallucinated { keys } => {
                write!(f, "hallucinated citation keys: {}", keys.join(", "))
            }
            Self::MarkerSwept { marker } => write!(f, "escaped stray marker {marker}"),
            Self::SyntheticClose { environment } => {
                write!(f, "inserted \\end{{{environment}}}")
            }
            Self::SyntheticBraces { count } => write!(f, "inserted {count} closing brace(s)"),
            Self::OrphanClose { environment } => {
                write!(f, "orphan \\end{{{environment}}} left untouched")
            }
        }
    }
}

/// Injected diagnostics callback
pub trait DiagnosticSink: Send + Sync {
    /// Receive one diagnostic
    fn emit(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn emit(&self, diagnostic: &Diagnostic) {
        self(diagnostic);
    }
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        if diagnostic.is_suspicious() {
            tracing::warn!(target: "quill::repair", "{}", diagnostic);
        } else {
            tracing::debug!(target: "quill::repair", "{}", diagnostic);
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: &Diagnostic) {}
}

/// Records diagnostics in emission order
#[derive(Debug, Default)]
pub struct CollectingSink {
    inner: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    /// Create empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.lock().clone()
    }

    /// Drain recorded diagnostics
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Number of recorded diagnostics
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.inner.lock().push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closure_sink() {
        let count = AtomicUsize::new(0);
        let sink = |_: &Diagnostic| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        sink.emit(&Diagnostic::FenceStripped);
        sink.emit(&Diagnostic::BarePairWrapped);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn collecting_sink_preserves_order() {
        let sink = CollectingSink::new();
        sink.emit(&Diagnostic::FenceStripped);
        sink.emit(&Diagnostic::SyntheticBraces { count: 2 });

        assert_eq!(
            sink.diagnostics(),
            vec![
                Diagnostic::FenceStripped,
                Diagnostic::SyntheticBraces { count: 2 }
            ]
        );
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn suspicious_classification() {
        assert!(Diagnostic::OrphanClose {
            environment: "itemize".to_string()
        }
        .is_suspicious());
        assert!(!Diagnostic::FenceStripped.is_suspicious());
    }

    #[test]
    fn display_environment_names() {
        let d = Diagnostic::SyntheticClose {
            environment: "itemize".to_string(),
        };
        assert_eq!(d.to_string(), "inserted \\end{itemize}");
    }
}
