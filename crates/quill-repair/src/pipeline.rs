//! Pipeline facade
//!
//! Bundles a validated [`RepairConfig`] with one diagnostics sink and
//! exposes every stage behind a single handle:
//! - structured value recovery ([`Pipeline::extract_json`], [`Pipeline::extract_as`])
//! - field sanitization ([`Pipeline::sanitize_field`], [`Pipeline::sanitize_value`])
//! - document compilation ([`Pipeline::compile_document`], [`Pipeline::compile_many`])
//! - revision patches ([`Pipeline::apply_patches`])

use crate::citation::CitationCompiler;
use crate::config::RepairConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{ConfigError, ExtractError};
use crate::json::JsonExtractor;
use crate::markup::{
    env_marker, split_document, BalanceRepairer, MarkerKind, MarkupSanitizer, SpecialCharEscaper,
};
use crate::patch::{self, Patch, PatchReport};
use crate::references::ReferenceSet;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Configured repair pipeline
///
/// Every stage is a pure function of its input, so one `Pipeline` may be
/// shared across threads.
#[derive(Clone)]
pub struct Pipeline {
    config: RepairConfig,
    sink: Arc<dyn DiagnosticSink>,
    extractor: JsonExtractor,
    citations: CitationCompiler,
    escaper: SpecialCharEscaper,
    balancer: BalanceRepairer,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create pipeline reporting to [`TracingSink`]
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails validation.
    pub fn new(config: RepairConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            extractor: JsonExtractor::from_config(&config),
            citations: CitationCompiler::new(&config)?,
            escaper: SpecialCharEscaper::new(config.clone()),
            balancer: BalanceRepairer::new(config.clone()),
            sink: Arc::new(TracingSink),
            config,
        })
    }

    /// Replace the diagnostics sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Recover the first structured value in `raw`
    ///
    /// # Errors
    ///
    /// See [`JsonExtractor::extract`].
    pub fn extract_json(&self, raw: &str) -> Result<Value, ExtractError> {
        self.extractor.extract(raw, self.sink.as_ref())
    }

    /// Recover and decode into `T`
    ///
    /// # Errors
    ///
    /// Extraction errors pass through; a value of the wrong shape is
    /// reported as [`ExtractError::MalformedJson`].
    pub fn extract_as<T: DeserializeOwned>(&self, raw: &str) -> Result<T, ExtractError> {
        let value = self.extract_json(raw)?;
        let snippet = head(&value.to_string(), self.config.snippet_chars);
        serde_json::from_value(value).map_err(|e| ExtractError::malformed(snippet, e.to_string()))
    }

    /// Sanitize one model-written field
    #[must_use]
    pub fn sanitize_field(&self, text: &str) -> String {
        MarkupSanitizer.sanitize(text)
    }

    /// Sanitize every string leaf of a recovered value
    #[must_use]
    pub fn sanitize_value(&self, value: Value) -> Value {
        MarkupSanitizer.sanitize_value(value)
    }

    /// Compile a document against the verified reference set
    ///
    /// # Workflow
    /// 1. Split at the document marker; the preamble is kept byte-identical
    /// 2. Resolve, merge and check citations in the body
    /// 3. Escape reserved characters outside structural environments
    /// 4. Close every open brace group and environment, including the one
    ///    the document marker opened
    #[must_use]
    pub fn compile_document(&self, document: &str, refs: &ReferenceSet) -> String {
        let sink = self.sink.as_ref();
        let (preamble, body) = split_document(document, &self.config.document_marker);

        let body = self.citations.compile(body, refs, sink);
        let body = self.escaper.escape_body(&body);

        // The marker opened an environment the body is expected to close.
        let enclosing = if preamble.is_empty() {
            None
        } else {
            env_marker(&self.config.document_marker, 0)
                .filter(|m| m.kind == MarkerKind::Begin)
                .map(|m| m.name)
        };
        let body = self.balancer.repair_within(&body, enclosing, sink);

        let mut compiled = String::with_capacity(preamble.len() + body.len());
        compiled.push_str(preamble);
        compiled.push_str(&body);
        compiled
    }

    /// Compile independent documents in parallel, preserving order
    #[must_use]
    pub fn compile_many<S>(&self, documents: &[S], refs: &ReferenceSet) -> Vec<String>
    where
        S: AsRef<str> + Sync,
    {
        documents
            .par_iter()
            .map(|doc| self.compile_document(doc.as_ref(), refs))
            .collect()
    }

    /// Apply revision patches in order
    #[must_use]
    pub fn apply_patches(&self, document: &str, patches: &[Patch]) -> PatchReport {
        patch::apply_patches(document, patches, self.sink.as_ref())
    }
}

fn head(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}
