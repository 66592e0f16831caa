//! Quill Repair
//!
//! Deterministic repair of generative model output. Nothing here calls a
//! model or touches the filesystem; every stage is a pure text transform.
//!
//! # Stages
//!
//! - **Extract**: locate and parse the first JSON value in a reply,
//!   surviving fences, prose, invalid escapes and bare pairs
//! - **Sanitize**: strip reasoning traces and lead-ins from a text field and
//!   convert lightweight markup into typesetting commands
//! - **Compile**: resolve citation markers, escape reserved characters and
//!   close every brace group and environment
//! - **Patch**: apply ordered revision edits, tolerating whitespace drift
//!
//! # Architecture
//!
//! ```text
//! raw reply → JsonExtractor → Value → MarkupSanitizer → fields
//!
//! document → split_document → body → CitationCompiler → SpecialCharEscaper
//!                  ↓                                           ↓
//!              preamble ────────────────→ concat ←──── BalanceRepairer
//! ```
//!
//! Locally repairable conditions never fail a call; they are reported as
//! [`Diagnostic`]s through an injected [`DiagnosticSink`].
//!
//! # Example
//!
//! ```
//! use quill_repair::{Pipeline, RepairConfig, ReferenceSet};
//!
//! let pipeline = Pipeline::new(RepairConfig::default()).unwrap();
//!
//! let value = pipeline.extract_json(r#"Here is the content: {"found": false}"#).unwrap();
//! assert_eq!(value["found"], false);
//!
//! let refs = ReferenceSet::from_keys(["ref_12"]);
//! let body = pipeline.compile_document("Unity & Catalog (ref_12) do R&D", &refs);
//! assert_eq!(body, r"Unity \& Catalog \cite{ref_12} do R\&D");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod citation;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod json;
pub mod markup;
pub mod patch;
pub mod pipeline;
pub mod references;

// Re-exports for convenience
pub use citation::CitationCompiler;
pub use config::RepairConfig;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, NullSink, TracingSink};
pub use error::{ConfigError, ExtractError, QuillError, QuillResult};
pub use json::{extract_json, normalize_escapes, JsonExtractor};
pub use markup::{
    sanitize_markup, split_document, BalanceRepairer, MarkupSanitizer, SpecialCharEscaper,
};
pub use patch::{apply_patches, Patch, PatchOutcome, PatchReport};
pub use pipeline::Pipeline;
pub use references::{ReferenceEntry, ReferenceSet};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the repair pipeline
    pub use crate::config::RepairConfig;
    pub use crate::diagnostics::{Diagnostic, DiagnosticSink};
    pub use crate::error::{ExtractError, QuillError, QuillResult};
    pub use crate::patch::{Patch, PatchReport};
    pub use crate::pipeline::Pipeline;
    pub use crate::references::{ReferenceEntry, ReferenceSet};
}
