//! Testing utilities for the Quill workspace
//!
//! Shared fixtures, pipelines and assertions.

#![allow(missing_docs)]

use quill_repair::{
    CollectingSink, Diagnostic, Pipeline, ReferenceEntry, ReferenceSet, RepairConfig,
};
use std::sync::Arc;

/// Keys accepted by [`sample_references`]
pub const SAMPLE_KEYS: &[&str] = &["ref_1", "ref_3", "ref_7", "ref_12"];

pub fn sample_references() -> ReferenceSet {
    let mut refs = ReferenceSet::new();
    refs.insert(
        "ref_1",
        ReferenceEntry::default()
            .with_author("Armbrust, M. and Das, T.")
            .with_title("Delta Lake: High-Performance ACID Table Storage")
            .with_year("2020"),
    );
    refs.insert(
        "ref_3",
        ReferenceEntry::default()
            .with_title("Lakehouse: A New Generation of Open Platforms")
            .with_year("2021"),
    );
    refs.insert("ref_7", ReferenceEntry::default().with_title("Apache Iceberg"));
    refs.insert(
        "ref_12",
        ReferenceEntry::default().with_title("Unity Catalog & Governance"),
    );
    refs
}

pub fn sample_references_json() -> String {
    serde_json::to_string(&sample_references()).unwrap_or_default()
}

/// Pipeline with default config recording every diagnostic
pub fn setup_pipeline() -> (Pipeline, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let pipeline = Pipeline::new(RepairConfig::default())
        .unwrap()
        .with_sink(sink.clone());
    (pipeline, sink)
}

/// A full document as a model might return it after truncation
pub fn truncated_document() -> String {
    [
        r"\documentclass{article}",
        r"\usepackage{booktabs}",
        r"\begin{document}",
        r"\section{Results}",
        r"Unity & Catalog (ref_12) improves R&D throughput (ref_1, ref_99).",
        r"\begin{tabular}{lc}",
        r"System & Score \\",
        r"Delta & 0.91 \\",
        r"\end{tabular}",
        r"\begin{itemize}",
        r"\item \textbf{Scal",
    ]
    .join("\n")
}

/// A well-formed document that compilation must leave unchanged
pub fn clean_document() -> String {
    [
        r"\documentclass{article}",
        r"\begin{document}",
        r"\section{Intro}",
        r"Tables \cite{ref_1} and R\&D \cite{ref_3,ref_7}.",
        r"\begin{align*}",
        r"x &= 1",
        r"\end{align*}",
        r"\end{document}",
    ]
    .join("\n")
}

pub fn assert_balanced(document: &str) {
    let mut depth = 0i64;
    let mut escaped = false;
    let mut comment = false;
    for c in document.chars() {
        if comment {
            comment = c != '\n';
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '%' => comment = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        assert!(depth >= 0, "stray closer in {document:?}");
    }
    assert_eq!(depth, 0, "unbalanced braces in {document:?}");
    assert_eq!(
        document.matches(r"\begin{").count(),
        document.matches(r"\end{").count(),
        "unbalanced environments in {document:?}"
    );
}

pub fn count_suspicious(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_suspicious()).count()
}
