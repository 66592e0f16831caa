//! End-to-end behavior on the reference scenarios.
//!
//! Each test drives the public API exactly as an orchestrator would:
//! raw model text in, recovered value or compiled document out.

use pretty_assertions::assert_eq;
use quill_repair::prelude::*;
use quill_repair::{extract_json, BalanceRepairer, CitationCompiler, NullSink};
use serde_json::json;

/// A backslash command inside a JSON string survives extraction.
///
/// `\b` is a legal JSON escape (backspace), so a naive parser silently turns
/// `\begin` into a control character followed by `egin`.
#[test]
fn scenario_a_command_in_string() {
    let raw = r#""content": "\begin{itemize}""#;
    let value = extract_json(&format!("{{{raw}}}")).unwrap();
    assert_eq!(value["content"], r"\begin{itemize}");

    let bare = extract_json(raw).unwrap();
    assert_eq!(bare, json!({"content": r"\begin{itemize}"}));
}

#[test]
fn scenario_b_citation_and_escaping() {
    let pipeline = Pipeline::new(RepairConfig::default()).unwrap();
    let refs = ReferenceSet::from_keys(["ref_12"]);
    let out = pipeline.compile_document("Unity & Catalog (ref_12) do R&D", &refs);
    assert_eq!(out, r"Unity \& Catalog \cite{ref_12} do R\&D");
}

#[test]
fn scenario_c_adjacent_citations_merge() {
    let compiler = CitationCompiler::new(&RepairConfig::default()).unwrap();
    assert_eq!(
        compiler.merge_adjacent(r"\cite{a}\cite{b} \cite{c}"),
        r"\cite{a,b,c}"
    );
}

/// Frames left open at end of input close innermost first.
#[test]
fn scenario_d_open_environments_closed() {
    let doc = "\\begin{outer}\nA\n\\begin{inner}\nB";
    let out = BalanceRepairer::default().repair(doc, &NullSink);
    assert!(out.ends_with("\\end{inner}\n\\end{outer}"), "{out}");
    assert_eq!(out.matches("\\end{").count(), 2);
}

#[test]
fn scenario_e_prose_before_object() {
    let value = extract_json(r#"Here is the content: {"found": false}"#).unwrap();
    assert_eq!(value, json!({"found": false}));
}

/// Truncated replies are distinguishable so callers stop retrying.
#[test]
fn truncated_reply_is_not_retryable() {
    let err = extract_json(r#"```json
{"title": "Lakehouse", "sections": [{"body": "The storage la"#)
    .unwrap_err();
    assert!(err.is_truncated());
    assert!(!err.is_retryable());
}

#[test]
fn garbage_reply_is_retryable() {
    let err = extract_json("{this is not json at all}").unwrap_err();
    assert!(matches!(err, ExtractError::MalformedJson { .. }));
    assert!(err.is_retryable());

    let err = extract_json("I could not produce the requested output.").unwrap_err();
    assert!(matches!(err, ExtractError::NoStructureFound { .. }));
}
