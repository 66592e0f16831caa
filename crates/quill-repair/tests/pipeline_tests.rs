//! Full pipeline runs over realistic model output.

use pretty_assertions::assert_eq;
use quill_repair::prelude::*;
use quill_repair::PatchOutcome;
use quill_test_utils::{
    assert_balanced, clean_document, count_suspicious, sample_references, setup_pipeline,
    truncated_document,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Section {
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct Draft {
    title: String,
    sections: Vec<Section>,
}

/// A fenced reply with reasoning, prose and invalid escapes decodes and
/// sanitizes into clean fields.
#[test]
fn draft_reply_to_clean_fields() {
    let (pipeline, sink) = setup_pipeline();
    let raw = r###"<think>The user wants a draft.</think>
Sure! Here is the draft you asked for:
```json
{
  "title": "Lakehouse Storage",
  "sections": [
    {"title": "## Background", "body": "Table formats like **Delta** (ref_1) at 5\degree scale.\n\item one"}
  ]
}
```
Let me know if you need anything else."###;

    let value = pipeline.extract_json(raw).unwrap();
    let value = pipeline.sanitize_value(value);
    let draft: Draft = serde_json::from_value(value).unwrap();

    assert_eq!(draft.title, "Lakehouse Storage");
    assert_eq!(draft.sections[0].title, r"\subsection{Background}");
    assert_eq!(
        draft.sections[0].body,
        "Table formats like \\textbf{Delta} (ref_1) at 5$^{\\circ}$ scale.\n\\item one"
    );
    assert!(sink
        .diagnostics()
        .iter()
        .any(|d| matches!(d, Diagnostic::FenceStripped)));
}

#[test]
fn truncated_document_compiles_balanced() {
    let (pipeline, sink) = setup_pipeline();
    let out = pipeline.compile_document(&truncated_document(), &sample_references());

    assert!(out.starts_with("\\documentclass{article}\n\\usepackage{booktabs}\n\\begin{document}\n"));
    assert!(out.contains(r"Unity \& Catalog \cite{ref_12} improves R\&D throughput \cite{ref_1}."));
    assert!(out.contains("System & Score"));
    assert!(out.ends_with("\\item \\textbf{Scal}\n\\end{itemize}\n\\end{document}"));
    assert_balanced(&out);
    assert_eq!(count_suspicious(&sink.diagnostics()), 0);
}

#[test]
fn clean_document_unchanged() {
    let (pipeline, sink) = setup_pipeline();
    let doc = clean_document();
    assert_eq!(pipeline.compile_document(&doc, &sample_references()), doc);
    assert!(sink.is_empty());
}

#[test]
fn compilation_is_idempotent() {
    let (pipeline, _) = setup_pipeline();
    let refs = sample_references();
    let once = pipeline.compile_document(&truncated_document(), &refs);
    assert_eq!(pipeline.compile_document(&once, &refs), once);
}

#[test]
fn hallucinated_citation_reported() {
    let (pipeline, sink) = setup_pipeline();
    let doc = "\\begin{document}\nAs shown \\cite{ref_1,smith2020}.\n\\end{document}";
    let out = pipeline.compile_document(doc, &sample_references());
    assert_eq!(out, "\\begin{document}\nAs shown [?].\n\\end{document}");
    assert_eq!(count_suspicious(&sink.diagnostics()), 1);
}

#[test]
fn exported_bibliography_matches_citations() {
    let (pipeline, _) = setup_pipeline();
    let refs = sample_references();
    let out = pipeline.compile_document(&truncated_document(), &refs);

    let cited = refs.cited_keys(&out);
    assert_eq!(cited, vec!["ref_12", "ref_1"]);

    let bib = refs.to_bibtex(&cited);
    assert!(bib.starts_with("@misc{ref_12,\n  title = {Unity Catalog \\& Governance},"));
    assert!(bib.contains("@misc{ref_1,\n  author = {Armbrust, M. and Das, T.},"));
}

#[test]
fn revision_patches_applied_and_reported() {
    let (pipeline, sink) = setup_pipeline();
    let doc = "Intro text.\nThe lakehouse   pattern\nunifies storage.\nEnd.";
    let patches = vec![
        Patch::new("The lakehouse pattern unifies storage.", "**Lakehouses** unify storage."),
        Patch::new("Not in the document", "x"),
        Patch::new("End.", "Fin."),
    ];

    let report = pipeline.apply_patches(doc, &patches);
    assert_eq!(
        report.document,
        "Intro text.\n\\textbf{Lakehouses} unify storage.\nFin."
    );
    assert_eq!(
        report.outcomes,
        vec![PatchOutcome::Fuzzy, PatchOutcome::NotFound, PatchOutcome::Exact]
    );
    assert_eq!(count_suspicious(&sink.diagnostics()), 1);
}

#[test]
fn references_load_from_json_forms() {
    let from_keys: ReferenceSet = serde_json::from_value(json!(["ref_1", "ref_3"])).unwrap();
    let from_map: ReferenceSet =
        serde_json::from_value(json!({"ref_1": {"title": "A"}, "ref_3": {}})).unwrap();
    assert_eq!(
        from_keys.keys().collect::<Vec<_>>(),
        from_map.keys().collect::<Vec<_>>()
    );
}

#[test]
fn batch_compilation_matches_sequential() {
    let (pipeline, _) = setup_pipeline();
    let refs = sample_references();
    let docs: Vec<String> = (0..16)
        .map(|i| format!("Item {i} & (ref_{}) \\begin{{itemize}}", i % 4))
        .collect();

    let parallel = pipeline.compile_many(&docs, &refs);
    let sequential: Vec<String> = docs
        .iter()
        .map(|d| pipeline.compile_document(d, &refs))
        .collect();
    assert_eq!(parallel, sequential);
}
