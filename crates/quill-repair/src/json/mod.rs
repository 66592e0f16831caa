//! Structured value recovery from raw model output
//!
//! Model replies wrap JSON in prose, code fences, truncate it mid-string and
//! sprinkle invalid escapes through it. [`JsonExtractor`] locates the first
//! object or array, isolates it with a string-aware bracket matcher and runs
//! a fixed ladder of recovery attempts before giving up.

use crate::config::RepairConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::error::Category;
use serde_json::Value;

mod escape;

pub use escape::normalize_escapes;
use escape::normalize_escapes_counted;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap());

static BARE_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*"(?:[^"\\]|\\.)*"\s*:"#).unwrap());

/// Extractor for structured values embedded in model output
#[derive(Debug, Clone, Copy)]
pub struct JsonExtractor {
    snippet_chars: usize,
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonExtractor {
    /// Create extractor with default snippet length
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { snippet_chars: 200 }
    }

    /// Create extractor from pipeline configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            snippet_chars: config.snippet_chars,
        }
    }

    /// Recover the first object or array in `raw`
    ///
    /// Attempts, in order:
    /// 1. the balanced candidate as-is
    /// 2. the whole text wrapped in braces, if it is a bare `"key": value`
    /// 3. the candidate with invalid escapes doubled
    /// 4. the escape-normalized text wrapped in braces, if a bare pair
    ///
    /// # Errors
    /// - [`ExtractError::NoStructureFound`] if there is no `{` or `[`
    /// - [`ExtractError::TruncatedOutput`] if parsing hit end of input
    /// - [`ExtractError::MalformedJson`] for any other failure
    pub fn extract(&self, raw: &str, sink: &dyn DiagnosticSink) -> Result<Value, ExtractError> {
        let cleaned = strip_fence(raw, sink);

        let Some((start, open, close)) = locate_structure(cleaned) else {
            return Err(ExtractError::NoStructureFound {
                preview: head(raw.trim(), self.snippet_chars),
            });
        };

        let candidate = match balanced_end(cleaned, start, open, close) {
            Some(end) => &cleaned[start..end],
            None => {
                let rest = &cleaned[start..];
                sink.emit(&Diagnostic::TruncatedCandidate {
                    consumed: rest.chars().count(),
                });
                rest
            }
        };

        let mut last_err = match parse_container(candidate, sink) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let bare_pair = BARE_PAIR.is_match(cleaned);
        if bare_pair {
            match parse_container(&format!("{{{cleaned}}}"), sink) {
                Ok(value) => {
                    sink.emit(&Diagnostic::BarePairWrapped);
                    return Ok(value);
                }
                Err(e) => last_err = e,
            }
        }

        let (normalized, repaired) = normalize_escapes_counted(candidate);
        if repaired > 0 {
            match serde_json::from_str::<Value>(&normalized) {
                Ok(value) if is_container(&value) => {
                    sink.emit(&Diagnostic::EscapesNormalized { repaired });
                    return Ok(value);
                }
                Ok(_) => {}
                Err(e) => last_err = e,
            }
        }

        if bare_pair {
            let (normalized, repaired) = normalize_escapes_counted(cleaned);
            match serde_json::from_str::<Value>(&format!("{{{normalized}}}")) {
                Ok(value) => {
                    sink.emit(&Diagnostic::EscapesNormalized { repaired });
                    sink.emit(&Diagnostic::BarePairWrapped);
                    return Ok(value);
                }
                Err(e) => last_err = e,
            }
        }

        Err(self.classify(candidate, &last_err))
    }

    fn classify(&self, candidate: &str, err: &serde_json::Error) -> ExtractError {
        let message = err.to_string();
        if err.classify() == Category::Eof || message.contains("EOF while parsing") {
            ExtractError::TruncatedOutput { message }
        } else {
            ExtractError::malformed(tail(candidate, self.snippet_chars), message)
        }
    }
}

/// Recover the first object or array in `raw`, logging repairs via
/// `tracing`
///
/// # Examples
///
/// ```
/// use quill_repair::json::extract_json;
///
/// let value = extract_json(r#"Here is the content: {"found": false}"#).unwrap();
/// assert_eq!(value["found"], false);
/// ```
///
/// # Errors
/// See [`JsonExtractor::extract`].
pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    JsonExtractor::new().extract(raw, &TracingSink)
}

/// Parse text that must yield an object or array
///
/// A successful parse whose strings contain a backspace came from a `\b`
/// escape; those are re-read through the escape normalizer so `\begin`
/// is not silently corrupted.
fn parse_container(text: &str, sink: &dyn DiagnosticSink) -> Result<Value, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if !contains_backspace(&value) {
        return Ok(value);
    }
    let (normalized, repaired) = normalize_escapes_counted(text);
    match serde_json::from_str::<Value>(&normalized) {
        Ok(fixed) => {
            sink.emit(&Diagnostic::EscapesNormalized { repaired });
            Ok(fixed)
        }
        Err(_) => Ok(value),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn contains_backspace(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\u{8}'),
        Value::Array(items) => items.iter().any(contains_backspace),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| k.contains('\u{8}') || contains_backspace(v)),
        _ => false,
    }
}

/// Trim and remove a code-fence wrapper
///
/// A fence around the whole reply is peeled off; failing that, the first
/// fenced block that contains a bracket is used.
fn strip_fence<'a>(raw: &'a str, sink: &dyn DiagnosticSink) -> &'a str {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        let body = body.trim_end();
        let body = body.strip_suffix("```").unwrap_or(body);
        sink.emit(&Diagnostic::FenceStripped);
        return body.trim();
    }

    if let Some(body) = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|body| body.contains(['{', '[']))
    {
        sink.emit(&Diagnostic::FenceStripped);
        return body.trim();
    }

    trimmed
}

/// Earlier of the first `{` and first `[`, with its matching closer
fn locate_structure(text: &str) -> Option<(usize, char, char)> {
    match (text.find('{'), text.find('[')) {
        (Some(o), Some(a)) if a < o => Some((a, '[', ']')),
        (Some(o), _) => Some((o, '{', '}')),
        (None, Some(a)) => Some((a, '[', ']')),
        (None, None) => None,
    }
}

/// Byte index just past the closer that brings depth back to zero
///
/// Only the opening bracket kind is counted; brackets inside string
/// literals are ignored. `None` means the input ended first.
fn balanced_end(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn head(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn tail(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(chars)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NullSink};
    use serde_json::json;

    fn extract(raw: &str) -> Result<Value, ExtractError> {
        JsonExtractor::new().extract(raw, &NullSink)
    }

    #[test]
    fn plain_object() {
        assert_eq!(extract(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn object_after_prose() {
        let value = extract(r#"Here is the content: {"found": false}"#).unwrap();
        assert_eq!(value, json!({"found": false}));
    }

    #[test]
    fn trailing_prose_ignored() {
        let value = extract(r#"{"a": [1, 2]} Let me know if you need more!"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn whole_reply_fenced() {
        let sink = CollectingSink::new();
        let raw = "```json\n{\"title\": \"Paper\"}\n```";
        let value = JsonExtractor::new().extract(raw, &sink).unwrap();
        assert_eq!(value, json!({"title": "Paper"}));
        assert!(sink.diagnostics().contains(&Diagnostic::FenceStripped));
    }

    #[test]
    fn fenced_block_inside_prose() {
        let raw = "Sure [see below]:\n```json\n{\"k\": [1]}\n```\nDone.";
        assert_eq!(extract(raw).unwrap(), json!({"k": [1]}));
    }

    #[test]
    fn array_before_object() {
        let value = extract(r#"[{"a": 1}, {"b": 2}]"#).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let value = extract(r#"{"code": "fn main() { }}}"} tail"#).unwrap();
        assert_eq!(value["code"], "fn main() { }}}");
    }

    #[test]
    fn invalid_escapes_repaired() {
        let sink = CollectingSink::new();
        let raw = r#"{"body": "\section{Intro} \item one"}"#;
        let value = JsonExtractor::new().extract(raw, &sink).unwrap();
        assert_eq!(value["body"], r"\section{Intro} \item one");
        assert!(sink
            .diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::EscapesNormalized { repaired: 2 })));
    }

    #[test]
    fn backspace_escape_read_as_command() {
        let value = extract(r#"{"content": "\begin{itemize}"}"#).unwrap();
        assert_eq!(value["content"], r"\begin{itemize}");
    }

    #[test]
    fn bare_pair_wrapped() {
        let value = extract(r#""content": "\begin{itemize}""#).unwrap();
        assert_eq!(value, json!({"content": r"\begin{itemize}"}));
    }

    #[test]
    fn no_structure() {
        let err = extract("I could not complete this request.").unwrap_err();
        match err {
            ExtractError::NoStructureFound { preview } => {
                assert!(preview.starts_with("I could not"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_string() {
        let err = extract(r#"{"abstract": "We propose a meth"#).unwrap_err();
        assert!(err.is_truncated(), "got {err}");
    }

    #[test]
    fn truncated_between_values() {
        let err = extract(r#"{"sections": [{"title": "A"},"#).unwrap_err();
        assert!(err.is_truncated(), "got {err}");
    }

    #[test]
    fn malformed_carries_snippet() {
        let err = extract(r#"{"a": 1 "b": 2}"#).unwrap_err();
        match err {
            ExtractError::MalformedJson { snippet, message } => {
                assert!(snippet.ends_with(r#""b": 2}"#));
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn snippet_is_bounded() {
        let body = "x".repeat(500);
        let raw = format!("{{\"a\": {body}}}");
        let err = JsonExtractor::new()
            .extract(&raw, &NullSink)
            .unwrap_err();
        match err {
            ExtractError::MalformedJson { snippet, .. } => {
                assert_eq!(snippet.chars().count(), 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("héllo", 4), "éllo");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(head("héllo", 2), "hé");
    }
}
