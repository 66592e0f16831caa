//! Citation marker compilation
//!
//! Models write placeholder markers such as `(ref_3, ref_7)`. Compilation
//! runs four passes over a document body:
//!
//! 1. **Resolution**: each marker becomes a citation command listing its
//!    valid keys, or its escaped literal text when none are valid.
//! 2. **Adjacency merge**: `\cite{a}\cite{b}` becomes `\cite{a,b}`, repeated
//!    up to [`RepairConfig::merge_iteration_limit`] times.
//! 3. **Hallucination repair**: a citation command naming any key outside
//!    the reference set is replaced whole by the unresolved glyph.
//! 4. **Safety sweep**: raw markers the first pass missed are escaped.
//!
//! Verbatim command arguments and verbatim environments are copied through
//! untouched; the passes only see the prose between them.

use crate::config::RepairConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ConfigError;
use crate::markup::{
    command_name, env_marker, escape_literal, verbatim_arguments_end, verbatim_environment_end,
    MarkerKind,
};
use crate::references::ReferenceSet;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*(ref_[^()\n]*?)\s*\)").unwrap());

static STRAY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(\[]\s*ref_[^)\]\n]*[)\]]?").unwrap());

static TOKEN_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\s]+").unwrap());

/// Citation commands checked against the reference set besides the
/// configured one
const CITATION_COMMANDS: &[&str] = &[
    "cite",
    "citep",
    "citet",
    "citealp",
    "citealt",
    "citeauthor",
    "citeyear",
    "parencite",
    "textcite",
    "autocite",
    "footcite",
];

/// Compiler for citation markers against a closed reference set
#[derive(Debug, Clone)]
pub struct CitationCompiler {
    config: RepairConfig,
    command: String,
    adjacent: Regex,
    any_command: Regex,
}

impl CitationCompiler {
    /// Build compiler for the citation command named in `config`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails
    /// validation.
    pub fn new(config: &RepairConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let command = config.citation_command.clone();
        let name = regex::escape(&command);

        let adjacent = Regex::new(&format!(
            r"\\{name}\{{([^{{}}]*)\}}[ \t]*\\{name}\{{([^{{}}]*)\}}"
        ))
        .map_err(|e| ConfigError::Invalid(format!("citation_command: {e}")))?;

        let mut names: Vec<String> = CITATION_COMMANDS
            .iter()
            .map(|n| (*n).to_string())
            .collect();
        if !names.contains(&command) {
            names.push(name);
        }
        // Longest first so `citep` is not shadowed by `cite`.
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let any_command = Regex::new(&format!(
            r"\\(?:{})\*?(?:\[[^\]\n]*\]){{0,2}}\{{([^{{}}]*)\}}",
            names.join("|")
        ))
        .map_err(|e| ConfigError::Invalid(format!("citation_command: {e}")))?;

        Ok(Self {
            config: config.clone(),
            command,
            adjacent,
            any_command,
        })
    }

    /// Run all four passes over the prose of `body`
    #[must_use]
    pub fn compile(&self, body: &str, refs: &ReferenceSet, sink: &dyn DiagnosticSink) -> String {
        let mut out = String::with_capacity(body.len());
        let mut last = 0;
        for (start, end) in self.verbatim_spans(body) {
            out.push_str(&self.compile_prose(&body[last..start], refs, sink));
            out.push_str(&body[start..end]);
            last = end;
        }
        out.push_str(&self.compile_prose(&body[last..], refs, sink));
        out
    }

    fn compile_prose(&self, prose: &str, refs: &ReferenceSet, sink: &dyn DiagnosticSink) -> String {
        if prose.is_empty() {
            return String::new();
        }
        let resolved = self.resolve(prose, refs, sink);
        let merged = self.merge_adjacent(&resolved);
        let checked = self.repair_hallucinations(&merged, refs, sink);
        sweep_markers(&checked, sink)
    }

    /// Byte ranges of verbatim arguments and environments, in order
    fn verbatim_spans(&self, body: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut i = 0;
        while let Some(offset) = body[i..].find('\\') {
            let pos = i + offset;
            if let Some(marker) = env_marker(body, pos) {
                i = marker.end;
                if marker.kind == MarkerKind::Begin
                    && self.config.is_verbatim_environment(marker.name)
                {
                    i = verbatim_environment_end(body, marker.end, marker.name)
                        .unwrap_or(body.len());
                    spans.push((pos, i));
                }
                continue;
            }

            let name = command_name(body, pos);
            if !name.is_empty() && self.config.is_verbatim_command(name) {
                let (end, _) = verbatim_arguments_end(body, pos + 1 + name.len(), name);
                spans.push((pos, end));
                i = end;
                continue;
            }

            i = pos + 1 + body[pos + 1..].chars().next().map_or(0, char::len_utf8);
        }
        spans
    }

    /// Replace each marker with a citation command or its escaped literal
    #[must_use]
    pub fn resolve(&self, body: &str, refs: &ReferenceSet, sink: &dyn DiagnosticSink) -> String {
        MARKER
            .replace_all(body, |caps: &Captures<'_>| {
                let keys = valid_tokens(&caps[1], refs);
                if keys.is_empty() {
                    sink.emit(&Diagnostic::CitationUnresolved {
                        marker: caps[0].to_string(),
                    });
                    escape_literal(&caps[0])
                } else {
                    format!("\\{}{{{}}}", self.command, keys.join(","))
                }
            })
            .into_owned()
    }

    /// Merge directly adjacent citation commands until none remain or the
    /// iteration limit is reached
    #[must_use]
    pub fn merge_adjacent(&self, body: &str) -> String {
        let mut current = body.to_string();
        for _ in 0..self.config.merge_iteration_limit {
            let next = self.adjacent.replace_all(&current, |caps: &Captures<'_>| {
                format!("\\{}{{{}}}", self.command, union_keys(&caps[1], &caps[2]))
            });
            match next {
                Cow::Borrowed(_) => break,
                Cow::Owned(merged) => current = merged,
            }
        }
        current
    }

    /// Replace every citation command naming an unknown key with the glyph
    #[must_use]
    pub fn repair_hallucinations(
        &self,
        body: &str,
        refs: &ReferenceSet,
        sink: &dyn DiagnosticSink,
    ) -> String {
        self.any_command
            .replace_all(body, |caps: &Captures<'_>| {
                let unknown: Vec<String> = caps[1]
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !refs.contains(key))
                    .map(str::to_string)
                    .collect();
                if unknown.is_empty() {
                    caps[0].to_string()
                } else {
                    sink.emit(&Diagnostic::CitationHallucinated { keys: unknown });
                    self.config.unresolved_glyph.clone()
                }
            })
            .into_owned()
    }
}

/// Escape raw markers that survived resolution
fn sweep_markers(body: &str, sink: &dyn DiagnosticSink) -> String {
    STRAY_MARKER
        .replace_all(body, |caps: &Captures<'_>| {
            sink.emit(&Diagnostic::MarkerSwept {
                marker: caps[0].to_string(),
            });
            escape_literal(&caps[0])
        })
        .into_owned()
}

/// Tokens of a marker present in `refs`, in order, without duplicates
fn valid_tokens<'a>(list: &'a str, refs: &ReferenceSet) -> Vec<&'a str> {
    let mut keys: Vec<&str> = Vec::new();
    for token in TOKEN_SEPARATOR.split(list) {
        let token = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'));
        if !token.is_empty() && refs.contains(token) && !keys.contains(&token) {
            keys.push(token);
        }
    }
    keys
}

fn union_keys(first: &str, second: &str) -> String {
    let mut keys: Vec<&str> = Vec::new();
    for key in first.split(',').chain(second.split(',')).map(str::trim) {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NullSink};
    use pretty_assertions::assert_eq;

    fn compiler() -> CitationCompiler {
        CitationCompiler::new(&RepairConfig::default()).unwrap()
    }

    fn refs() -> ReferenceSet {
        ReferenceSet::from_keys(["ref_3", "ref_7", "ref_12", "a", "b", "c"])
    }

    #[test]
    fn resolves_single_marker() {
        let out = compiler().compile("Delta Lake (ref_12) works", &refs(), &NullSink);
        assert_eq!(out, r"Delta Lake \cite{ref_12} works");
    }

    #[test]
    fn keeps_valid_tokens_in_order() {
        let out = compiler().resolve("x (ref_7; ref_99, ref_3 ref_7)", &refs(), &NullSink);
        assert_eq!(out, r"x \cite{ref_7,ref_3}");
    }

    #[test]
    fn strips_stray_punctuation() {
        let out = compiler().resolve("x (ref_3., 'ref_7')", &refs(), &NullSink);
        assert_eq!(out, r"x \cite{ref_3,ref_7}");
    }

    #[test]
    fn unresolved_marker_escaped() {
        let sink = CollectingSink::new();
        let out = compiler().compile("See (ref_99).", &refs(), &sink);
        assert_eq!(out, r"See (ref\_99).");
        assert_eq!(
            sink.diagnostics(),
            vec![Diagnostic::CitationUnresolved {
                marker: "(ref_99)".to_string()
            }]
        );
    }

    #[test]
    fn empty_reference_set_resolves_nothing() {
        let out = compiler().compile("a (ref_1) b", &ReferenceSet::new(), &NullSink);
        assert_eq!(out, r"a (ref\_1) b");
    }

    #[test]
    fn merges_adjacent_commands() {
        let out = compiler().merge_adjacent(r"\cite{a}\cite{b} \cite{c}");
        assert_eq!(out, r"\cite{a,b,c}");
    }

    #[test]
    fn merge_deduplicates() {
        let out = compiler().merge_adjacent(r"\cite{a,b} \cite{b,c}");
        assert_eq!(out, r"\cite{a,b,c}");
    }

    #[test]
    fn separated_commands_not_merged() {
        let body = "\\cite{a} and \\cite{b}\n\\cite{c}";
        assert_eq!(compiler().merge_adjacent(body), body);
    }

    #[test]
    fn adjacent_markers_merge_after_resolution() {
        let out = compiler().compile("x (ref_3) (ref_7).", &refs(), &NullSink);
        assert_eq!(out, r"x \cite{ref_3,ref_7}.");
    }

    #[test]
    fn merge_respects_iteration_limit() {
        let config = RepairConfig::default().with_merge_iteration_limit(1);
        let compiler = CitationCompiler::new(&config).unwrap();
        let out = compiler.merge_adjacent(r"\cite{a}\cite{b}\cite{c}\cite{a}");
        // One pass merges disjoint pairs only.
        assert_eq!(out, r"\cite{a,b}\cite{c,a}");
    }

    #[test]
    fn hallucinated_key_replaces_whole_command() {
        let sink = CollectingSink::new();
        let out = compiler().repair_hallucinations(r"x \cite{a,zz} \citep[p.~2]{b}", &refs(), &sink);
        assert_eq!(out, r"x [?] \citep[p.~2]{b}");
        assert_eq!(
            sink.diagnostics(),
            vec![Diagnostic::CitationHallucinated {
                keys: vec!["zz".to_string()]
            }]
        );
    }

    #[test]
    fn custom_glyph() {
        let config = RepairConfig::default().with_unresolved_glyph("??");
        let compiler = CitationCompiler::new(&config).unwrap();
        assert_eq!(compiler.compile(r"\cite{nope}", &refs(), &NullSink), "??");
    }

    #[test]
    fn sweeps_bracketed_markers() {
        let sink = CollectingSink::new();
        let out = compiler().compile("see [ref_3] and (ref_7", &refs(), &sink);
        assert_eq!(out, r"see [ref\_3] and (ref\_7");
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn custom_command_name() {
        let mut config = RepairConfig::default();
        config.citation_command = "parencite".to_string();
        let compiler = CitationCompiler::new(&config).unwrap();
        let out = compiler.compile("x (ref_3)(ref_7)", &refs(), &NullSink);
        assert_eq!(out, r"x \parencite{ref_3,ref_7}");
    }

    #[test]
    fn verbatim_environment_left_alone() {
        let body = "\\begin{lstlisting}\nx = f(ref_count)\ny = a[ref_idx]\n\\end{lstlisting}\n(ref_3)";
        let sink = CollectingSink::new();
        let out = compiler().compile(body, &refs(), &sink);
        assert_eq!(
            out,
            "\\begin{lstlisting}\nx = f(ref_count)\ny = a[ref_idx]\n\\end{lstlisting}\n\\cite{ref_3}"
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn verbatim_command_argument_left_alone() {
        let body = r"see \url{http://h.org/p(ref_2)} and \verb|(ref_3)| (ref_7)";
        let out = compiler().compile(body, &refs(), &NullSink);
        assert_eq!(out, r"see \url{http://h.org/p(ref_2)} and \verb|(ref_3)| \cite{ref_7}");
    }

    #[test]
    fn unclosed_verbatim_environment_runs_to_end() {
        let body = "(ref_3)\\begin{verbatim}\n(ref_7) [ref_x";
        let out = compiler().compile(body, &refs(), &NullSink);
        assert_eq!(out, "\\cite{ref_3}\\begin{verbatim}\n(ref_7) [ref_x");
    }

    #[test]
    fn invalid_config_rejected() {
        let config = RepairConfig::default().with_merge_iteration_limit(0);
        assert!(CitationCompiler::new(&config).is_err());
    }
}
