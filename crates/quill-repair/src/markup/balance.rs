//! Brace and environment balance repair
//!
//! A single pass over the whole document with a brace-depth counter, an
//! environment stack and a tagged scan state. The repairer never fails: its
//! output always ends at depth zero with every opened environment closed.
//!
//! Each frame remembers the brace depth at which it was opened. Closing an
//! environment flushes only the braces opened inside it, so a group that
//! wraps a whole environment is not closed early.

use crate::config::RepairConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::markup::{
    command_name, env_marker, verbatim_arguments_end, verbatim_environment_end, MarkerKind,
};

/// Scanner position relative to escapes and comments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    /// Previous character was an unconsumed backslash
    Escape,
    /// Inside a `%` comment, until end of line
    Comment,
}

#[derive(Debug)]
struct Frame<'a> {
    name: &'a str,
    base_depth: usize,
}

/// Self-healing brace/environment matcher
#[derive(Debug, Clone)]
pub struct BalanceRepairer {
    config: RepairConfig,
}

impl Default for BalanceRepairer {
    fn default() -> Self {
        Self::new(RepairConfig::default())
    }
}

impl BalanceRepairer {
    /// Create repairer; `config` supplies verbatim commands and environments
    #[inline]
    #[must_use]
    pub fn new(config: RepairConfig) -> Self {
        Self { config }
    }

    /// Repair `document` so every brace group and environment is closed
    ///
    /// - A close marker for the top frame flushes that frame's open braces.
    /// - A close marker for a lower frame first closes every frame above it.
    /// - A close marker for no open frame is copied as-is.
    /// - At end of input remaining braces and frames are closed innermost
    ///   first.
    #[must_use]
    pub fn repair(&self, document: &str, sink: &dyn DiagnosticSink) -> String {
        self.repair_within(document, None, sink)
    }

    /// Repair a body whose text sits inside an already open `enclosing`
    /// environment, such as the `document` environment opened by the
    /// preamble
    #[must_use]
    pub fn repair_within(
        &self,
        document: &str,
        enclosing: Option<&str>,
        sink: &dyn DiagnosticSink,
    ) -> String {
        let mut out = String::with_capacity(document.len() + 32);
        let mut stack: Vec<Frame<'_>> = enclosing
            .map(|name| Frame {
                name,
                base_depth: 0,
            })
            .into_iter()
            .collect();
        let mut depth = 0usize;
        let mut state = ScanState::Normal;
        let mut i = 0;

        while i < document.len() {
            let rest = &document[i..];
            let Some(c) = rest.chars().next() else { break };

            match state {
                ScanState::Comment => {
                    out.push(c);
                    i += c.len_utf8();
                    if c == '\n' {
                        state = ScanState::Normal;
                    }
                }
                ScanState::Escape => {
                    out.push(c);
                    i += c.len_utf8();
                    state = ScanState::Normal;
                }
                ScanState::Normal => match c {
                    '\\' => {
                        if let Some(marker) = env_marker(document, i) {
                            match marker.kind {
                                MarkerKind::Begin
                                    if self.config.is_verbatim_environment(marker.name) =>
                                {
                                    let end =
                                        verbatim_environment_end(document, marker.end, marker.name);
                                    if end.is_none() {
                                        stack.push(Frame {
                                            name: marker.name,
                                            base_depth: depth,
                                        });
                                    }
                                    let end = end.unwrap_or(document.len());
                                    out.push_str(&document[i..end]);
                                    i = end;
                                }
                                MarkerKind::Begin => {
                                    stack.push(Frame {
                                        name: marker.name,
                                        base_depth: depth,
                                    });
                                    out.push_str(&document[i..marker.end]);
                                    i = marker.end;
                                }
                                MarkerKind::End => {
                                    close_frame(&mut out, &mut stack, &mut depth, marker.name, sink);
                                    out.push_str(&document[i..marker.end]);
                                    i = marker.end;
                                }
                            }
                            continue;
                        }

                        let name = command_name(document, i);
                        if !name.is_empty() && self.config.is_verbatim_command(name) {
                            let (end, unclosed) =
                                verbatim_arguments_end(document, i + 1 + name.len(), name);
                            out.push_str(&document[i..end]);
                            depth += unclosed;
                            i = end;
                            continue;
                        }

                        out.push('\\');
                        i += 1;
                        state = ScanState::Escape;
                    }
                    '%' => {
                        out.push('%');
                        i += 1;
                        state = ScanState::Comment;
                    }
                    '{' => {
                        depth += 1;
                        out.push('{');
                        i += 1;
                    }
                    '}' => {
                        depth = depth.saturating_sub(1);
                        out.push('}');
                        i += 1;
                    }
                    _ => {
                        out.push(c);
                        i += c.len_utf8();
                    }
                },
            }
        }

        if depth == 0 && stack.is_empty() {
            return out;
        }

        if state != ScanState::Normal {
            out.push('\n');
        }
        while let Some(frame) = stack.pop() {
            flush_braces(&mut out, &mut depth, frame.base_depth, sink);
            out.push('\n');
            push_synthetic_close(&mut out, frame.name, sink);
        }
        flush_braces(&mut out, &mut depth, 0, sink);

        out
    }
}

/// Handle `\end{name}`; the real marker is emitted by the caller
fn close_frame(
    out: &mut String,
    stack: &mut Vec<Frame<'_>>,
    depth: &mut usize,
    name: &str,
    sink: &dyn DiagnosticSink,
) {
    let Some(target) = stack.iter().rposition(|f| f.name == name) else {
        sink.emit(&Diagnostic::OrphanClose {
            environment: name.to_string(),
        });
        return;
    };

    while stack.len() > target + 1 {
        if let Some(frame) = stack.pop() {
            flush_braces(out, depth, frame.base_depth, sink);
            push_synthetic_close(out, frame.name, sink);
        }
    }
    if let Some(frame) = stack.pop() {
        flush_braces(out, depth, frame.base_depth, sink);
    }
}

fn flush_braces(out: &mut String, depth: &mut usize, base: usize, sink: &dyn DiagnosticSink) {
    if *depth <= base {
        return;
    }
    let count = *depth - base;
    out.extend(std::iter::repeat('}').take(count));
    *depth = base;
    sink.emit(&Diagnostic::SyntheticBraces { count });
}

fn push_synthetic_close(out: &mut String, name: &str, sink: &dyn DiagnosticSink) {
    out.push_str("\\end{");
    out.push_str(name);
    out.push('}');
    sink.emit(&Diagnostic::SyntheticClose {
        environment: name.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NullSink};
    use pretty_assertions::assert_eq;

    fn repair(doc: &str) -> String {
        BalanceRepairer::default().repair(doc, &NullSink)
    }

    #[test]
    fn balanced_untouched() {
        let doc = "\\begin{itemize}\n\\item \\textbf{a}\n\\end{itemize}";
        assert_eq!(repair(doc), doc);
    }

    #[test]
    fn unclosed_environments_closed_innermost_first() {
        let doc = "\\begin{outer}\n\\begin{inner}\ntext";
        assert_eq!(
            repair(doc),
            "\\begin{outer}\n\\begin{inner}\ntext\n\\end{inner}\n\\end{outer}"
        );
    }

    #[test]
    fn unclosed_braces_flushed_before_close() {
        let doc = "\\begin{itemize}\\item \\textbf{a\\end{itemize}";
        assert_eq!(repair(doc), "\\begin{itemize}\\item \\textbf{a}\\end{itemize}");
    }

    #[test]
    fn closing_lower_frame_closes_frames_above() {
        let sink = CollectingSink::new();
        let doc = "\\begin{a}\\begin{b}\\begin{c}x\\end{a}";
        let out = BalanceRepairer::default().repair(doc, &sink);
        assert_eq!(out, "\\begin{a}\\begin{b}\\begin{c}x\\end{c}\\end{b}\\end{a}");
        assert_eq!(
            sink.diagnostics(),
            vec![
                Diagnostic::SyntheticClose {
                    environment: "c".to_string()
                },
                Diagnostic::SyntheticClose {
                    environment: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn orphan_close_left_alone() {
        let sink = CollectingSink::new();
        let doc = "text\\end{itemize} more";
        let out = BalanceRepairer::default().repair(doc, &sink);
        assert_eq!(out, doc);
        assert!(sink.diagnostics()[0].is_suspicious());
    }

    #[test]
    fn outer_group_survives_inner_environment() {
        let doc = "{\\begin{center}x\\end{center}}";
        assert_eq!(repair(doc), doc);
    }

    #[test]
    fn stray_closer_copied() {
        assert_eq!(repair("a}b"), "a}b");
    }

    #[test]
    fn escaped_braces_not_counted() {
        assert_eq!(repair(r"\{ set \}"), r"\{ set \}");
        assert_eq!(repair(r"\{ open"), r"\{ open");
    }

    #[test]
    fn comments_not_counted() {
        assert_eq!(repair("% {{{\ntext"), "% {{{\ntext");
    }

    #[test]
    fn braces_after_trailing_comment_go_on_new_line() {
        assert_eq!(repair("\\textbf{x % note"), "\\textbf{x % note\n}");
    }

    #[test]
    fn trailing_backslash_does_not_escape_closer() {
        assert_eq!(repair("{a\\"), "{a\\\n}");
    }

    #[test]
    fn verbatim_url_percent_is_not_comment() {
        let doc = "\\url{https://x.org/a%20b} {open";
        assert_eq!(repair(doc), "\\url{https://x.org/a%20b} {open}");
    }

    #[test]
    fn verbatim_environment_braces_ignored() {
        let doc = "\\begin{verbatim}\nfn x() {\n\\end{verbatim}";
        assert_eq!(repair(doc), doc);
    }

    #[test]
    fn unterminated_verbatim_environment_closed() {
        let doc = "\\begin{verbatim}\nfn x() {";
        assert_eq!(repair(doc), "\\begin{verbatim}\nfn x() {\n\\end{verbatim}");
    }

    #[test]
    fn enclosing_environment_closed_at_end() {
        let body = "\n\\section{A}\n\\textbf{cut";
        let out = BalanceRepairer::default().repair_within(body, Some("document"), &NullSink);
        assert_eq!(out, "\n\\section{A}\n\\textbf{cut}\n\\end{document}");
    }

    #[test]
    fn enclosing_environment_closed_by_real_marker() {
        let body = "\n\\begin{itemize}\\item x\n\\end{document}";
        let out = BalanceRepairer::default().repair_within(body, Some("document"), &NullSink);
        assert_eq!(out, "\n\\begin{itemize}\\item x\n\\end{itemize}\\end{document}");
    }

    #[test]
    fn idempotent_on_repaired_output() {
        let doc = "\\begin{a}{x\\begin{b}\\end{a}}\\end{q}{\\begin{c}% c\n\\";
        let once = repair(doc);
        assert_eq!(repair(&once), once);
    }
}
