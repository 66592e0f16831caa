//! Per-field cleanup of model-written markup
//!
//! Transforms, in order:
//! 1. drop block-quote lines
//! 2. drop reasoning headers, emphasized thinking markers and delimited
//!    thought blocks
//! 3. drop a leading "Here is ...:" lead-in
//! 4. drop a leading "Abstract:" / "Title:" label
//! 5. `**bold**` to `\textbf{bold}` (single-star italics stay: `a*b` in math)
//! 6. `#`..`####` headings to sectioning commands, deepest first
//! 7. move a sub/superscript that trails a closed math span back inside it
//! 8. math-wrap unsupported symbol commands, drop color commands, force
//!    stray Greek letters into math mode
//!
//! Every transform is `&str -> String` and the sequence is re-run until it
//! stops changing the text, so sanitizing sanitized output is a no-op.

use crate::markup::{command_name, env_marker, MarkerKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Upper bound on whole-sequence passes
const MAX_PASSES: usize = 4;

static BLOCK_QUOTE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*>[^\n]*(?:\n|$)").unwrap());

static THINKING_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*#{1,6}[ \t]*(?:reasoning|thinking|thought process|thoughts|internal monologue)\b[^\n]*(?:\n|$)",
    )
    .unwrap()
});

static THINKING_EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*{1,2}(?:thinking|reasoning|thoughts?)(?:[ \t]+process)?:?\*{1,2}:?[ \t]*")
        .unwrap()
});

static THOUGHT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<(?:think|thinking|thought|reasoning)>.*?</(?:think|thinking|thought|reasoning)>\s*|\[(?:thought|thinking)\].*?\[/(?:thought|thinking)\]\s*",
    )
    .unwrap()
});

static LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\A\s*(?:(?:sure|certainly|okay|ok|of course)[,!.]?\s*)?here(?:'s|\s+is|\s+are)\b[^:\n]*:[ \t]*(?:\r?\n)?",
    )
    .unwrap()
});

static LEAD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*(?:\*\*)?(?:abstract|title)(?:\*\*)?[ \t]*:(?:\*\*)?[ \t]*").unwrap()
});

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").unwrap());

/// Deepest first so `##` never consumes part of `####`
static HEADINGS: Lazy<[(Regex, &'static str); 4]> = Lazy::new(|| {
    let heading = |hashes: usize| {
        Regex::new(&format!(
            r"(?m)^[ \t]*#{{{hashes}}}[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$"
        ))
        .unwrap()
    };
    [
        (heading(4), r"\paragraph{${1}}"),
        (heading(3), r"\subsubsection{${1}}"),
        (heading(2), r"\subsection{${1}}"),
        (heading(1), r"\section{${1}}"),
    ]
});

static SCRIPT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[_^](?:\{[^{}\n]*\}|[A-Za-z0-9]+)").unwrap());

static COLOR_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:textcolor|colorbox|color)[ \t]*(?:\[[^\]\n]*\])?\{[^{}\n]*\}").unwrap()
});

/// Text-mode symbol commands the renderer lacks, with math equivalents
const SYMBOLS: &[(&str, &str)] = &[
    ("degree", r"^{\circ}"),
    ("textdegree", r"^{\circ}"),
    ("celsius", r"^{\circ}\mathrm{C}"),
    ("micro", r"\mu"),
    ("ohm", r"\Omega"),
    ("textpm", r"\pm"),
    ("texttimes", r"\times"),
];

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "varepsilon", "zeta", "eta", "theta",
    "vartheta", "iota", "kappa", "lambda", "mu", "nu", "xi", "pi", "varpi", "rho", "varrho",
    "sigma", "varsigma", "tau", "upsilon", "phi", "varphi", "chi", "psi", "omega", "Gamma",
    "Delta", "Theta", "Lambda", "Xi", "Pi", "Sigma", "Upsilon", "Phi", "Psi", "Omega",
];

const MATH_ENVIRONMENTS: &[&str] = &[
    "equation",
    "equation*",
    "align",
    "align*",
    "alignat",
    "alignat*",
    "gather",
    "gather*",
    "multline",
    "multline*",
    "flalign",
    "flalign*",
    "eqnarray",
    "eqnarray*",
    "math",
    "displaymath",
];

/// Sanitizer for one model-written text field
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupSanitizer;

impl MarkupSanitizer {
    /// Create sanitizer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every transform until the text is stable
    #[must_use]
    pub fn sanitize(&self, text: &str) -> String {
        let mut current = single_pass(text);
        for _ in 1..MAX_PASSES {
            let next = single_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Sanitize a fragment spliced into existing text
    ///
    /// Like [`Self::sanitize`], but the fragment's leading and trailing
    /// whitespace is kept so paragraph breaks around it survive.
    #[must_use]
    pub fn sanitize_fragment(&self, text: &str) -> String {
        let core = text.trim();
        if core.is_empty() {
            return text.to_string();
        }
        let lead = &text[..text.len() - text.trim_start().len()];
        let trail = &text[text.trim_end().len()..];
        let mut out = String::with_capacity(text.len());
        out.push_str(lead);
        out.push_str(&self.sanitize(core));
        out.push_str(trail);
        out
    }

    /// Sanitize every string leaf of a recovered value; keys are untouched
    #[must_use]
    pub fn sanitize_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.sanitize_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.sanitize_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Sanitize one text field
///
/// # Examples
///
/// ```
/// use quill_repair::markup::sanitize_markup;
///
/// let out = sanitize_markup("Here is the abstract: We study **graphs**.");
/// assert_eq!(out, r"We study \textbf{graphs}.");
/// ```
#[must_use]
pub fn sanitize_markup(text: &str) -> String {
    MarkupSanitizer.sanitize(text)
}

fn single_pass(text: &str) -> String {
    let text = BLOCK_QUOTE_LINE.replace_all(text, "");
    let text = strip_thinking(&text);
    let text = strip_lead_in(&text);
    let text = BOLD.replace_all(&text, r"\textbf{${1}}");
    let text = convert_headings(&text);
    let text = relocate_scripts(&text);
    let text = COLOR_COMMAND.replace_all(&text, "");
    let text = normalize_symbols(&text);
    text.trim().to_string()
}

fn strip_thinking(text: &str) -> String {
    let text = THOUGHT_BLOCK.replace_all(text, "");
    let text = THINKING_HEADER.replace_all(&text, "");
    THINKING_EMPHASIS.replace_all(&text, "").into_owned()
}

fn strip_lead_in(text: &str) -> String {
    let text = LEAD_IN.replace(text, "");
    LEAD_LABEL.replace(&text, "").into_owned()
}

fn convert_headings(text: &str) -> String {
    HEADINGS
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// `$x$_i` to `$x_i$`, and `\(x\)^2` to `\(x^2\)`
///
/// Scans rather than pattern-matches so a closing `$` is never mistaken
/// for an opening one.
fn relocate_scripts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut inline_dollar = false;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let Some(c) = rest.chars().next() else { break };

        match c {
            '\\' => {
                let len = 1 + rest[1..].chars().next().map_or(0, char::len_utf8);
                i += len;
                if &rest[..len] == r"\)" {
                    out.push_str(take_scripts(text, &mut i));
                }
                out.push_str(&rest[..len]);
            }
            '$' if rest.starts_with("$$") => {
                out.push_str("$$");
                i += 2;
            }
            '$' => {
                i += 1;
                if inline_dollar {
                    out.push_str(take_scripts(text, &mut i));
                }
                inline_dollar = !inline_dollar;
                out.push('$');
            }
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    out
}

/// Consume consecutive `_x` / `^{...}` operators starting at `*i`
fn take_scripts<'a>(text: &'a str, i: &mut usize) -> &'a str {
    let start = *i;
    while let Some(m) = SCRIPT_SUFFIX.find(&text[*i..]) {
        *i += m.end();
    }
    &text[start..*i]
}

/// Math-mode-aware pass over symbol and Greek-letter commands
fn normalize_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut inline_dollar = false;
    let mut display_dollar = false;
    let mut delimiters = 0usize;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let Some(c) = rest.chars().next() else { break };
        let in_math = inline_dollar || display_dollar || delimiters > 0;

        match c {
            '$' if rest.starts_with("$$") => {
                display_dollar = !display_dollar;
                out.push_str("$$");
                i += 2;
            }
            '$' => {
                inline_dollar = !inline_dollar;
                out.push('$');
                i += 1;
            }
            '\\' => {
                if let Some(marker) = env_marker(text, i) {
                    if MATH_ENVIRONMENTS.contains(&marker.name) {
                        match marker.kind {
                            MarkerKind::Begin => delimiters += 1,
                            MarkerKind::End => delimiters = delimiters.saturating_sub(1),
                        }
                    }
                    out.push_str(&text[i..marker.end]);
                    i = marker.end;
                    continue;
                }

                let name = command_name(text, i);
                if name.is_empty() {
                    let len = 1 + rest[1..].chars().next().map_or(0, char::len_utf8);
                    match &rest[..len] {
                        r"\(" | r"\[" => delimiters += 1,
                        r"\)" | r"\]" => delimiters = delimiters.saturating_sub(1),
                        _ => {}
                    }
                    out.push_str(&rest[..len]);
                    i += len;
                    continue;
                }

                let mut end = i + 1 + name.len();
                let math_form = if let Some((_, form)) = SYMBOLS.iter().find(|(n, _)| *n == name) {
                    if text[end..].starts_with("{}") {
                        end += 2;
                    }
                    Some((*form).to_string())
                } else if GREEK.contains(&name) && !in_math {
                    Some(format!("\\{name}"))
                } else {
                    None
                };

                match math_form {
                    Some(form) if in_math => out.push_str(&form),
                    Some(form) => {
                        let script = take_scripts(text, &mut end);
                        // Directly after a closed span: extend it instead of
                        // opening a new one, which would read as `$$`.
                        if out.ends_with('$') && !out.ends_with("$$") && !out.ends_with("\\$") {
                            out.pop();
                        } else {
                            out.push('$');
                        }
                        out.push_str(&form);
                        out.push_str(script);
                        out.push('$');
                    }
                    None => out.push_str(&text[i..end]),
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    out
}
