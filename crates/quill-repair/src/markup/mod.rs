//! Typesetting markup transforms
//!
//! - [`sanitize`]: strips model artifacts from one text field and converts
//!   lightweight emphasis/heading markup into commands
//! - [`special`]: context-aware escaping of `&` in a document body
//! - [`balance`]: global brace/environment repair
//!
//! The scanners in [`special`] and [`balance`] share the marker helpers in
//! this module so both agree on what an environment marker or a verbatim
//! argument looks like.

pub mod balance;
pub mod sanitize;
pub mod special;

pub use balance::BalanceRepairer;
pub use sanitize::{sanitize_markup, MarkupSanitizer};
pub use special::SpecialCharEscaper;

/// Longest environment name accepted inside a marker
const MAX_ENV_NAME: usize = 64;

/// Which side of an environment a marker opens or closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    Begin,
    End,
}

/// A parsed `\begin{name}` or `\end{name}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnvMarker<'a> {
    pub(crate) kind: MarkerKind,
    pub(crate) name: &'a str,
    /// Byte index just past the closing brace
    pub(crate) end: usize,
}

/// Parse an environment marker starting at the backslash at `pos`
pub(crate) fn env_marker(text: &str, pos: usize) -> Option<EnvMarker<'_>> {
    let rest = &text[pos..];
    let (kind, prefix) = if rest.starts_with("\\begin{") {
        (MarkerKind::Begin, "\\begin{".len())
    } else if rest.starts_with("\\end{") {
        (MarkerKind::End, "\\end{".len())
    } else {
        return None;
    };

    let after = &rest[prefix..];
    let close = after.find('}')?;
    let name = &after[..close];
    if name.is_empty()
        || name.len() > MAX_ENV_NAME
        || name.contains(['\\', '{', '%', '\n', '\r'])
    {
        return None;
    }

    Some(EnvMarker {
        kind,
        name,
        end: pos + prefix + close + 1,
    })
}

/// ASCII letters of a command name following the backslash at `pos`
pub(crate) fn command_name(text: &str, pos: usize) -> &str {
    let start = pos + 1;
    let len = text[start..]
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .count();
    &text[start..start + len]
}

/// Skip a delimited group starting at `pos` by raw depth counting
///
/// Returns the index past the group and how many openers were still
/// unmatched when the input ended. If `text[pos..]` does not start with
/// `open`, returns `(pos, 0)`.
pub(crate) fn raw_group_end(text: &str, pos: usize, open: u8, close: u8) -> (usize, usize) {
    let bytes = text.as_bytes();
    if bytes.get(pos) != Some(&open) {
        return (pos, 0);
    }
    let mut depth = 0usize;
    for (offset, &b) in bytes[pos..].iter().enumerate() {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return (pos + offset + 1, 0);
            }
        }
    }
    (text.len(), depth)
}

/// End of the arguments of a verbatim command whose name ends at `pos`
///
/// `\verb` takes a single-character delimiter; everything else takes an
/// optional `[...]` then a mandatory `{...}`. Returns the index past the
/// arguments and the count of braces left open at end of input.
pub(crate) fn verbatim_arguments_end(text: &str, pos: usize, name: &str) -> (usize, usize) {
    if name == "verb" {
        return (verb_end(text, pos), 0);
    }
    let (after_optional, _) = raw_group_end(text, pos, b'[', b']');
    raw_group_end(text, after_optional, b'{', b'}')
}

/// `\verb*|...|` ends at the second delimiter, or at end of line
fn verb_end(text: &str, pos: usize) -> usize {
    let mut i = pos;
    if text[i..].starts_with('*') {
        i += 1;
    }
    let Some(delim) = text[i..].chars().next() else {
        return i;
    };
    if delim.is_alphabetic() || delim.is_whitespace() {
        return i;
    }
    let body = i + delim.len_utf8();
    match text[body..].find([delim, '\n']) {
        Some(j) if text[body + j..].starts_with(delim) => body + j + delim.len_utf8(),
        Some(j) => body + j,
        None => text.len(),
    }
}

/// Index past the `\end{name}` that closes a verbatim environment whose
/// contents start at `from`; `None` if it never closes
pub(crate) fn verbatim_environment_end(text: &str, from: usize, name: &str) -> Option<usize> {
    let close = format!("\\end{{{name}}}");
    text[from..].find(&close).map(|i| from + i + close.len())
}

/// Escape every reserved typesetting character so `text` renders literally
#[must_use]
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Split a document into the untouched preamble (marker included) and the
/// body
///
/// Without a marker the whole document is body.
#[must_use]
pub fn split_document<'a>(document: &'a str, marker: &str) -> (&'a str, &'a str) {
    match document.find(marker) {
        Some(i) => document.split_at(i + marker.len()),
        None => ("", document),
    }
}
