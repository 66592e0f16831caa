//! Invalid escape repair for JSON string literals
//!
//! Models routinely emit typesetting commands such as `\begin` or `\cite`
//! inside JSON strings without doubling the backslash. A standard parser
//! rejects them (or, for `\b`, silently turns them into a backspace). This
//! scan doubles every backslash inside a string literal that does not start
//! an escape we trust.

/// Characters that may follow a backslash unchanged
///
/// `b` is absent on purpose: `\b` in model output is nearly always the start
/// of `\begin`, `\bf` or `\beta`, never a backspace.
const VALID_ESCAPE_LEADS: &[char] = &['"', '\\', '/', 'f', 'n', 'r', 't', 'u'];

/// Double every backslash inside a string literal that does not begin a
/// trusted escape sequence
///
/// Text outside string literals is copied verbatim.
///
/// # Examples
///
/// ```
/// use quill_repair::json::normalize_escapes;
///
/// let fixed = normalize_escapes(r#"{"content": "\begin{itemize}"}"#);
/// assert_eq!(fixed, r#"{"content": "\\begin{itemize}"}"#);
/// ```
#[must_use]
pub fn normalize_escapes(input: &str) -> String {
    normalize_escapes_counted(input).0
}

/// Same as [`normalize_escapes`], also returning how many backslashes were
/// doubled
pub(crate) fn normalize_escapes_counted(input: &str) -> (String, usize) {
    let mut out = String::with_capacity(input.len() + input.len() / 16);
    let mut repaired = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => {
                let lead = chars.peek().copied();
                let trusted = match lead {
                    Some('u') => is_unicode_escape(chars.clone()),
                    Some(next) => VALID_ESCAPE_LEADS.contains(&next),
                    None => false,
                };
                if trusted {
                    out.push('\\');
                    escaped = true;
                } else {
                    out.push_str("\\\\");
                    repaired += 1;
                }
            }
            _ => out.push(c),
        }
    }

    (out, repaired)
}

/// `\u` only counts as an escape when four hex digits follow; otherwise it
/// is a command like `\underline`.
fn is_unicode_escape(mut rest: impl Iterator<Item = char>) -> bool {
    rest.next() == Some('u') && (0..4).all(|_| rest.next().is_some_and(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_string(json: &str) -> String {
        serde_json::from_str::<String>(json).unwrap()
    }

    #[test]
    fn begin_survives_round_trip() {
        let raw = r#""\begin{itemize}""#;
        let fixed = normalize_escapes(raw);
        assert_eq!(parse_string(&fixed), r"\begin{itemize}");
    }

    #[test]
    fn valid_escapes_untouched() {
        let raw = r#"{"a": "line\nnext \"quoted\" \\ \/ \t \u00e9"}"#;
        let (fixed, repaired) = normalize_escapes_counted(raw);
        assert_eq!(fixed, raw);
        assert_eq!(repaired, 0);
    }

    #[test]
    fn counts_repairs() {
        let (fixed, repaired) = normalize_escapes_counted(r#""\cite{a} and \section{b}""#);
        assert_eq!(repaired, 2);
        assert_eq!(parse_string(&fixed), r"\cite{a} and \section{b}");
    }

    #[test]
    fn underline_is_not_unicode_escape() {
        let fixed = normalize_escapes(r#""\underline{x} \u0041""#);
        assert_eq!(parse_string(&fixed), r"\underline{x} A");
    }

    #[test]
    fn backslashes_outside_strings_copied() {
        let raw = r#"\ {"k": 1}"#;
        assert_eq!(normalize_escapes(raw), raw);
    }

    #[test]
    fn trailing_backslash_in_string() {
        let fixed = normalize_escapes("\"abc\\");
        assert_eq!(fixed, "\"abc\\\\");
    }

    #[test]
    fn doubled_backslash_then_letter_copied_literally() {
        // The letter after a repaired backslash must not be read as an escape.
        let fixed = normalize_escapes(r#""\q\"""#);
        assert_eq!(parse_string(&fixed), "\\q\"");
    }
}
