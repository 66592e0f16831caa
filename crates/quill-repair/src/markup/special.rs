//! Context-aware escaping of `&`
//!
//! `&` is a column separator inside tabular and alignment environments and a
//! fatal error anywhere else. Models use it freely in prose ("R&D"), so
//! every `&` in the body is escaped unless some open environment gives it
//! structural meaning. Verbatim arguments, verbatim environments and
//! comments are copied without inspection.

use crate::config::RepairConfig;
use crate::markup::{
    command_name, env_marker, split_document, verbatim_arguments_end, verbatim_environment_end,
    MarkerKind,
};

/// Escaper for the reserved `&` character
#[derive(Debug, Clone)]
pub struct SpecialCharEscaper {
    config: RepairConfig,
}

impl Default for SpecialCharEscaper {
    fn default() -> Self {
        Self::new(RepairConfig::default())
    }
}

impl SpecialCharEscaper {
    /// Create escaper using the environment and command sets in `config`
    #[inline]
    #[must_use]
    pub fn new(config: RepairConfig) -> Self {
        Self { config }
    }

    /// Escape a whole document, leaving everything up to and including the
    /// document marker byte-identical
    #[must_use]
    pub fn escape(&self, document: &str) -> String {
        let (preamble, body) = split_document(document, &self.config.document_marker);
        let mut out = String::with_capacity(document.len() + 16);
        out.push_str(preamble);
        out.push_str(&self.escape_body(body));
        out
    }

    /// Escape a body with no preamble
    #[must_use]
    pub fn escape_body(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len() + 16);
        let mut stack: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < body.len() {
            let rest = &body[i..];
            let Some(c) = rest.chars().next() else { break };

            match c {
                '\\' => {
                    if let Some(marker) = env_marker(body, i) {
                        out.push_str(&body[i..marker.end]);
                        i = marker.end;
                        match marker.kind {
                            MarkerKind::Begin if self.config.is_verbatim_environment(marker.name) => {
                                let end = verbatim_environment_end(body, i, marker.name)
                                    .unwrap_or(body.len());
                                out.push_str(&body[i..end]);
                                i = end;
                            }
                            MarkerKind::Begin => stack.push(marker.name),
                            MarkerKind::End => {
                                if stack
                                    .last()
                                    .is_some_and(|top| self.closes(top, marker.name))
                                {
                                    stack.pop();
                                }
                            }
                        }
                        continue;
                    }

                    let name = command_name(body, i);
                    if !name.is_empty() && self.config.is_verbatim_command(name) {
                        let name_end = i + 1 + name.len();
                        let (end, _) = verbatim_arguments_end(body, name_end, name);
                        out.push_str(&body[i..end]);
                        i = end;
                        continue;
                    }

                    // Backslash plus exactly one character: keeps \& \% \\ intact.
                    let len = 1 + rest[1..].chars().next().map_or(0, char::len_utf8);
                    out.push_str(&rest[..len]);
                    i += len;
                }
                '%' => {
                    let end = rest.find('\n').map_or(body.len(), |j| i + j + 1);
                    out.push_str(&body[i..end]);
                    i = end;
                }
                '&' => {
                    if stack.iter().rev().any(|env| self.config.is_structural(env)) {
                        out.push('&');
                    } else {
                        out.push_str("\\&");
                    }
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += c.len_utf8();
                }
            }
        }

        out
    }

    /// Whether `\end{name}` pops `top`
    fn closes(&self, top: &str, name: &str) -> bool {
        top == name
            || top.trim_end_matches('*') == name.trim_end_matches('*')
            || self.config.is_structural(top)
    }
}
