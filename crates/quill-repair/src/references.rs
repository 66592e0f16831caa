//! Verified reference set
//!
//! The closed key → entry map supplied by the research stage. Citation
//! resolution only ever emits keys present here.

use crate::markup::escape_literal;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Any citation-style command: `\cite`, `\citep*[p.~3]`, `\parencite`, ...
static CITE_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\[A-Za-z]*cite[A-Za-z]*\*?(?:\[[^\]\n]*\]){0,2}\{([^{}]*)\}").unwrap()
});

/// One verified bibliographic entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Author list as display text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Journal, conference or publisher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// Publication year
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<String>,
    /// Landing page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReferenceEntry {
    /// With title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With author
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// With year
    #[must_use]
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }
}

/// Years arrive as `2021` as often as `"2021"`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Year>::deserialize(deserializer)?.map(|year| match year {
        Year::Text(text) => text,
        Year::Number(n) => n.to_string(),
    }))
}

/// Wire forms accepted for a reference set
#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceSource {
    Entries(IndexMap<String, ReferenceEntry>),
    Keys(Vec<String>),
}

impl From<ReferenceSource> for ReferenceSet {
    fn from(source: ReferenceSource) -> Self {
        match source {
            ReferenceSource::Entries(entries) => Self { entries },
            ReferenceSource::Keys(keys) => Self::from_keys(keys),
        }
    }
}

impl From<ReferenceSet> for IndexMap<String, ReferenceEntry> {
    fn from(set: ReferenceSet) -> Self {
        set.entries
    }
}

/// Insertion-ordered set of valid reference keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "ReferenceSource",
    into = "IndexMap<String, ReferenceEntry>"
)]
pub struct ReferenceSet {
    entries: IndexMap<String, ReferenceEntry>,
}

impl ReferenceSet {
    /// Create empty set; every marker resolves as unresolved against it
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys with empty entries
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter()
            .map(|key| (key.into(), ReferenceEntry::default()))
            .collect()
    }

    /// Add or replace an entry
    pub fn insert(&mut self, key: impl Into<String>, entry: ReferenceEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Whether `key` is valid
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entry for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ReferenceEntry> {
        self.entries.get(key)
    }

    /// Number of keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is valid
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Valid keys cited anywhere in `document`, first appearance order,
    /// without duplicates
    #[must_use]
    pub fn cited_keys(&self, document: &str) -> Vec<String> {
        let mut cited: Vec<String> = Vec::new();
        for caps in CITE_LIKE.captures_iter(document) {
            for key in caps[1].split(',').map(str::trim) {
                if self.contains(key) && !cited.iter().any(|k| k == key) {
                    cited.push(key.to_string());
                }
            }
        }
        cited
    }

    /// Render `@misc` entries for `keys`; keys outside the set are skipped
    #[must_use]
    pub fn to_bibtex<S: AsRef<str>>(&self, keys: &[S]) -> String {
        let mut out = String::new();
        for key in keys {
            let key = key.as_ref();
            let Some(entry) = self.get(key) else {
                continue;
            };
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("@misc{{{key},\n"));
            let fields = [
                ("author", entry.author.as_deref()),
                ("title", entry.title.as_deref()),
                ("howpublished", entry.venue.as_deref()),
                ("year", entry.year.as_deref()),
            ];
            for (name, value) in fields {
                if let Some(value) = value {
                    out.push_str(&format!("  {name} = {{{}}},\n", escape_literal(value)));
                }
            }
            // URLs go through \url-aware styles; only braces would break the entry.
            if let Some(url) = entry.url.as_deref() {
                out.push_str(&format!("  url = {{{}}},\n", url.replace(['{', '}'], "")));
            }
            out.push_str("}\n");
        }
        out
    }
}

impl<K: Into<String>> FromIterator<(K, ReferenceEntry)> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = (K, ReferenceEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
