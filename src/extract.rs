//! Row extraction
//!
//! Turns one line of text into zero or more tabular rows by applying a compiled
//! regular expression and expanding a row template for every match.
//!
//! Templates use the `regex` expansion syntax: `$1`, `$name`, `${1}`, `${name}`
//! reference capture groups and `$$` is a literal dollar sign. Everything else is
//! copied verbatim, so a template like `$1,$2,$3` produces a comma-delimited row.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fmt;

/// Matches capture group references inside a row template.
///
/// `$$` is listed first so an escaped dollar is consumed before it can be read
/// as the start of a reference.
static TEMPLATE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\$|\{([_0-9A-Za-z]+)\}|([_0-9A-Za-z]+))")
        .expect("template reference pattern is valid")
});

/// Error type for extraction rule compilation
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The template references a capture group the pattern does not define
    #[error(
        "Template references unknown capture group '{0}' \
         (use ${{name}} to separate a group from following text)"
    )]
    UnknownGroup(String),

    /// The template is empty
    #[error("Template must not be empty")]
    EmptyTemplate,
}

/// One output row, already in its delimited form (without a line terminator)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabularRow(Vec<u8>);

impl TabularRow {
    /// Row content as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the row and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the row in bytes, excluding the line terminator
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the row has no content
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TabularRow {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for TabularRow {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for TabularRow {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for TabularRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A compiled pattern plus the template used to build a row from each match.
///
/// Immutable once built; share it between transformers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pattern: Regex,
    template: String,
}

impl ExtractionRule {
    /// Compile a pattern and validate the template against its capture groups.
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self, ExtractError> {
        let pattern = Regex::new(pattern)?;
        let template = template.into();

        if template.is_empty() {
            return Err(ExtractError::EmptyTemplate);
        }

        for caps in TEMPLATE_REF.captures_iter(template.as_bytes()) {
            let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
                continue; // `$$`
            };
            let name = String::from_utf8_lossy(name.as_bytes());
            if !has_group(&pattern, &name) {
                return Err(ExtractError::UnknownGroup(name.into_owned()));
            }
        }

        Ok(Self { pattern, template })
    }

    /// The source text of the pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The row template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Extract rows from a single line.
    ///
    /// Every non-overlapping match, scanned left to right, yields one row with the
    /// template expanded against that match. A line without matches yields no rows.
    pub fn extract(&self, line: &[u8]) -> Vec<TabularRow> {
        self.pattern
            .captures_iter(line)
            .map(|caps| {
                let mut row = Vec::with_capacity(self.template.len());
                caps.expand(self.template.as_bytes(), &mut row);
                TabularRow(row)
            })
            .collect()
    }
}

fn has_group(pattern: &Regex, name: &str) -> bool {
    match name.parse::<usize>() {
        Ok(index) => index < pattern.captures_len(),
        Err(_) => pattern.capture_names().flatten().any(|n| n == name),
    }
}
