//! Dot-notation field paths.
//!
//! Two entry points with different strictness:
//!
//! - [`FieldPath::parse`] is used by the engine and the accessors. Any
//!   malformed input is a [`FormError::InvalidPath`].
//! - [`normalize`] is used for identifiers coming from UI bindings. It cleans
//!   up bracket indices and stray separators and returns `None` when nothing
//!   usable is left.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FormError, Result};

/// Maximum number of path segments allowed
const MAX_PATH_SEGMENTS: usize = 100;

/// Largest array index a write may address. Writes pad arrays with `Null`
/// up to the index.
pub const MAX_ARRAY_INDEX: usize = 10_000;

/// A validated, non-empty field path such as `profile.addresses.0.city`.
///
/// Segments are kept as strings: whether `3` is an array index or an object
/// key depends on the container it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a path string.
    ///
    /// Accepts bracket indices (`items[0].name`) and rewrites them to dot
    /// segments. Rejects empty input, leading/trailing separators, empty
    /// segments, malformed brackets and paths over 100 segments.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(FormError::invalid_path(path, "path is empty"));
        }
        if path.starts_with('.') || path.ends_with('.') {
            return Err(FormError::invalid_path(
                path,
                "path must not start or end with `.`",
            ));
        }
        if path.contains("..") {
            return Err(FormError::invalid_path(path, "path contains an empty segment"));
        }

        let segments = split_segments(path).map_err(|reason| FormError::invalid_path(path, reason))?;
        if segments.iter().any(String::is_empty) {
            return Err(FormError::invalid_path(path, "path contains an empty segment"));
        }
        if segments.len() > MAX_PATH_SEGMENTS {
            return Err(FormError::invalid_path(
                path,
                format!("more than {MAX_PATH_SEGMENTS} segments"),
            ));
        }

        Ok(Self {
            raw: segments.join("."),
            segments,
        })
    }

    /// The canonical dot-separated form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`: a parsed path has at least one segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// The enclosing path, `None` for a single-segment path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        Some(Self {
            raw: segments.join("."),
            segments,
        })
    }

    /// Append one segment. The segment must not contain separators.
    pub fn child(&self, segment: &str) -> Result<Self> {
        Self::parse(&format!("{}.{segment}", self.raw))
    }

    /// `true` when `self` equals `other` or lies underneath it.
    #[must_use]
    pub fn is_within(&self, other: &Self) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self {
            raw: segments.join("."),
            segments,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = FormError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FormError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Interpret a segment as an array index.
#[must_use]
pub fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Whether `path` equals `prefix` or is nested under it, on segment
/// boundaries (`a.b` is under `a`, `ab` is not).
#[must_use]
pub fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Soft normalisation for UI-supplied identifiers.
///
/// Trims whitespace, rewrites `a[0]` to `a.0`, collapses repeated separators
/// and strips leading and trailing ones. Returns `None` when the input is
/// empty after cleanup or contains a malformed bracket index.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let segments = split_segments(raw.trim()).ok()?;
    let cleaned: Vec<String> = segments
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.join("."))
}

/// Split on `.` and `[n]`, keeping empty segments so callers decide whether
/// they are an error.
fn split_segments(path: &str) -> std::result::Result<Vec<String>, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    let mut previous = None;

    while let Some(ch) = chars.next() {
        match ch {
            '.' => segments.push(std::mem::take(&mut current)),
            '[' => {
                if previous == Some('.') {
                    return Err("`[` must follow a segment, not `.`".to_owned());
                }
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut index = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    index.push(inner);
                }
                if !closed {
                    return Err("unclosed `[`".to_owned());
                }
                let index = index.trim();
                if as_index(index).is_none() {
                    return Err(format!("`[{index}]` is not an array index"));
                }
                segments.push(index.to_owned());
                // `a[0].b` and `a[0][1]` continue without an empty segment.
                match chars.peek() {
                    None | Some('[') => previous = Some(']'),
                    Some('.') => {
                        chars.next();
                        previous = Some('.');
                        if chars.peek().is_none() {
                            segments.push(String::new());
                        }
                    }
                    Some(_) => return Err(format!("`[{index}]` must be followed by `.` or `[`")),
                }
                continue;
            }
            ']' => return Err("unexpected `]`".to_owned()),
            _ => current.push(ch),
        }
        previous = Some(ch);
    }

    if !current.is_empty() || segments.is_empty() || path.ends_with('.') {
        segments.push(current);
    }
    Ok(segments)
}
