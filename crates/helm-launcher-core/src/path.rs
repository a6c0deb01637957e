//! Helm values paths: the canonical key of every patch entry and form field.
//!
//! A [`HelmValuesPath`] is an ordered sequence of object keys and array
//! indices, compared structurally. Two textual renderings are provided:
//!
//! 1. **Helm dotted form** (`resources.limits.memory`, `env[0].name`), the
//!    syntax understood by `helm --set`. Literal dots, backslashes and opening
//!    brackets inside keys are escaped with a backslash.
//! 2. **JSON Pointer** (RFC 6901), used for `json-patch` export and for
//!    schema-side diagnostics.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LauncherError;

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// One step into a values tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position inside an array.
    Index(usize),
    /// Key inside an object.
    Key(String),
}

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(k) => Some(k),
            PathSegment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Key(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// Canonical path from the values root to a node.
///
/// Ordering is lexicographic over segments, so a path always sorts before
/// every path it is a prefix of, and sibling indices sort numerically.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HelmValuesPath(Vec<PathSegment>);

/// Build a [`HelmValuesPath`] from a list of keys and indices.
///
/// ```
/// use helm_launcher_core::{path, HelmValuesPath};
/// let p: HelmValuesPath = path!["env", 0, "name"];
/// assert_eq!(p.to_string(), "env[0].name");
/// ```
#[macro_export]
macro_rules! path {
    () => { $crate::HelmValuesPath::root() };
    ($($seg:expr),+ $(,)?) => {
        $crate::HelmValuesPath::from_segments(vec![$($crate::PathSegment::from($seg)),+])
    };
}

impl HelmValuesPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn into_segments(self) -> Vec<PathSegment> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Child path one key deeper.
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    /// Child path one index deeper.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    pub fn join(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// This path followed by every segment of `tail`.
    pub fn concat(&self, tail: &[PathSegment]) -> Self {
        let mut segments = self.0.clone();
        segments.extend_from_slice(tail);
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// `true` when `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &HelmValuesPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Segments remaining after `prefix`, if `prefix` is an ancestor (or equal).
    pub fn strip_prefix(&self, prefix: &HelmValuesPath) -> Option<&[PathSegment]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    /// Replace the segment at `position` (used when rebasing array indices).
    pub(crate) fn with_segment(&self, position: usize, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments[position] = segment;
        Self(segments)
    }

    /// Render as an RFC 6901 JSON Pointer (`/env/0/name`).
    pub fn to_pointer(&self) -> String {
        let mut pointer = String::new();
        for segment in &self.0 {
            pointer.push('/');
            match segment {
                PathSegment::Key(k) => pointer.push_str(&escape_pointer_segment(k)),
                PathSegment::Index(i) => pointer.push_str(&i.to_string()),
            }
        }
        pointer
    }

    /// Parse an RFC 6901 JSON Pointer. All-digit segments become indices.
    pub fn from_pointer(pointer: &str) -> Self {
        Self(
            split_pointer(pointer)
                .into_iter()
                .map(|s| match s.parse::<usize>() {
                    Ok(i) if !s.starts_with('+') => PathSegment::Index(i),
                    _ => PathSegment::Key(s),
                })
                .collect(),
        )
    }
}

impl From<Vec<PathSegment>> for HelmValuesPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for HelmValuesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(k) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(&escape_dotted_key(k))?;
                }
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for HelmValuesPath {
    type Err = LauncherError;

    /// Parse the Helm dotted form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dotted(s)
    }
}

// ---------------------------------------------------------------------------
// Helm dotted form
// ---------------------------------------------------------------------------

/// Escape a key for the dotted form: `\` → `\\`, `.` → `\.`, `[` → `\[`,
/// `"` → `\"`. The empty key is written `""`.
///
/// Returns `Cow::Borrowed` when no escaping is needed (the common case).
pub fn escape_dotted_key(key: &str) -> Cow<'_, str> {
    if key.is_empty() {
        return Cow::Borrowed(EMPTY_KEY);
    }
    if !key.contains(['\\', '.', '[', '"']) {
        return Cow::Borrowed(key);
    }
    let mut out = String::with_capacity(key.len() + 2);
    for ch in key.chars() {
        if matches!(ch, '\\' | '.' | '[' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    Cow::Owned(out)
}

const EMPTY_KEY: &str = "\"\"";

/// Close the current key token. An unescaped `""` is the empty key.
fn take_key(key: &mut String, escaped: &mut bool) -> PathSegment {
    let text = std::mem::take(key);
    let literal = std::mem::replace(escaped, false);
    if !literal && text == EMPTY_KEY {
        PathSegment::Key(String::new())
    } else {
        PathSegment::Key(text)
    }
}

fn parse_dotted(input: &str) -> Result<HelmValuesPath, LauncherError> {
    let malformed = |message: &str| LauncherError::MalformedPath {
        path: input.to_string(),
        message: message.to_string(),
    };

    let mut segments = Vec::new();
    if input.is_empty() {
        return Ok(HelmValuesPath(segments));
    }

    let mut chars = input.chars().peekable();
    let mut key = String::new();
    // A key segment has begun (it may legitimately be empty, e.g. after `a.`).
    let mut key_open = false;
    let mut after_index = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let literal = chars.next().ok_or_else(|| malformed("dangling escape"))?;
                key.push(literal);
                key_open = true;
                escaped = true;
            }
            '.' => {
                if key_open || !after_index {
                    segments.push(take_key(&mut key, &mut escaped));
                }
                key_open = true;
                after_index = false;
            }
            '[' => {
                if key_open {
                    segments.push(take_key(&mut key, &mut escaped));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        Some(_) => return Err(malformed("array index must be digits")),
                        None => return Err(malformed("unterminated array index")),
                    }
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| malformed("empty array index"))?;
                segments.push(PathSegment::Index(index));
                key_open = false;
                after_index = true;
                if let Some(next) = chars.peek() {
                    if *next != '.' && *next != '[' {
                        return Err(malformed("expected '.' or '[' after array index"));
                    }
                }
            }
            other => {
                key.push(other);
                key_open = true;
            }
        }
    }

    if key_open {
        segments.push(take_key(&mut key, &mut escaped));
    }

    Ok(HelmValuesPath(segments))
}

// ---------------------------------------------------------------------------
// JSON Pointer escaping (RFC 6901)
// ---------------------------------------------------------------------------

/// Escape a single pointer segment per RFC 6901 (`~` → `~0`, `/` → `~1`).
pub fn escape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains('~') || segment.contains('/') {
        Cow::Owned(segment.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Unescape a single pointer segment per RFC 6901.
///
/// Order matters: unescape `~1` first to avoid double-unescaping.
pub fn unescape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains("~0") || segment.contains("~1") {
        Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Split a JSON Pointer into decoded segments, tolerating a leading `#`.
pub fn split_pointer(pointer: &str) -> Vec<String> {
    let stripped = pointer.strip_prefix('#').unwrap_or(pointer);
    if stripped.is_empty() {
        return Vec::new();
    }

    let mut segments_iter = stripped.split('/');
    // A leading "/" yields an initial empty segment that represents the root.
    if stripped.starts_with('/') {
        segments_iter.next();
    }

    segments_iter
        .map(|s| unescape_pointer_segment(s).into_owned())
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_dotted_form() {
        let p = crate::path!["resources", "limits", "memory"];
        assert_eq!(p.to_string(), "resources.limits.memory");

        let p = crate::path!["env", 0, "name"];
        assert_eq!(p.to_string(), "env[0].name");

        let p = crate::path!["matrix", 1, 2];
        assert_eq!(p.to_string(), "matrix[1][2]");
    }

    #[test]
    fn test_display_escapes_literal_dots() {
        let p = crate::path!["annotations", "example.com/owner"];
        assert_eq!(p.to_string(), r"annotations.example\.com/owner");
    }

    #[test]
    fn test_parse_dotted_round_trip() {
        for text in [
            "replicas",
            "resources.limits.memory",
            "env[0].name",
            "matrix[1][2]",
            r"annotations.example\.com/owner",
            r"weird\[key].x",
            "[3].a",
            r#""""#,
            r#""".a"#,
            r#""""[0]"#,
            r#"a."".b"#,
            r#"quote\"d"#,
            r#"\"\""#,
        ] {
            let parsed: HelmValuesPath = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text, "round trip of {text}");
        }
    }

    #[test]
    fn test_empty_keys_have_a_dotted_form() {
        let p = crate::path![""];
        assert_eq!(p.to_string(), r#""""#);
        assert_eq!(p.to_string().parse::<HelmValuesPath>().unwrap(), p);

        let p = crate::path!["", 0];
        assert_eq!(p.to_string().parse::<HelmValuesPath>().unwrap(), p);

        let p = crate::path![r#""""#];
        assert_eq!(p.to_string(), r#"\"\""#);
        assert_eq!(p.to_string().parse::<HelmValuesPath>().unwrap(), p);
    }

    #[test]
    fn test_parse_dotted_segments() {
        let parsed: HelmValuesPath = "env[10].value".parse().unwrap();
        assert_eq!(
            parsed.segments(),
            &[
                PathSegment::Key("env".into()),
                PathSegment::Index(10),
                PathSegment::Key("value".into()),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_bad_index() {
        assert!("env[x]".parse::<HelmValuesPath>().is_err());
        assert!("env[1".parse::<HelmValuesPath>().is_err());
        assert!("env[1]name".parse::<HelmValuesPath>().is_err());
        assert!(r"trailing\".parse::<HelmValuesPath>().is_err());
    }

    #[test]
    fn test_pointer_round_trip() {
        let p = crate::path!["a/b", 0, "c~d"];
        assert_eq!(p.to_pointer(), "/a~1b/0/c~0d");
        assert_eq!(HelmValuesPath::from_pointer(&p.to_pointer()), p);
        assert_eq!(HelmValuesPath::from_pointer("#"), HelmValuesPath::root());
    }

    #[test]
    fn test_ordering_prefix_first_and_numeric_indices() {
        let mut paths = vec![
            crate::path!["env", 10],
            crate::path!["env", 2, "name"],
            crate::path!["env"],
            crate::path!["env", 2],
        ];
        paths.sort();
        assert_eq!(
            paths,
            vec![
                crate::path!["env"],
                crate::path!["env", 2],
                crate::path!["env", 2, "name"],
                crate::path!["env", 10],
            ]
        );
    }

    #[test]
    fn test_serde_as_mixed_array() {
        let p = crate::path!["env", 0, "name"];
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!(["env", 0, "name"]));
        let back: HelmValuesPath = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_strip_prefix() {
        let p = crate::path!["env", 3, "name"];
        let prefix = crate::path!["env"];
        assert_eq!(
            p.strip_prefix(&prefix),
            Some(&[PathSegment::Index(3), PathSegment::Key("name".into())][..])
        );
        assert!(p.strip_prefix(&crate::path!["other"]).is_none());
    }
}
