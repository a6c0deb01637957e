//! Patch lists as URL query strings, for auto-launch links.
//!
//! Each entry becomes `path=value`, entries are joined with `&`:
//!
//! ```text
//! replicas=3&resources.limits.memory=«2Gi»&env[0].name=«FOO»&nodeSelector=-
//! ```
//!
//! | value                | encoding                                   |
//! |----------------------|--------------------------------------------|
//! | delete (no value)    | `-`                                        |
//! | `null`               | `null`                                     |
//! | booleans, numbers    | bare (`true`, `3`, `0.5`)                  |
//! | strings              | `«percent-encoded»`                        |
//! | objects and arrays   | `json«percent-encoded compact JSON»`       |
//!
//! Paths use the Helm dotted form; `%`, `&`, `=`, `#`, `+`, `?` and spaces
//! in keys are percent-encoded on top of it. Browsers may percent-encode the
//! guillemets themselves, so `%C2%AB`/`%C2%BB` are accepted as delimiters.

use std::borrow::Cow;

use serde_json::{Number, Value};

use crate::error::LauncherError;
use crate::patch::PatchEntry;
use crate::path::HelmValuesPath;

const OPEN: &str = "«";
const CLOSE: &str = "»";
const OPEN_ENCODED: &str = "%C2%AB";
const CLOSE_ENCODED: &str = "%C2%BB";
const JSON_PREFIX: &str = "json";
const DELETE: &str = "-";

/// Encode a patch list as a query string (without the leading `?`).
pub fn encode_patch_query(entries: &[PatchEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}={}",
                encode_key(&entry.path.to_string()),
                encode_value(entry.value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_key(dotted: &str) -> Cow<'_, str> {
    if !dotted.contains(['%', '&', '=', '#', '+', '?', ' ']) {
        return Cow::Borrowed(dotted);
    }
    let mut out = String::with_capacity(dotted.len() + 6);
    for ch in dotted.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            '?' => out.push_str("%3F"),
            ' ' => out.push_str("%20"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn encode_value(value: Option<&Value>) -> String {
    match value {
        None => DELETE.to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => format!("{OPEN}{}{CLOSE}", urlencoding::encode(s)),
        Some(container) => format!(
            "{JSON_PREFIX}{OPEN}{}{CLOSE}",
            urlencoding::encode(&container.to_string())
        ),
    }
}

/// Decode a query string produced by [`encode_patch_query`].
///
/// A leading `?` and empty `&&` segments are tolerated. Any malformed entry
/// fails the whole decode with [`LauncherError::MalformedPatchQuery`].
pub fn decode_patch_query(query: &str) -> Result<Vec<PatchEntry>, LauncherError> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(decode_entry)
        .collect()
}

fn decode_entry(part: &str) -> Result<PatchEntry, LauncherError> {
    let Some((raw_key, raw_value)) = part.split_once('=') else {
        return Err(malformed(part, "expected 'path=value'"));
    };
    let key = urlencoding::decode(raw_key).map_err(|e| malformed(raw_key, &e.to_string()))?;
    let path: HelmValuesPath = key.parse()?;
    let value = decode_value(raw_value)?;
    Ok(PatchEntry { path, value })
}

fn decode_value(raw: &str) -> Result<Option<Value>, LauncherError> {
    match raw {
        DELETE => return Ok(None),
        "null" => return Ok(Some(Value::Null)),
        "true" => return Ok(Some(Value::Bool(true))),
        "false" => return Ok(Some(Value::Bool(false))),
        _ => {}
    }

    if let Some(inner) = raw.strip_prefix(JSON_PREFIX).and_then(unwrap_guillemets) {
        let text = urlencoding::decode(inner).map_err(|e| malformed(raw, &e.to_string()))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| malformed(raw, &e.to_string()))?;
        return Ok(Some(value));
    }

    if let Some(inner) = unwrap_guillemets(raw) {
        let text = urlencoding::decode(inner).map_err(|e| malformed(raw, &e.to_string()))?;
        return Ok(Some(Value::String(text.into_owned())));
    }

    parse_number(raw)
        .map(|n| Some(Value::Number(n)))
        .ok_or_else(|| malformed(raw, "unquoted value is neither a number, a boolean, null nor '-'"))
}

fn unwrap_guillemets(raw: &str) -> Option<&str> {
    if let Some(inner) = raw.strip_prefix(OPEN).and_then(|rest| rest.strip_suffix(CLOSE)) {
        return Some(inner);
    }
    let n = OPEN_ENCODED.len();
    if raw.len() < 2 * n {
        return None;
    }
    let head = raw.get(..n)?;
    let tail = raw.get(raw.len() - n..)?;
    if head.eq_ignore_ascii_case(OPEN_ENCODED) && tail.eq_ignore_ascii_case(CLOSE_ENCODED) {
        raw.get(n..raw.len() - n)
    } else {
        None
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(Number::from(u));
    }
    if !raw.contains(|c: char| c.is_ascii_digit()) {
        return None;
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

fn malformed(fragment: &str, message: &str) -> LauncherError {
    LauncherError::MalformedPatchQuery {
        fragment: fragment.to_string(),
        message: message.to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
