//! Error types for the launcher engine.
//!
//! Two families live here:
//!
//! - [`LauncherError`]: operation failures (`Err`). Parse errors, port
//!   failures and caller contract breaches.
//! - [`FieldError`]: per-field validation findings. These are data attached
//!   to the form tree, never returned as `Err`; they only block the launch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::path::HelmValuesPath;

/// Stable, machine-readable error codes.
///
/// Variant names and their serialized `snake_case` strings are part of the
/// public contract and must never change across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// JSON (de)serialization error.
    JsonParseError,
    /// YAML (de)serialization error.
    YamlParseError,
    /// Values schema is not usable at all (e.g. root is not an object).
    SchemaError,
    /// A path string could not be parsed.
    MalformedPath,
    /// A URL-encoded patch query could not be decoded.
    MalformedPatchQuery,
    /// Raw text did not match the shape declared by the schema.
    ShapeMismatch,
    /// The launch was attempted while errors were outstanding.
    LaunchBlocked,
    /// A backend port call failed.
    PortFailure,
    /// The caller broke an operation precondition.
    InvariantViolation,
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML (de)serialization error: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    #[error("Schema error at {path}: {message}")]
    SchemaError { path: String, message: String },

    #[error("Malformed path '{path}': {message}")]
    MalformedPath { path: String, message: String },

    #[error("Malformed patch query near '{fragment}': {message}")]
    MalformedPatchQuery { fragment: String, message: String },

    #[error("Values do not match the schema ({} error(s))", errors.len())]
    ShapeMismatch { errors: Vec<FieldError> },

    #[error("Launch blocked: {reason}")]
    LaunchBlocked { reason: String },

    #[error("Port failure: {0}")]
    PortFailure(String),

    #[error("Invariant violated at {path}: {message}")]
    InvariantViolation { path: String, message: String },
}

impl LauncherError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            LauncherError::JsonError(_) => ErrorCode::JsonParseError,
            LauncherError::YamlError(_) => ErrorCode::YamlParseError,
            LauncherError::SchemaError { .. } => ErrorCode::SchemaError,
            LauncherError::MalformedPath { .. } => ErrorCode::MalformedPath,
            LauncherError::MalformedPatchQuery { .. } => ErrorCode::MalformedPatchQuery,
            LauncherError::ShapeMismatch { .. } => ErrorCode::ShapeMismatch,
            LauncherError::LaunchBlocked { .. } => ErrorCode::LaunchBlocked,
            LauncherError::PortFailure(_) => ErrorCode::PortFailure,
            LauncherError::InvariantViolation { .. } => ErrorCode::InvariantViolation,
        }
    }

    /// Returns the path context, if available.
    pub fn path(&self) -> Option<&str> {
        match self {
            LauncherError::SchemaError { path, .. } => Some(path),
            LauncherError::MalformedPath { path, .. } => Some(path),
            LauncherError::InvariantViolation { path, .. } => Some(path),
            LauncherError::JsonError(_)
            | LauncherError::YamlError(_)
            | LauncherError::MalformedPatchQuery { .. }
            | LauncherError::ShapeMismatch { .. }
            | LauncherError::LaunchBlocked { .. }
            | LauncherError::PortFailure(_) => None,
        }
    }

    /// Produces a structured JSON error.
    ///
    /// Format: `{"code": "...", "message": "...", "path": "..." | null}`,
    /// plus `"fields": [...]` for shape mismatches.
    pub fn to_json(&self) -> Value {
        let mut json = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "path": self.path(),
        });
        if let LauncherError::ShapeMismatch { errors } = self {
            json["fields"] = serde_json::to_value(errors).unwrap_or(Value::Null);
        }
        json
    }

    pub(crate) fn invariant(path: &HelmValuesPath, message: impl Into<String>) -> Self {
        LauncherError::InvariantViolation {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field errors
// ---------------------------------------------------------------------------

/// A validation finding scoped to one value path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: HelmValuesPath,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(path: HelmValuesPath, kind: FieldErrorKind) -> Self {
        Self { path, kind }
    }
}

/// Classification of field validation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// A required value is missing or empty.
    Required,
    /// Value does not match the declared `pattern`.
    PatternMismatch { pattern: String },
    /// Value is below `minimum` (or the slider lower bound).
    BelowMinimum { minimum: f64 },
    /// Value is above `maximum` (or the slider upper bound).
    AboveMaximum { maximum: f64 },
    /// Value is not an integer.
    NotAnInteger,
    /// Value is not a number.
    NotANumber,
    /// Value is not a boolean.
    NotABoolean,
    /// Value is not a string.
    NotAString,
    /// Value is not one of the enum options.
    NotInOptions,
    /// String is shorter than `minLength`.
    TooShort { min_length: usize },
    /// String is longer than `maxLength`.
    TooLong { max_length: usize },
    /// Array holds fewer than `minItems` elements.
    TooFewItems { min_items: usize },
    /// Array holds more than `maxItems` elements.
    TooManyItems { max_items: usize },
    /// A yaml-block value is not an array.
    NotAnArray,
    /// A yaml-block value is not an object.
    NotAnObject,
    /// The lower end of a range is above the upper end.
    RangeOrder { low: f64, high: f64 },
    /// Raw text put a value of the wrong kind where the schema declares `expected`.
    ShapeMismatch { expected: String, found: String },
    /// Free-form message (e.g. reported by the backend).
    Custom { message: String },
}

impl std::fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldErrorKind::Required => write!(f, "value is required"),
            FieldErrorKind::PatternMismatch { pattern } => {
                write!(f, "value must match pattern {pattern}")
            }
            FieldErrorKind::BelowMinimum { minimum } => write!(f, "value must be >= {minimum}"),
            FieldErrorKind::AboveMaximum { maximum } => write!(f, "value must be <= {maximum}"),
            FieldErrorKind::NotAnInteger => write!(f, "value must be an integer"),
            FieldErrorKind::NotANumber => write!(f, "value must be a number"),
            FieldErrorKind::NotABoolean => write!(f, "value must be a boolean"),
            FieldErrorKind::NotAString => write!(f, "value must be a string"),
            FieldErrorKind::NotInOptions => write!(f, "value must be one of the options"),
            FieldErrorKind::TooShort { min_length } => {
                write!(f, "value must be at least {min_length} characters long")
            }
            FieldErrorKind::TooLong { max_length } => {
                write!(f, "value must be at most {max_length} characters long")
            }
            FieldErrorKind::TooFewItems { min_items } => {
                write!(f, "at least {min_items} item(s) required")
            }
            FieldErrorKind::TooManyItems { max_items } => {
                write!(f, "at most {max_items} item(s) allowed")
            }
            FieldErrorKind::NotAnArray => write!(f, "value must be an array"),
            FieldErrorKind::NotAnObject => write!(f, "value must be an object"),
            FieldErrorKind::RangeOrder { low, high } => {
                write!(f, "lower bound {low} is above upper bound {high}")
            }
            FieldErrorKind::ShapeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            FieldErrorKind::Custom { message } => f.write_str(message),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_value(ErrorCode::MalformedPatchQuery).unwrap();
        assert_eq!(json, json!("malformed_patch_query"));
    }

    #[test]
    fn test_invariant_violation_carries_path() {
        let err = LauncherError::invariant(&crate::path!["env"], "index 4 out of range");
        assert_eq!(err.error_code(), ErrorCode::InvariantViolation);
        assert_eq!(err.path(), Some("env"));
        let json = err.to_json();
        assert_eq!(json["code"], json!("invariant_violation"));
        assert_eq!(json["path"], json!("env"));
    }

    #[test]
    fn test_shape_mismatch_json_lists_fields() {
        let err = LauncherError::ShapeMismatch {
            errors: vec![FieldError::new(
                crate::path!["resources"],
                FieldErrorKind::ShapeMismatch {
                    expected: "object".into(),
                    found: "array".into(),
                },
            )],
        };
        let json = err.to_json();
        assert_eq!(json["code"], json!("shape_mismatch"));
        assert_eq!(json["fields"][0]["path"], json!(["resources"]));
        assert_eq!(json["fields"][0]["kind"]["type"], json!("shape_mismatch"));
    }

    #[test]
    fn test_field_error_kind_display() {
        let kind = FieldErrorKind::RangeOrder {
            low: 4.0,
            high: 2.0,
        };
        assert_eq!(kind.to_string(), "lower bound 4 is above upper bound 2");
    }
}
