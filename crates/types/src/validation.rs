//! Validation results addressed by field path.
//!
//! Paths are dotted with numeric indices (`series.0.dataColumn`) and use the
//! camelCase names the configs serialize with, so an editor can attach each
//! error to the control that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes produced by the validator
pub mod codes {
    pub const REQUIRED: &str = "required";
    pub const UNKNOWN_CARD_TYPE: &str = "unknown_card_type";
    pub const TYPE_MISMATCH: &str = "type_mismatch";
    pub const MALFORMED: &str = "malformed";
    pub const OUT_OF_RANGE: &str = "out_of_range";
    pub const INVALID_COLOR: &str = "invalid_color";
    pub const UNKNOWN_COLUMN: &str = "unknown_column";
    pub const NOT_NUMERIC: &str = "not_numeric";
    pub const TOO_MANY: &str = "too_many";
}

/// A path into a configuration object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(field: &str) -> Self {
        Self(vec![field.to_string()])
    }

    /// Append a named field
    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Append an array index
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index.to_string());
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    pub field_path: String,
}

impl ValidationError {
    pub fn new(code: &str, message: impl Into<String>, path: &FieldPath) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field_path: path.to_string(),
        }
    }

    pub fn required(path: &FieldPath) -> Self {
        Self::new(codes::REQUIRED, format!("{} is required", path), path)
    }
}

/// Outcome of validating one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn valid() -> Self {
        Self::from_errors(Vec::new())
    }

    /// First error reported at `path`
    pub fn error_at(&self, path: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.field_path == path)
    }
}
