//! Error types for CWL document loading and inspection.
//!
//! Two error kinds cover the whole crate: [`CwlError::Parse`] for anything
//! wrong with the document itself (malformed YAML, missing files, schema
//! violations, unresolved fragments) and [`CwlError::Inspection`] for every
//! failure after a document has loaded (missing paths, type mismatches,
//! expression failures, unsupported features).

use thiserror::Error;

/// Main error type for all CWL inspection errors.
#[derive(Error, Debug)]
pub enum CwlError {
    /// Document structure, schema, or version unrecognized. Fatal to the
    /// operation that raised it.
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        /// File or fragment the error was raised for, when known.
        location: Option<String>,
    },

    /// Post-parse failure: missing path, type mismatch, evaluation failure,
    /// or an unsupported feature.
    #[error("Inspection error: {message}")]
    Inspection { message: String },
}

impl CwlError {
    /// Create a parse error without a location.
    pub fn parse_error(message: impl Into<String>) -> Self {
        CwlError::Parse {
            message: message.into(),
            location: None,
        }
    }

    /// Create a parse error tied to a file or fragment.
    pub fn parse_error_at(location: impl Into<String>, message: impl Into<String>) -> Self {
        CwlError::Parse {
            message: message.into(),
            location: Some(location.into()),
        }
    }

    /// Create an inspection error.
    pub fn inspection_error(message: impl Into<String>) -> Self {
        CwlError::Inspection {
            message: message.into(),
        }
    }

    /// The file or fragment this error was raised for, if known.
    pub fn location(&self) -> Option<&str> {
        match self {
            CwlError::Parse { location, .. } => location.as_deref(),
            CwlError::Inspection { .. } => None,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CwlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = CwlError::parse_error("unexpected mapping");
        assert_eq!(err.to_string(), "Parse error: unexpected mapping");
        assert!(err.location().is_none());
    }

    #[test]
    fn test_parse_error_with_location() {
        let err = CwlError::parse_error_at("echo.cwl", "missing field: class");
        assert_eq!(err.to_string(), "Parse error: missing field: class");
        assert_eq!(err.location(), Some("echo.cwl"));
    }

    #[test]
    fn test_inspection_error_display() {
        let err = CwlError::inspection_error("No such field .inputs.missing");
        assert_eq!(
            err.to_string(),
            "Inspection error: No such field .inputs.missing"
        );
    }
}
