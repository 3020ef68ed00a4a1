//! Error types for weft-core

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for weft-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in weft-core
#[derive(Error, Debug)]
pub enum Error {
    /// The raw schema description is structurally invalid
    #[error("invalid schema at '{path}': {message}")]
    Compile {
        /// Schema path of the offending node
        path: String,
        /// Description of what's invalid
        message: String,
    },

    /// A document violated the schema (first error of `validate`, or a failed transform)
    #[error("{0}")]
    Validation(Box<ValidationError>),

    /// A callback entry point was used outside of a tokio runtime
    #[error("no tokio runtime available to schedule the completion callback")]
    NoRuntime,

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn compile(path: &str, message: impl Into<String>) -> Self {
        Error::Compile {
            path: display_path(path).to_string(),
            message: message.into(),
        }
    }

    /// The validation error carried by this error, if any
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(Box::new(e))
    }
}

/// Kind code of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorKind {
    /// Required value absent
    Missing,
    /// Type mismatch; halts further checks on that node
    Type,
    /// Count, length or numeric bound violated
    Limit,
    /// Pattern, parse or composite violation
    Format,
    /// Custom predicate or post-transform rejection
    Invalid,
    /// Unrecognized key where none is permitted
    Illegal,
    /// Asynchronous predicate reached on a synchronous call
    Sync,
}

impl ErrorKind {
    /// The upper-case code of this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Missing => "MISSING",
            ErrorKind::Type => "TYPE",
            ErrorKind::Limit => "LIMIT",
            ErrorKind::Format => "FORMAT",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Illegal => "ILLEGAL",
            ErrorKind::Sync => "SYNC",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single violation found while reporting or transforming a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Kind code
    pub kind: ErrorKind,
    /// Dotted path into the document (empty for the root)
    pub path: String,
    /// Path of the schema node that raised the error
    pub schema_path: String,
    /// The constraint value that was expected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// The offending value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    /// Human-readable description
    pub message: String,
    /// Message of the error returned by a custom function
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Nested errors explaining a composite failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cause: Vec<ValidationError>,
}

impl ValidationError {
    /// Create an error with no expected/actual values
    pub fn new(
        kind: ErrorKind,
        path: impl Into<String>,
        schema_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            schema_path: schema_path.into(),
            expected: None,
            actual: None,
            message: message.into(),
            reason: None,
            cause: Vec::new(),
        }
    }

    /// Attach the expected constraint value
    pub fn expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Attach the offending value
    pub fn actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    /// Attach the message of a custom function's error
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach nested errors
    pub fn cause(mut self, cause: Vec<ValidationError>) -> Self {
        self.cause = cause;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, display_path(&self.path), self.message)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Render a document path, using `(root)` for the empty path
pub fn display_path(path: &str) -> &str {
    if path.is_empty() { "(root)" } else { path }
}

/// Append a segment to a dotted path
pub(crate) fn join_path(path: &str, segment: impl fmt::Display) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
