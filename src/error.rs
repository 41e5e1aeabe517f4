//! Error types for spec loading, path finding and message validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ParameterLocation;

/// Errors while loading an OpenAPI document into a [`Spec`](crate::Spec).
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid spec: {message}")]
    InvalidSpec { message: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A request could not be matched to a path, operation or server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path not found for {url}")]
    PathNotFound { url: String },

    #[error("operation {method} not found for {url}")]
    OperationNotFound { url: String, method: String },

    #[error("server not found for {url}")]
    ServerNotFound { url: String },
}

/// A single problem found while validating a request or response.
///
/// `Path` and `InvalidResponse` mean the message could not be matched to a
/// contract at all; every other variant belongs to one stage of the body,
/// parameter or header pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("unknown response status {status}")]
    InvalidResponse { status: String },

    #[error("content type \"{mimetype}\" not declared")]
    InvalidContentType { mimetype: String },

    #[error("missing response content")]
    MissingContent,

    #[error("missing required request body")]
    MissingRequestBody,

    #[error("missing required {location} parameter \"{name}\"")]
    MissingParameter {
        name: String,
        location: ParameterLocation,
    },

    #[error("missing required header \"{name}\"")]
    MissingHeader { name: String },

    #[error("failed to deserialize {mimetype} content: {message}")]
    Deserialize { mimetype: String, message: String },

    #[error("failed to cast {value} to {expected}")]
    Cast { expected: String, value: String },

    #[error("failed to unmarshal value: {message}")]
    Unmarshal { message: String },

    #[error("value does not match schema: {}", join_schema_errors(errors))]
    InvalidSchemaValue { errors: Vec<SchemaError> },
}

impl ValidationError {
    /// True for errors that stop validation before any content is inspected.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ValidationError::Path(_) | ValidationError::InvalidResponse { .. }
        )
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Single schema violation with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn join_schema_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("openapi.yaml"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::InvalidSpec {
            message: "paths must be an object".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn path_error_display() {
        let err = PathError::OperationNotFound {
            url: "http://x.test/a/1".into(),
            method: "put".into(),
        };
        assert_eq!(err.to_string(), "operation put not found for http://x.test/a/1");
    }

    #[test]
    fn precondition_errors() {
        let err = ValidationError::from(PathError::PathNotFound {
            url: "http://x.test/nope".into(),
        });
        assert!(err.is_precondition());
        assert!(ValidationError::InvalidResponse {
            status: "418".into()
        }
        .is_precondition());
        assert!(!ValidationError::MissingContent.is_precondition());
    }

    #[test]
    fn schema_value_error_lists_violations() {
        let err = ValidationError::InvalidSchemaValue {
            errors: vec![
                SchemaError {
                    path: "/id".into(),
                    message: "\"x\" is not of type \"integer\"".into(),
                },
                SchemaError {
                    path: String::new(),
                    message: "\"name\" is a required property".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "value does not match schema: /id: \"x\" is not of type \"integer\"; \"name\" is a required property"
        );
    }
}
