//! Shared enums and options.

use serde::{Deserialize, Serialize};

/// Path item keys that name operations, in OpenAPI order.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Which side of the exchange a value is unmarshalled for.
///
/// Controls which access keyword hides a property: `readOnly` properties
/// may not be sent in requests, `writeOnly` properties may not appear in
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmarshalContext {
    Request,
    Response,
}

impl UnmarshalContext {
    /// Returns the schema keyword that forbids a property in this context.
    pub fn forbidden_keyword(&self) -> &'static str {
        match self {
            UnmarshalContext::Request => "readOnly",
            UnmarshalContext::Response => "writeOnly",
        }
    }
}

/// Where a parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    /// Parse the value of a parameter's `in` field.
    ///
    /// Returns `None` for unknown locations.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }

    /// Serialization style used when the parameter doesn't declare one.
    pub fn default_style(&self) -> &'static str {
        match self {
            ParameterLocation::Query | ParameterLocation::Cookie => "form",
            ParameterLocation::Path | ParameterLocation::Header => "simple",
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        };
        write!(f, "{}", s)
    }
}

/// Options for request and response validation.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    /// Base URL used instead of the one the spec declares for relative servers.
    /// Trailing slashes are dropped.
    pub base_url: Option<String>,
    /// When true, headers declared on responses are validated. Off by default:
    /// the header stage is a no-op unless enabled.
    pub validate_headers: bool,
    /// When true, sets `additionalProperties: false` on all object schemas
    /// so undeclared properties are rejected.
    pub strict: bool,
}

impl ValidatorOptions {
    /// Create options with every switch off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the base URL of relative servers.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    /// Enable or disable declared-header validation.
    pub fn validate_headers(mut self, validate_headers: bool) -> Self {
        self.validate_headers = validate_headers;
        self
    }

    /// Set strict mode (additionalProperties: false on all objects).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
