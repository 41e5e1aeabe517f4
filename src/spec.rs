//! Read-only OpenAPI object model.
//!
//! A [`Spec`] is built once from a parsed document (see
//! [`Spec::from_document`]) and never mutated afterwards, so it can be
//! shared across threads and reused for any number of requests.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::LoadError;
use crate::loader::resolve_refs;
use crate::media_types::{mimetype_matches, normalize_mimetype};
use crate::template::{self, Bindings};
use crate::types::{ParameterLocation, HTTP_METHODS};

/// Root of an OpenAPI document.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    /// Path template to path item, in document order.
    pub paths: IndexMap<String, Path>,
    /// Default servers. Never empty: a document without servers gets `/`.
    pub servers: Vec<Server>,
    components: Value,
}

/// Operations reachable under one path template.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub template: String,
    /// Lowercase HTTP method to operation.
    pub operations: IndexMap<String, Operation>,
    /// Server override; empty means inherit from the spec.
    pub servers: Vec<Server>,
    pub parameters: Vec<Parameter>,
}

/// Behavior bound to one (path template, method) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: String,
    pub operation_id: Option<String>,
    /// Server override; empty means inherit from the path, then the spec.
    pub servers: Vec<Server>,
    /// Path-level parameters merged with operation-level ones. An operation
    /// parameter replaces a path parameter with the same name and location.
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// Status code (`"200"`, `"2XX"`, `"default"`) to response.
    pub responses: IndexMap<String, OperationResponse>,
}

/// A base URL, possibly templated (`https://{region}.example.com`).
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub url: String,
    pub variables: IndexMap<String, ServerVariable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerVariable {
    pub default: String,
    /// Allowed values; empty means any value.
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Option<Value>,
    pub style: Option<String>,
    pub explode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub required: bool,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub description: Option<String>,
    pub content: Content,
    pub headers: IndexMap<String, Header>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub required: bool,
    pub schema: Option<Value>,
}

/// Media type keys to schema descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content(IndexMap<String, MediaType>);

#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub mimetype: String,
    pub schema: Option<Value>,
}

impl Spec {
    /// Build the object model from a parsed OpenAPI document.
    ///
    /// Internal `$ref`s are inlined. Self-referencing schemas keep their
    /// `$ref` and are resolved against `components` at validation time.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::InvalidSpec` if the document isn't an object,
    /// a `$ref` target is missing, or a path item is malformed.
    pub fn from_document(document: &Value) -> Result<Self, LoadError> {
        if !document.is_object() {
            return Err(invalid("document must be an object"));
        }

        let servers = match document.get("servers") {
            Some(value) => parse_servers(value, "/servers")?,
            None => Vec::new(),
        };
        let servers = if servers.is_empty() {
            vec![Server::new("/")]
        } else {
            servers
        };

        let mut paths = IndexMap::new();
        if let Some(raw_paths) = document.get("paths") {
            let raw_paths = raw_paths
                .as_object()
                .ok_or_else(|| invalid("paths must be an object"))?;
            for (template, item) in raw_paths {
                let item = resolve_refs(item, document)?;
                paths.insert(template.clone(), Path::parse(template, &item)?);
            }
        }

        Ok(Self {
            paths,
            servers,
            components: document.get("components").cloned().unwrap_or(Value::Null),
        })
    }

    /// The raw `components` object, or `null` when the document has none.
    pub fn components(&self) -> &Value {
        &self.components
    }

    /// Look up a path item by its exact template.
    pub fn path(&self, template: &str) -> Option<&Path> {
        self.paths.get(template)
    }
}

impl Path {
    fn parse(template: &str, item: &Value) -> Result<Self, LoadError> {
        let item_path = format!("/paths/{}", escape_pointer(template));
        let item = item
            .as_object()
            .ok_or_else(|| invalid(format!("{} must be an object", item_path)))?;

        let servers = match item.get("servers") {
            Some(value) => parse_servers(value, &format!("{}/servers", item_path))?,
            None => Vec::new(),
        };
        let parameters = match item.get("parameters") {
            Some(value) => parse_parameters(value, &format!("{}/parameters", item_path))?,
            None => Vec::new(),
        };

        let mut operations = IndexMap::new();
        for method in HTTP_METHODS {
            if let Some(raw) = item.get(*method) {
                let op_path = format!("{}/{}", item_path, method);
                let operation = Operation::parse(method, raw, &parameters, &op_path)?;
                operations.insert(method.to_string(), operation);
            }
        }

        Ok(Self {
            template: template.to_string(),
            operations,
            servers,
            parameters,
        })
    }

    /// The operation for a lowercase method name.
    pub fn operation(&self, method: &str) -> Option<&Operation> {
        self.operations.get(method)
    }
}

impl Operation {
    fn parse(
        method: &str,
        raw: &Value,
        path_parameters: &[Parameter],
        op_path: &str,
    ) -> Result<Self, LoadError> {
        let raw = raw
            .as_object()
            .ok_or_else(|| invalid(format!("{} must be an object", op_path)))?;

        let servers = match raw.get("servers") {
            Some(value) => parse_servers(value, &format!("{}/servers", op_path))?,
            None => Vec::new(),
        };

        let own_parameters = match raw.get("parameters") {
            Some(value) => parse_parameters(value, &format!("{}/parameters", op_path))?,
            None => Vec::new(),
        };
        let mut parameters: Vec<Parameter> = path_parameters
            .iter()
            .filter(|p| {
                !own_parameters
                    .iter()
                    .any(|own| own.name == p.name && own.location == p.location)
            })
            .cloned()
            .collect();
        parameters.extend(own_parameters);

        let request_body = raw
            .get("requestBody")
            .map(|body| RequestBody {
                required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
                content: Content::parse(body.get("content")),
            });

        let mut responses = IndexMap::new();
        if let Some(raw_responses) = raw.get("responses").and_then(Value::as_object) {
            for (status, response) in raw_responses {
                responses.insert(status.clone(), OperationResponse::parse(response));
            }
        }

        Ok(Self {
            method: method.to_string(),
            operation_id: raw
                .get("operationId")
                .and_then(Value::as_str)
                .map(String::from),
            servers,
            parameters,
            request_body,
            responses,
        })
    }

    /// The response declared for a status code.
    ///
    /// Tries the exact code, then its range (`"2XX"`), then `"default"`.
    pub fn get_response(&self, status: &str) -> Option<&OperationResponse> {
        if let Some(response) = self.responses.get(status) {
            return Some(response);
        }
        if let Some(first) = status.chars().next() {
            let range = format!("{}XX", first);
            let found = self
                .responses
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&range));
            if let Some((_, response)) = found {
                return Some(response);
            }
        }
        self.responses.get("default")
    }
}

impl Server {
    /// Server without variables.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            variables: IndexMap::new(),
        }
    }

    /// True if the URL carries a scheme or is protocol-relative.
    pub fn is_absolute(&self) -> bool {
        self.url.starts_with("//") || self.url.contains("://")
    }

    /// True if the URL contains `{name}` placeholders.
    pub fn has_variables(&self) -> bool {
        template::has_variables(&self.url)
    }

    /// The URL to match requests against.
    ///
    /// Absolute URLs are returned as declared; relative ones are joined to
    /// `base_url` when one is given.
    pub fn absolute_url(&self, base_url: Option<&str>) -> String {
        match base_url {
            Some(base) if !self.is_absolute() => {
                format!("{}{}", base.trim_end_matches('/'), self.url)
            }
            _ => self.url.clone(),
        }
    }

    /// True if every bound value satisfies its variable's `enum`.
    pub fn accepts(&self, bindings: &Bindings) -> bool {
        bindings.iter().all(|(name, value)| {
            self.variables
                .get(name)
                .map(|variable| variable.allowed.is_empty() || variable.allowed.contains(value))
                .unwrap_or(true)
        })
    }
}

impl Parameter {
    /// Serialization style, defaulted by location.
    pub fn style(&self) -> &str {
        self.style
            .as_deref()
            .unwrap_or_else(|| self.location.default_style())
    }

    /// Whether array values are exploded. Defaults to true for `form` style.
    pub fn explode(&self) -> bool {
        self.explode.unwrap_or(self.style() == "form")
    }
}

impl OperationResponse {
    fn parse(raw: &Value) -> Self {
        let mut headers = IndexMap::new();
        if let Some(raw_headers) = raw.get("headers").and_then(Value::as_object) {
            for (name, header) in raw_headers {
                headers.insert(
                    name.clone(),
                    Header {
                        name: name.clone(),
                        required: header
                            .get("required")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        schema: header.get("schema").cloned(),
                    },
                );
            }
        }

        Self {
            description: raw
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            content: Content::parse(raw.get("content")),
            headers,
        }
    }
}

impl Content {
    fn parse(raw: Option<&Value>) -> Self {
        let mut media_types = IndexMap::new();
        if let Some(raw) = raw.and_then(Value::as_object) {
            for (key, media_type) in raw {
                let mimetype = normalize_mimetype(key);
                media_types.insert(
                    mimetype.clone(),
                    MediaType {
                        mimetype,
                        schema: media_type.get("schema").cloned(),
                    },
                );
            }
        }
        Self(media_types)
    }

    /// True if no media type is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Find the media type for a normalized content type.
    ///
    /// Exact keys win over wildcard keys (`image/*`, `*/*`).
    pub fn get(&self, mimetype: &str) -> Option<&MediaType> {
        self.0.get(mimetype).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| mimetype_matches(key, mimetype))
                .map(|(_, media_type)| media_type)
        })
    }

    /// Declared media type keys in document order.
    pub fn mimetypes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn parse_servers(value: &Value, path: &str) -> Result<Vec<Server>, LoadError> {
    let raw_servers = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} must be an array", path)))?;

    let mut servers = Vec::new();
    for (i, raw) in raw_servers.iter().enumerate() {
        let url = raw
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("{}/{}/url must be a string", path, i)))?;

        let mut variables = IndexMap::new();
        if let Some(raw_variables) = raw.get("variables").and_then(Value::as_object) {
            for (name, variable) in raw_variables {
                let default = match variable.get("default") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let allowed = variable
                    .get("enum")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                variables.insert(name.clone(), ServerVariable { default, allowed });
            }
        }

        servers.push(Server {
            url: url.to_string(),
            variables,
        });
    }
    Ok(servers)
}

fn parse_parameters(value: &Value, path: &str) -> Result<Vec<Parameter>, LoadError> {
    let raw_parameters = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} must be an array", path)))?;

    let mut parameters = Vec::new();
    for (i, raw) in raw_parameters.iter().enumerate() {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("{}/{}/name must be a string", path, i)))?;
        let location_name = raw.get("in").and_then(Value::as_str).unwrap_or_default();
        let Some(location) = ParameterLocation::parse(location_name) else {
            warn!(parameter = name, location = location_name, "skipping parameter with unknown location");
            continue;
        };

        parameters.push(Parameter {
            name: name.to_string(),
            location,
            // Path parameters are always required
            required: location == ParameterLocation::Path
                || raw.get("required").and_then(Value::as_bool).unwrap_or(false),
            schema: raw.get("schema").cloned(),
            style: raw.get("style").and_then(Value::as_str).map(String::from),
            explode: raw.get("explode").and_then(Value::as_bool),
        });
    }
    Ok(parameters)
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn invalid(message: impl Into<String>) -> LoadError {
    LoadError::InvalidSpec {
        message: message.into(),
    }
}
