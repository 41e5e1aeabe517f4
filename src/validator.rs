//! Request and response validation against a resolved operation.
//!
//! A response goes through:
//!
//! 1. path finding (failure ends validation)
//! 2. response lookup by status code (failure ends validation)
//! 3. the body pipeline: media type, content, deserialize, cast, unmarshal
//! 4. the header stage, independent of the body pipeline
//!
//! Body stages stop at the first failure; header errors are collected one
//! per header. Requests follow the same shape with parameters in place of
//! response lookup and headers.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::casting::{cast, primary_type};
use crate::error::ValidationError;
use crate::finder::{PathFinder, Resolved};
use crate::media_types::MediaTypeDeserializers;
use crate::message::{header_value, Request, Response};
use crate::spec::{Content, Header, MediaType, OperationResponse, Parameter, RequestBody, Spec};
use crate::types::{ParameterLocation, UnmarshalContext, ValidatorOptions};
use crate::unmarshal::SchemaUnmarshaller;

/// Outcome of validating a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseValidationResult {
    pub errors: Vec<ValidationError>,
    /// Validated body, or `None` when no content is declared or the body failed.
    pub data: Option<Value>,
    /// Validated headers by declared name.
    pub headers: IndexMap<String, Value>,
}

impl ResponseValidationResult {
    fn failed(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validated parameter values grouped by location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub path: IndexMap<String, Value>,
    pub query: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
}

impl Parameters {
    fn insert(&mut self, location: ParameterLocation, name: &str, value: Value) {
        let group = match location {
            ParameterLocation::Path => &mut self.path,
            ParameterLocation::Query => &mut self.query,
            ParameterLocation::Header => &mut self.header,
            ParameterLocation::Cookie => &mut self.cookie,
        };
        group.insert(name.to_string(), value);
    }
}

/// Outcome of validating a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestValidationResult {
    /// Parameter errors first, then body errors.
    pub errors: Vec<ValidationError>,
    pub body: Option<Value>,
    pub parameters: Parameters,
}

impl RequestValidationResult {
    fn failed(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Values and errors produced by a header stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderOutcome {
    pub headers: IndexMap<String, Value>,
    pub errors: Vec<ValidationError>,
}

/// Validates response headers against the headers an operation declares.
///
/// Runs after the body pipeline regardless of its outcome. Implementations
/// report one error per failing header and never stop early.
pub trait HeaderStage: fmt::Debug + Send + Sync {
    fn validate(
        &self,
        declared: &IndexMap<String, Header>,
        actual: &IndexMap<String, String>,
        unmarshaller: &SchemaUnmarshaller<'_>,
    ) -> HeaderOutcome;
}

/// Header stage that checks nothing and returns no headers.
///
/// This is the default: declared headers are only validated when
/// `ValidatorOptions::validate_headers` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipHeaders;

impl HeaderStage for SkipHeaders {
    fn validate(
        &self,
        _declared: &IndexMap<String, Header>,
        _actual: &IndexMap<String, String>,
        _unmarshaller: &SchemaUnmarshaller<'_>,
    ) -> HeaderOutcome {
        HeaderOutcome::default()
    }
}

/// Header stage that validates every declared header.
///
/// A missing required header is a `MissingHeader` error. A present header
/// is cast and validated against its schema. `Content-Type` is skipped;
/// the body pipeline owns it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredHeaders;

impl HeaderStage for DeclaredHeaders {
    fn validate(
        &self,
        declared: &IndexMap<String, Header>,
        actual: &IndexMap<String, String>,
        unmarshaller: &SchemaUnmarshaller<'_>,
    ) -> HeaderOutcome {
        let mut outcome = HeaderOutcome::default();

        for (name, header) in declared {
            if name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            let Some(raw) = header_value(actual, name) else {
                if header.required {
                    outcome.errors.push(ValidationError::MissingHeader { name: name.clone() });
                }
                continue;
            };

            let value = match &header.schema {
                Some(schema) => {
                    decode_value(schema, &[raw], ',', false, unmarshaller)
                }
                None => Ok(Value::String(raw.to_string())),
            };
            match value {
                Ok(value) => {
                    outcome.headers.insert(name.clone(), value);
                }
                Err(error) => outcome.errors.push(error),
            }
        }

        outcome
    }
}

fn default_header_stage(options: &ValidatorOptions) -> Box<dyn HeaderStage> {
    if options.validate_headers {
        Box::new(DeclaredHeaders)
    } else {
        Box::new(SkipHeaders)
    }
}

/// Validates responses against a spec.
///
/// Reads the spec only; one validator can be shared across threads.
#[derive(Debug)]
pub struct ResponseValidator<'s> {
    finder: PathFinder<'s>,
    unmarshaller: SchemaUnmarshaller<'s>,
    deserializers: MediaTypeDeserializers,
    header_stage: Box<dyn HeaderStage>,
}

impl<'s> ResponseValidator<'s> {
    pub fn new(spec: &'s Spec, options: ValidatorOptions) -> Self {
        Self {
            finder: PathFinder::new(spec).with_base_url(options.base_url.as_deref()),
            unmarshaller: SchemaUnmarshaller::new(spec.components(), UnmarshalContext::Response)
                .strict(options.strict),
            header_stage: default_header_stage(&options),
            deserializers: MediaTypeDeserializers::new(),
        }
    }

    /// Replace the body deserializers.
    pub fn with_deserializers(mut self, deserializers: MediaTypeDeserializers) -> Self {
        self.deserializers = deserializers;
        self
    }

    /// Replace the header stage.
    pub fn with_header_stage(mut self, stage: impl HeaderStage + 'static) -> Self {
        self.header_stage = Box::new(stage);
        self
    }

    /// Validate `response` as the answer to `request`.
    ///
    /// Never fails outright: every problem is reported in the result's
    /// `errors`. A path or status mismatch is the only error when present.
    pub fn validate(&self, request: &Request, response: &Response) -> ResponseValidationResult {
        let operation_response = match self.find_response(request, response) {
            Ok(found) => found,
            Err(error) => return ResponseValidationResult::failed(error),
        };

        let mut errors = Vec::new();
        let data = self
            .get_data(operation_response, response)
            .unwrap_or_else(|error| {
                errors.push(error);
                None
            });

        let HeaderOutcome {
            headers,
            errors: header_errors,
        } = self
            .header_stage
            .validate(&operation_response.headers, &response.headers, &self.unmarshaller);
        errors.extend(header_errors);

        debug!(
            status = response.status_code,
            errors = errors.len(),
            "response validated"
        );
        ResponseValidationResult {
            errors,
            data,
            headers,
        }
    }

    /// Validate only the response body, skipping the header stage.
    pub fn validate_data(&self, request: &Request, response: &Response) -> ResponseValidationResult {
        let operation_response = match self.find_response(request, response) {
            Ok(found) => found,
            Err(error) => return ResponseValidationResult::failed(error),
        };

        match self.get_data(operation_response, response) {
            Ok(data) => ResponseValidationResult {
                data,
                ..ResponseValidationResult::default()
            },
            Err(error) => ResponseValidationResult::failed(error),
        }
    }

    fn find_response(
        &self,
        request: &Request,
        response: &Response,
    ) -> Result<&'s OperationResponse, ValidationError> {
        let resolved = self.finder.find(request)?;
        let status = response.status_code.to_string();
        resolved
            .operation
            .get_response(&status)
            .ok_or(ValidationError::InvalidResponse { status })
    }

    fn get_data(
        &self,
        operation_response: &OperationResponse,
        response: &Response,
    ) -> Result<Option<Value>, ValidationError> {
        if operation_response.content.is_empty() {
            return Ok(None);
        }
        let mimetype = response.mimetype.as_deref().unwrap_or_default();
        let media_type = find_media_type(&operation_response.content, mimetype)?;

        if response.data.is_empty() {
            return Err(ValidationError::MissingContent);
        }
        decode_body(
            &self.deserializers,
            &self.unmarshaller,
            media_type.schema.as_ref(),
            mimetype,
            &response.data,
        )
        .map(Some)
    }
}

/// Validates requests against a spec.
#[derive(Debug)]
pub struct RequestValidator<'s> {
    finder: PathFinder<'s>,
    unmarshaller: SchemaUnmarshaller<'s>,
    deserializers: MediaTypeDeserializers,
}

impl<'s> RequestValidator<'s> {
    pub fn new(spec: &'s Spec, options: ValidatorOptions) -> Self {
        Self {
            finder: PathFinder::new(spec).with_base_url(options.base_url.as_deref()),
            unmarshaller: SchemaUnmarshaller::new(spec.components(), UnmarshalContext::Request)
                .strict(options.strict),
            deserializers: MediaTypeDeserializers::new(),
        }
    }

    /// Replace the body deserializers.
    pub fn with_deserializers(mut self, deserializers: MediaTypeDeserializers) -> Self {
        self.deserializers = deserializers;
        self
    }

    /// Validate `request` against the operation it targets.
    ///
    /// Parameter errors are collected one per parameter and precede any
    /// body error.
    pub fn validate(&self, request: &Request) -> RequestValidationResult {
        let resolved = match self.finder.find(request) {
            Ok(resolved) => resolved,
            Err(error) => return RequestValidationResult::failed(error.into()),
        };

        let (parameters, mut errors) = self.get_parameters(request, &resolved);

        let body = match &resolved.operation.request_body {
            Some(request_body) => self
                .get_body(request_body, request)
                .unwrap_or_else(|error| {
                    errors.push(error);
                    None
                }),
            None => None,
        };

        debug!(
            method = request.method(),
            path = %resolved.path.template,
            errors = errors.len(),
            "request validated"
        );
        RequestValidationResult {
            errors,
            body,
            parameters,
        }
    }

    fn get_parameters(
        &self,
        request: &Request,
        resolved: &Resolved<'_>,
    ) -> (Parameters, Vec<ValidationError>) {
        let mut parameters = Parameters::default();
        let mut errors = Vec::new();

        for parameter in &resolved.operation.parameters {
            let raw = raw_parameter(parameter, request, resolved);
            if raw.is_empty() {
                if parameter.required {
                    errors.push(ValidationError::MissingParameter {
                        name: parameter.name.clone(),
                        location: parameter.location,
                    });
                } else if let Some(default) =
                    parameter.schema.as_ref().and_then(|s| s.get("default"))
                {
                    parameters.insert(parameter.location, &parameter.name, default.clone());
                }
                continue;
            }

            let value = match &parameter.schema {
                Some(schema) => decode_value(
                    schema,
                    &raw,
                    style_delimiter(parameter.style()),
                    parameter.explode(),
                    &self.unmarshaller,
                ),
                None => Ok(Value::String(raw[0].to_string())),
            };
            match value {
                Ok(value) => parameters.insert(parameter.location, &parameter.name, value),
                Err(error) => errors.push(error),
            }
        }

        (parameters, errors)
    }

    fn get_body(
        &self,
        request_body: &RequestBody,
        request: &Request,
    ) -> Result<Option<Value>, ValidationError> {
        let raw = match request.body.as_deref() {
            Some(raw) if !raw.is_empty() => raw,
            _ if request_body.required => return Err(ValidationError::MissingRequestBody),
            _ => return Ok(None),
        };
        if request_body.content.is_empty() {
            return Ok(None);
        }

        let mimetype = request.mimetype.as_deref().unwrap_or_default();
        let media_type = find_media_type(&request_body.content, mimetype)?;
        decode_body(
            &self.deserializers,
            &self.unmarshaller,
            media_type.schema.as_ref(),
            mimetype,
            raw,
        )
        .map(Some)
    }
}

fn find_media_type<'c>(
    content: &'c Content,
    mimetype: &str,
) -> Result<&'c MediaType, ValidationError> {
    content
        .get(mimetype)
        .ok_or_else(|| ValidationError::InvalidContentType {
            mimetype: mimetype.to_string(),
        })
}

/// Deserialize, cast and unmarshal a body. Stops at the first failing stage.
fn decode_body(
    deserializers: &MediaTypeDeserializers,
    unmarshaller: &SchemaUnmarshaller<'_>,
    schema: Option<&Value>,
    mimetype: &str,
    raw: &[u8],
) -> Result<Value, ValidationError> {
    let deserialized = deserializers.deserialize(mimetype, raw)?;
    let Some(schema) = schema else {
        return Ok(deserialized);
    };
    let casted = cast(schema, deserialized)?;
    unmarshaller.unmarshal(schema, casted)
}

/// Raw values of a parameter in the request. Empty when absent.
fn raw_parameter<'r>(
    parameter: &Parameter,
    request: &'r Request,
    resolved: &'r Resolved<'_>,
) -> Vec<&'r str> {
    let name = parameter.name.as_str();
    match parameter.location {
        ParameterLocation::Path => resolved
            .path_result
            .variables
            .get(name)
            .map(String::as_str)
            .into_iter()
            .collect(),
        ParameterLocation::Query => request.query_values(name),
        ParameterLocation::Header => request.header(name).into_iter().collect(),
        ParameterLocation::Cookie => request
            .cookies
            .get(name)
            .map(String::as_str)
            .into_iter()
            .collect(),
    }
}

fn style_delimiter(style: &str) -> char {
    match style {
        "spaceDelimited" => ' ',
        "pipeDelimited" => '|',
        _ => ',',
    }
}

/// Turn raw string values into a typed value: arrays are split or collected,
/// then cast and unmarshalled.
fn decode_value(
    schema: &Value,
    raw: &[&str],
    delimiter: char,
    explode: bool,
    unmarshaller: &SchemaUnmarshaller<'_>,
) -> Result<Value, ValidationError> {
    let value = if primary_type(schema) == Some("array") {
        let items: Vec<Value> = if explode && raw.len() > 1 {
            raw.iter().map(|v| Value::String(v.to_string())).collect()
        } else {
            raw.iter()
                .flat_map(|v| v.split(delimiter))
                .map(|v| Value::String(v.to_string()))
                .collect()
        };
        Value::Array(items)
    } else {
        Value::String(raw[0].to_string())
    };

    let casted = cast(schema, value)?;
    unmarshaller.unmarshal(schema, casted)
}
