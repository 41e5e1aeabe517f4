//! OpenAPI Conformance
//!
//! Resolve HTTP requests to the operations of an OpenAPI document and
//! validate requests and responses against them.
//!
//! A request is matched in three stages: path template, operation (by
//! method), then server. Validation runs a fixed pipeline over the matched
//! operation: media type lookup, deserialize, cast and schema validation.
//!
//! # Example
//!
//! ```
//! use openapi_conform::{
//!     load_spec_str, PathFinder, Request, Response, ResponseValidator, ValidatorOptions,
//! };
//! use serde_json::json;
//!
//! let spec = load_spec_str(r#"{
//!     "openapi": "3.0.3",
//!     "servers": [{ "url": "http://api.test/v1" }],
//!     "paths": {
//!         "/pets/{id}": {
//!             "get": {
//!                 "responses": {
//!                     "200": {
//!                         "description": "A pet",
//!                         "content": {
//!                             "application/json": {
//!                                 "schema": {
//!                                     "type": "object",
//!                                     "required": ["id"],
//!                                     "properties": { "id": { "type": "integer" } }
//!                                 }
//!                             }
//!                         }
//!                     }
//!                 }
//!             }
//!         }
//!     }
//! }"#).unwrap();
//!
//! let request = Request::from_url("GET", "http://api.test/v1/pets/7").unwrap();
//!
//! let resolved = PathFinder::new(&spec).find(&request).unwrap();
//! assert_eq!(resolved.path.template, "/pets/{id}");
//! assert_eq!(resolved.path_result.variables["id"], "7");
//!
//! let response = Response::new(200).with_body("application/json", r#"{"id": 7}"#);
//! let result = ResponseValidator::new(&spec, ValidatorOptions::new()).validate(&request, &response);
//! assert!(result.is_valid());
//! assert_eq!(result.data, Some(json!({ "id": 7 })));
//! ```
//!
//! # Error Kinds
//!
//! | Stage              | Error                                           |
//! |--------------------|-------------------------------------------------|
//! | path finding       | `PathNotFound`, `OperationNotFound`, `ServerNotFound` |
//! | response lookup    | `InvalidResponse`                               |
//! | media type         | `InvalidContentType`, `MissingContent`          |
//! | deserialize        | `Deserialize`                                   |
//! | cast               | `Cast`                                          |
//! | unmarshal          | `Unmarshal`, `InvalidSchemaValue`               |
//!
//! Path finding and response lookup failures end validation with a single
//! error. Later stages stop the body pipeline at the first failure.

mod casting;
mod error;
mod finder;
mod loader;
mod media_types;
mod message;
mod spec;
mod template;
mod types;
mod unmarshal;
mod validator;

pub use casting::cast;
pub use error::{LoadError, PathError, SchemaError, ValidationError};
pub use finder::{effective_servers, PathFinder, Resolved};
pub use loader::{load_spec, load_spec_auto, load_spec_str, navigate_fragment, resolve_refs};
pub use media_types::{normalize_mimetype, DeserializeFn, MediaTypeDeserializers};
pub use message::{Request, Response};
pub use spec::{
    Content, Header, MediaType, Operation, OperationResponse, Parameter, Path, RequestBody,
    Server, ServerVariable, Spec,
};
pub use template::{Bindings, TemplateResult};
pub use types::{ParameterLocation, UnmarshalContext, ValidatorOptions};
pub use unmarshal::{prepare_schema, SchemaUnmarshaller};
pub use validator::{
    DeclaredHeaders, HeaderOutcome, HeaderStage, Parameters, RequestValidationResult,
    RequestValidator, ResponseValidationResult, ResponseValidator, SkipHeaders,
};

#[cfg(feature = "remote")]
pub use loader::load_spec_url;
