//! Spec loading from various sources.
//!
//! Handles loading OpenAPI documents (JSON or YAML) from files, strings,
//! and HTTP URLs, and inlining internal `$ref` pointers.

use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::LoadError;
use crate::spec::Spec;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Document syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Guess the format from a file name or URL.
    fn from_name(name: &str) -> Option<Self> {
        let name = name.split(['?', '#']).next().unwrap_or(name);
        if name.ends_with(".yaml") || name.ends_with(".yml") {
            Some(Format::Yaml)
        } else if name.ends_with(".json") {
            Some(Format::Json)
        } else {
            None
        }
    }

    /// Guess the format from content: JSON documents start with `{`.
    fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

/// Load a spec from a file path.
///
/// `.yaml` and `.yml` files are parsed as YAML, `.json` as JSON; any other
/// extension is detected from the content.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist, a parse
/// error if the content is malformed, or `LoadError::InvalidSpec` if the
/// document doesn't describe a usable spec.
pub fn load_spec(path: &Path) -> Result<Spec, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let format = path
        .to_str()
        .and_then(Format::from_name)
        .unwrap_or_else(|| Format::sniff(&content));
    debug!(path = %path.display(), ?format, "loading spec");

    let document = parse_document(&content, format)?;
    Spec::from_document(&document)
}

/// Load a spec from a JSON or YAML string.
///
/// # Errors
///
/// Returns a parse error if the string is malformed, or
/// `LoadError::InvalidSpec` if the document doesn't describe a usable spec.
pub fn load_spec_str(content: &str) -> Result<Spec, LoadError> {
    let document = parse_document(content, Format::sniff(content))?;
    Spec::from_document(&document)
}

/// Load a spec from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails, or a parse
/// error if the response isn't a valid document.
#[cfg(feature = "remote")]
pub fn load_spec_url(url: &str) -> Result<Spec, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before parsing
    let response = response
        .error_for_status()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let content = response.text().map_err(|source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    })?;

    let format = Format::from_name(url).unwrap_or_else(|| Format::sniff(&content));
    debug!(url, ?format, "loaded remote spec");

    let document = parse_document(&content, format)?;
    Spec::from_document(&document)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a spec from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_spec_auto(source: &str) -> Result<Spec, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_spec_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_spec(Path::new(source))
    }
}

fn parse_document(content: &str, format: Format) -> Result<Value, LoadError> {
    match format {
        Format::Json => {
            serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
        }
        Format::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(content)
                .map_err(|source| LoadError::InvalidYaml { source })?;
            yaml_to_json(yaml)
        }
    }
}

/// Convert a YAML tree to JSON.
///
/// YAML allows non-string mapping keys (`200:` is an integer); they are
/// stringified so response codes keep working.
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, LoadError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| LoadError::InvalidSpec {
                        message: format!("unsupported number: {}", n),
                    })?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(LoadError::InvalidSpec {
                            message: format!("unsupported mapping key: {:?}", other),
                        })
                    }
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Navigate a JSON Pointer fragment (e.g., "#/components/schemas/Pet").
///
/// Returns the value at the given JSON Pointer path within the document.
/// The fragment should start with '#'.
pub fn navigate_fragment(document: &Value, fragment: &str) -> Result<Value, LoadError> {
    // Remove leading # and split by /
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(document.clone());
    }

    let mut current = document;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(&key),
        };
        current = next.ok_or_else(|| LoadError::InvalidSpec {
            message: format!("reference not found: {}", fragment),
        })?;
    }
    Ok(current.clone())
}

/// Return a copy of `value` with internal `$ref` pointers inlined.
///
/// Refs are resolved against `document`. A ref that points back into its
/// own expansion (a recursive schema) is left as-is; the validator resolves
/// it against `components`. External refs are left untouched.
pub fn resolve_refs(value: &Value, document: &Value) -> Result<Value, LoadError> {
    let mut resolved = value.clone();
    resolve_refs_inner(&mut resolved, document, &mut Vec::new())?;
    Ok(resolved)
}

fn resolve_refs_inner(
    value: &mut Value,
    document: &Value,
    stack: &mut Vec<String>,
) -> Result<(), LoadError> {
    match value {
        Value::Object(obj) => {
            if let Some(ref_val) = obj.get("$ref").and_then(|v| v.as_str()).map(String::from) {
                if !ref_val.starts_with('#') {
                    debug!(reference = %ref_val, "leaving external reference unresolved");
                    return Ok(());
                }
                if stack.contains(&ref_val) {
                    // Recursive definition - can't inline
                    return Ok(());
                }

                let mut target = navigate_fragment(document, &ref_val)?;
                stack.push(ref_val);
                resolve_refs_inner(&mut target, document, stack)?;
                stack.pop();

                // Inline the resolved definition; sibling keys win
                obj.remove("$ref");
                if let Value::Object(ref_obj) = target {
                    for (k, v) in ref_obj {
                        obj.entry(k).or_insert(v);
                    }
                }
                return Ok(());
            }

            for child in obj.values_mut() {
                resolve_refs_inner(child, document, stack)?;
            }
        }
        Value::Array(arr) => {
            for item in arr {
                resolve_refs_inner(item, document, stack)?;
            }
        }
        _ => {}
    }
    Ok(())
}
