//! Path finding - resolves a request to a path, operation and server.
//!
//! Resolution runs three lazy stages, each pulling from the one before:
//!
//! 1. paths: every template that matches the URL, in document order
//! 2. operations: candidates whose path item has the request method
//! 3. servers: candidates whose effective server covers the URL prefix
//!
//! [`PathFinder::find`] returns the first candidate that survives all three.
//! A path or operation whose servers all fail is dropped and the next
//! upstream candidate is pulled, so a later path can still win. An empty
//! first or second stage is reported as its own error.

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::PathError;
use crate::message::Request;
use crate::spec::{Operation, Path, Server, Spec};
use crate::template::{self, Bindings, TemplateResult};

/// A request fully matched to the spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'s> {
    pub path: &'s Path,
    pub operation: &'s Operation,
    pub server: &'s Server,
    /// Path template match and its variable bindings.
    pub path_result: TemplateResult,
    /// Server URL match and its variable bindings.
    pub server_result: TemplateResult,
}

/// Finds the path, operation and server a request targets.
///
/// Holds no per-request state; one finder can serve any number of calls.
#[derive(Debug, Clone)]
pub struct PathFinder<'s> {
    spec: &'s Spec,
    base_url: Option<String>,
}

impl<'s> PathFinder<'s> {
    /// Create a finder over `spec`.
    pub fn new(spec: &'s Spec) -> Self {
        Self {
            spec,
            base_url: None,
        }
    }

    /// Override the base URL used for relative servers.
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        self.base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    /// Resolve a request.
    ///
    /// # Errors
    ///
    /// Returns `PathError::PathNotFound` if no template matches the URL,
    /// `PathError::OperationNotFound` if no matching path has the method,
    /// and `PathError::ServerNotFound` if no candidate's servers match.
    pub fn find(&self, request: &Request) -> Result<Resolved<'s>, PathError> {
        self.find_url(request.method(), &request.full_url_pattern())
    }

    /// Resolve a lowercase method and a URL without query string.
    ///
    /// # Errors
    ///
    /// Same as [`PathFinder::find`].
    pub fn find_url(&self, method: &str, url: &str) -> Result<Resolved<'s>, PathError> {
        let mut paths = self.paths_iter(url).peekable();
        if paths.peek().is_none() {
            return Err(PathError::PathNotFound {
                url: url.to_string(),
            });
        }

        let mut operations = operations_iter(method, paths).peekable();
        if operations.peek().is_none() {
            return Err(PathError::OperationNotFound {
                url: url.to_string(),
                method: method.to_string(),
            });
        }

        let resolved = self
            .servers_iter(url, operations)
            .next()
            .ok_or_else(|| PathError::ServerNotFound {
                url: url.to_string(),
            })?;

        debug!(
            path = %resolved.path.template,
            method,
            server = %resolved.server.url,
            "request resolved"
        );
        Ok(resolved)
    }

    fn paths_iter<'a>(
        &'a self,
        url: &'a str,
    ) -> impl Iterator<Item = (&'s Path, TemplateResult)> + 'a {
        let spec: &'s Spec = self.spec;
        spec.paths.iter().filter_map(move |(pattern, path)| {
            // Literal templates first, then placeholder search
            if template::matches_suffix(pattern, url) {
                return Some((path, TemplateResult::literal(pattern)));
            }
            let found = template::search(pattern, url)?;
            debug!(template = %pattern, "path candidate");
            Some((
                path,
                TemplateResult {
                    template: pattern.clone(),
                    resolved: found.matched,
                    variables: decode_bindings(found.variables),
                },
            ))
        })
    }

    fn servers_iter<'a, I>(
        &'a self,
        url: &'a str,
        operations: I,
    ) -> impl Iterator<Item = Resolved<'s>> + 'a
    where
        I: Iterator<Item = (&'s Path, &'s Operation, TemplateResult)> + 'a,
    {
        let spec: &'s Spec = self.spec;
        operations.flat_map(move |(path, operation, path_result)| {
            let servers = effective_servers(&operation.servers, &path.servers, &spec.servers);
            let server_url_pattern = server_url_pattern(url, &path_result.resolved);
            servers.iter().filter_map(move |server| {
                let server_result = self.match_server(server, server_url_pattern)?;
                Some(Resolved {
                    path,
                    operation,
                    server,
                    path_result: path_result.clone(),
                    server_result,
                })
            })
        })
    }

    fn match_server(&self, server: &Server, server_url_pattern: &str) -> Option<TemplateResult> {
        let absolute = server.absolute_url(self.base_url.as_deref());
        let server_url = absolute.strip_suffix('/').unwrap_or(&absolute);

        // Relative servers without a base URL only constrain the path
        let candidate = if server.is_absolute() || self.base_url.is_some() {
            server_url_pattern
        } else {
            strip_origin(server_url_pattern)
        };

        if !server.has_variables() {
            return candidate
                .starts_with(server_url)
                .then(|| TemplateResult::literal(&server.url));
        }

        let found = template::parse(server_url, candidate)?;
        if !server.accepts(&found.variables) {
            debug!(server = %server.url, "server variables outside declared enum");
            return None;
        }
        Some(TemplateResult {
            template: server.url.clone(),
            resolved: found.matched,
            variables: found.variables,
        })
    }
}

fn operations_iter<'s, 'a, I>(
    method: &'a str,
    paths: I,
) -> impl Iterator<Item = (&'s Path, &'s Operation, TemplateResult)> + 'a
where
    's: 'a,
    I: Iterator<Item = (&'s Path, TemplateResult)> + 'a,
{
    paths.filter_map(move |(path, path_result)| {
        let operation = path.operation(method)?;
        Some((path, operation, path_result))
    })
}

/// The first non-empty server list: operation, then path, then spec.
///
/// Lists are never merged.
pub fn effective_servers<'s>(
    operation: &'s [Server],
    path: &'s [Server],
    spec: &'s [Server],
) -> &'s [Server] {
    [operation, path]
        .into_iter()
        .find(|servers| !servers.is_empty())
        .unwrap_or(spec)
}

/// The part of `url` before the rightmost occurrence of the matched path.
/// Path values are bound against the encoded URL and decoded afterwards, so
/// an escaped `/` stays inside its segment.
fn decode_bindings(variables: Bindings) -> Bindings {
    variables
        .into_iter()
        .map(|(name, value)| {
            let decoded = percent_decode_str(&value).decode_utf8_lossy().into_owned();
            (name, decoded)
        })
        .collect()
}

fn server_url_pattern<'a>(url: &'a str, resolved_path: &str) -> &'a str {
    match url.rfind(resolved_path) {
        Some(index) => &url[..index],
        None => url,
    }
}

/// Drop `scheme://authority` from a URL, keeping the path.
fn strip_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    let authority_start = scheme_end + 3;
    match url[authority_start..].find('/') {
        Some(offset) => &url[authority_start + offset..],
        None => "",
    }
}
