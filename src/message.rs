//! HTTP messages as seen by the finder and validators.
//!
//! These are plain data holders; adapters from a concrete HTTP stack only
//! need to fill them in.

use indexmap::IndexMap;

use crate::media_types::normalize_mimetype;

/// An incoming request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Scheme and authority, e.g. `https://api.example.com`.
    pub host_url: String,
    /// URL path, e.g. `/v1/pets/42`.
    pub path: String,
    method: String,
    /// Query pairs in URL order; names may repeat.
    pub query: Vec<(String, String)>,
    /// Header names are stored lowercase.
    pub headers: IndexMap<String, String>,
    pub cookies: IndexMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Normalized content type of `body`.
    pub mimetype: Option<String>,
}

impl Request {
    /// Create a request. The method is normalized to lowercase.
    pub fn new(method: &str, host_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host_url: host_url.into(),
            path: path.into(),
            method: method.to_lowercase(),
            ..Self::default()
        }
    }

    /// Create a request from an absolute URL, splitting off the query string.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `url` isn't an absolute URL.
    pub fn from_url(method: &str, url: &str) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(url)?;
        let mut request = Self::new(method, parsed.origin().ascii_serialization(), parsed.path());
        request.query = parsed.query_pairs().into_owned().collect();
        Ok(request)
    }

    /// The lowercase HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The URL matched against path and server templates: host plus path,
    /// without query string.
    pub fn full_url_pattern(&self) -> String {
        format!("{}{}", self.host_url, self.path)
    }

    /// Append a query pair.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set a header. A `Cookie` header is also split into cookies.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "cookie" {
            for pair in value.split(';') {
                if let Some((key, val)) = pair.split_once('=') {
                    self.cookies
                        .insert(key.trim().to_string(), val.trim().to_string());
                }
            }
        }
        self.headers.insert(name, value);
        self
    }

    /// Set a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Set the body and its content type.
    pub fn with_body(mut self, mimetype: &str, body: impl Into<Vec<u8>>) -> Self {
        self.mimetype = Some(normalize_mimetype(mimetype));
        self.body = Some(body.into());
        self
    }

    /// Every value of a query parameter, in URL order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// A header value, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Look up `name` in `headers` ignoring ASCII case.
///
/// The builders store names lowercase, but the maps are public and may
/// hold any spelling.
pub(crate) fn header_value<'h>(headers: &'h IndexMap<String, String>, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

/// An outgoing response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status_code: u16,
    /// Normalized content type of `data`.
    pub mimetype: Option<String>,
    /// Header names are stored lowercase.
    pub headers: IndexMap<String, String>,
    pub data: Vec<u8>,
}

impl Response {
    /// Create an empty response with a status code.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    /// Set the body and its content type.
    pub fn with_body(mut self, mimetype: &str, data: impl Into<Vec<u8>>) -> Self {
        self.mimetype = Some(normalize_mimetype(mimetype));
        self.data = data.into();
        self
    }

    /// Set a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// A header value, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_splits_query() {
        let request = Request::from_url("GET", "http://x.test:8080/a/1?tag=x&tag=y").unwrap();
        assert_eq!(request.method(), "get");
        assert_eq!(request.host_url, "http://x.test:8080");
        assert_eq!(request.path, "/a/1");
        assert_eq!(request.full_url_pattern(), "http://x.test:8080/a/1");
        assert_eq!(request.query_values("tag"), vec!["x", "y"]);
    }

    #[test]
    fn from_url_rejects_relative() {
        assert!(Request::from_url("GET", "/a/1").is_err());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let request = Request::new("get", "http://x.test", "/").with_header("X-Trace", "abc");
        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(request.header("X-TRACE"), Some("abc"));
    }

    #[test]
    fn header_lookup_ignores_stored_case() {
        let mut response = Response::new(200);
        response
            .headers
            .insert("X-Rate-Limit".to_string(), "10".to_string());
        assert_eq!(response.header("x-rate-limit"), Some("10"));
        assert_eq!(response.header("X-Rate-Limit"), Some("10"));
        assert_eq!(response.header("x-other"), None);
    }

    #[test]
    fn cookie_header_fills_cookies() {
        let request =
            Request::new("get", "http://x.test", "/").with_header("Cookie", "session=1; theme=dark");
        assert_eq!(request.cookies["session"], "1");
        assert_eq!(request.cookies["theme"], "dark");
    }

    #[test]
    fn body_mimetype_is_normalized() {
        let response = Response::new(200).with_body("application/json; charset=utf-8", "{}");
        assert_eq!(response.mimetype.as_deref(), Some("application/json"));
        assert_eq!(response.data, b"{}");
    }
}
