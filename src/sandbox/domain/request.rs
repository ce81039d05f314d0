//! Proxied request and response shapes.

use super::SandboxDomainError;
use super::result::{BODY_KEY, HEADERS_KEY, STATUS_CODE_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Replacement emitted for sensitive header values.
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values never reach logs.
pub const SENSITIVE_HEADERS: [&str; 6] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// HTTP methods the proxy forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Returns the canonical method token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HttpMethod {
    type Error = SandboxDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(SandboxDomainError::UnsupportedMethod(value.to_owned())),
        }
    }
}

/// A request to forward into a sandbox's internal HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    method: HttpMethod,
    path: String,
    data: Map<String, Value>,
    headers: BTreeMap<String, String>,
}

impl ProxyRequest {
    /// Creates a request without body or headers.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxDomainError::InvalidProxyPath`] when `path` is not
    /// absolute or contains a `..` segment.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Result<Self, SandboxDomainError> {
        let raw = path.into();
        let normalized = raw.trim();
        let is_valid = normalized.starts_with('/')
            && !normalized.split('/').any(|segment| segment == "..")
            && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(SandboxDomainError::InvalidProxyPath(raw));
        }

        Ok(Self {
            method,
            path: normalized.to_owned(),
            data: Map::new(),
            headers: BTreeMap::new(),
        })
    }

    /// Creates a request from loosely typed parts.
    ///
    /// # Errors
    ///
    /// Returns method or path validation errors.
    pub fn from_parts(
        method: &str,
        path: &str,
        data: Map<String, Value>,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, SandboxDomainError> {
        let parsed_method = HttpMethod::try_from(method)?;
        Ok(Self::new(parsed_method, path)?
            .with_data(data)
            .with_headers(headers))
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Adds one header; names are stored lower-case.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds several headers; names are stored lower-case.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        for (name, value) in headers {
            self.headers
                .insert(name.trim().to_ascii_lowercase(), value);
        }
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the sandbox-relative path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the JSON body.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// A response relayed back from a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    status_code: u16,
    body: Value,
    headers: BTreeMap<String, String>,
}

impl ProxyResponse {
    /// Creates a response.
    #[must_use]
    pub const fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body,
            headers: BTreeMap::new(),
        }
    }

    /// Sets the response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns the response body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Returns the response headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns `true` for 4xx and 5xx statuses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    /// Converts the response into gateway result data.
    #[must_use]
    pub fn into_data(self) -> Map<String, Value> {
        let headers = self
            .headers
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect::<Map<String, Value>>();

        let mut data = Map::new();
        data.insert(STATUS_CODE_KEY.to_owned(), Value::from(self.status_code));
        data.insert(BODY_KEY.to_owned(), self.body);
        data.insert(HEADERS_KEY.to_owned(), Value::Object(headers));
        data
    }
}

/// Returns a copy of `headers` with sensitive values replaced.
///
/// `extra` names are matched case-insensitively in addition to
/// [`SENSITIVE_HEADERS`].
#[must_use]
pub fn redact_headers(
    headers: &BTreeMap<String, String>,
    extra: &[String],
) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let lowered = name.to_ascii_lowercase();
            let is_sensitive = SENSITIVE_HEADERS.contains(&lowered.as_str())
                || extra.iter().any(|candidate| candidate.eq_ignore_ascii_case(name));
            let shown = if is_sensitive {
                REDACTED.to_owned()
            } else {
                value.clone()
            };
            (name.clone(), shown)
        })
        .collect()
}
