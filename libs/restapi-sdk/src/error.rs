use http::StatusCode;
use restapi_http::HttpError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::router::ServiceKind;

/// Errors returned by the SDK clients
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SdkError {
    /// Missing or invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Region name or code that does not exist
    #[error("Unknown region: {0}")]
    InvalidRegion(String),

    /// The service kind has no host in this region
    #[error("Region {region} is not supported by the {kind} service")]
    UnsupportedRegion { kind: ServiceKind, region: String },

    /// Request path without a leading `/`
    #[error("{0} is not start with /")]
    InvalidPath(String),

    /// Connection, TLS, timeout or malformed-response failure
    #[error("Connection ({url}) error: {source}")]
    Transport {
        url: String,
        #[source]
        source: HttpError,
    },

    /// Any HTTP status other than 200
    #[error(
        "{request_id},{} {}",
        .status.as_u16(),
        .status.canonical_reason().unwrap_or("Unknown Status")
    )]
    Status {
        request_id: String,
        status: StatusCode,
    },

    /// The backend answered with an HTML page
    #[error("{request_id},Bad request")]
    BadRequest { request_id: String },

    /// Response body is not JSON
    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// Request payload could not be serialized
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The backend reported an `error_code`
    #[error(transparent)]
    Api(#[from] RestApiError),

    /// One or more requests of a batch failed
    #[error(transparent)]
    Batch(#[from] BatchRequestError),

    /// Signature encryption failed
    #[error("Failed to sign request: {0}")]
    Signature(String),

    /// Unknown upload provider
    #[error("File provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request building failed
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Business error reported in the response body.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("RestAPIException: [{code}]: {message}")]
pub struct RestApiError {
    pub code: i64,
    pub message: String,
    /// Whole decoded response
    pub data: Value,
}

impl RestApiError {
    /// Build from a decoded response carrying a non-empty `error_code`.
    #[must_use]
    pub fn from_response(data: Value) -> Self {
        let code = data.get("error_code").map_or(-1, error_code_number);
        let message = data
            .get("message")
            .map(value_text)
            .unwrap_or_default();
        Self {
            code,
            message,
            data,
        }
    }
}

/// One failed entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    pub error_code: i64,
    pub message: String,
}

/// Aggregate error for a batch call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("BatchRequestError: [{code}]: {message}{}", errors_suffix(.errors))]
pub struct BatchRequestError {
    message: String,
    code: i64,
    errors: Vec<BatchError>,
}

impl Default for BatchRequestError {
    fn default() -> Self {
        Self::new(None, 1)
    }
}

impl BatchRequestError {
    /// An empty error; `message` defaults to `"Batch request error."`.
    #[must_use]
    pub fn new(message: Option<&str>, code: i64) -> Self {
        Self {
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or("Batch request error.")
                .to_owned(),
            code,
            errors: Vec::new(),
        }
    }

    /// Record the failure of `request` described by `response`.
    pub fn add(&mut self, request: &Value, response: &Value) -> &mut Self {
        let error_code = response
            .get("error_code")
            .filter(|code| !is_empty_value(code))
            .map_or(-1, error_code_number);
        let message = response
            .get("message")
            .map(value_text)
            .unwrap_or_default();
        self.errors.push(BatchError {
            error_code,
            message: format!("{error_code} {message}:{request}"),
        });
        self
    }

    #[must_use]
    pub fn errors(&self) -> &[BatchError] {
        &self.errors
    }

    #[must_use]
    pub fn first(&self) -> Option<&BatchError> {
        self.errors.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn code(&self) -> i64 {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn errors_suffix(errors: &[BatchError]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        serde_json::to_string(errors).unwrap_or_default()
    }
}

/// Loose emptiness: null, `false`, `0`, `""`, `"0"`, `[]` and `{}`.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Numeric error code; non-numeric codes map to -1.
fn error_code_number(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(-1),
        Value::String(s) => s.trim().parse().unwrap_or(-1),
        _ => -1,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
