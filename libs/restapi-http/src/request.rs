use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Uri};
use serde::Serialize;
use std::time::Duration;

use crate::client::HttpClient;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use crate::transport::check_uri;

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    /// Serialized JSON
    Json(Bytes),
    /// Serialized `application/x-www-form-urlencoded`
    Form(Bytes),
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`], [`HttpClient::post`], etc. Header errors
/// are captured while building and reported by [`send()`](RequestBuilder::send).
///
/// # Example
///
/// ```ignore
/// let resp = client
///     .post("https://api.example.com/v2/index.php")
///     .header("X-Request-Id", "abc")
///     .form(&[("Action", "DescribeRegions")])?
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: HttpClient,
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    timeout: Option<Duration>,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: Vec::new(),
            body: BodyKind::Empty,
            timeout: None,
            error: None,
        }
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none() {
            self.push_header(name, value);
        }
        self
    }

    /// Add multiple headers; stops at the first invalid name or value
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            if self.error.is_some() {
                break;
            }
            self.push_header(name.as_ref(), value.as_ref());
        }
        self
    }

    fn push_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
    }

    /// Set request body as JSON
    ///
    /// Sets Content-Type to `application/json` unless one was already provided.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::Json)` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.body = BodyKind::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Set request body as form URL-encoded
    ///
    /// Accepts anything `serde_urlencoded` can flatten: slices of pairs, maps
    /// or structs of scalars. Sets Content-Type to
    /// `application/x-www-form-urlencoded` unless one was already provided.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::FormEncode)` if encoding fails.
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.body = BodyKind::Form(Bytes::from(serde_urlencoded::to_string(fields)?));
        Ok(self)
    }

    /// Set request body as raw bytes
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Override the client's per-attempt timeout for this request only
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate_url(&self) -> Result<Uri, HttpError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;
        check_uri(&uri, self.client.transport_security)?;
        Ok(uri)
    }

    /// Send the request and buffer the whole response.
    ///
    /// Returns `Ok` for every HTTP status; only transport, TLS, timeout,
    /// size-limit and parse failures are errors.
    ///
    /// # Errors
    ///
    /// Returns any deferred builder error, URL validation errors, or the
    /// final attempt's transport/parse error.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let uri = self.validate_url()?;

        let mut headers = HeaderMap::new();
        if !self.headers.iter().any(|(name, _)| name == CONTENT_TYPE) {
            match &self.body {
                BodyKind::Json(_) => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                BodyKind::Form(_) => {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                BodyKind::Empty | BodyKind::Bytes(_) => {}
            }
        }
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        let body = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Json(b) | BodyKind::Form(b) => b,
        };

        let prepared = PreparedRequest {
            method: self.method,
            uri,
            headers,
            body,
        };
        let timeout = self.timeout.unwrap_or(self.client.request_timeout);
        self.client.execute(&prepared, timeout).await
    }
}

/// A validated request that can be turned into a fresh `http::Request` for
/// every attempt.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl PreparedRequest {
    pub(crate) fn to_request(&self) -> Request<Bytes> {
        let mut req = Request::new(self.body.clone());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}
