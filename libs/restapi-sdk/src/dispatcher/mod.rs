//! Signed request dispatch.
//!
//! A [`Dispatcher`] resolves the endpoint, merges default, per-request and
//! caller headers, encodes the payload, sends it through
//! [`restapi_http::HttpClient`] and maps the outcome to a JSON value or an
//! [`SdkError`].

mod profile;

pub use profile::{PayProfile, Profile, ServiceProfile};

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, StatusCode};
use restapi_http::{HttpClient, HttpClientBuilder, HttpResponse, TransportSecurity};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::error::{BatchRequestError, RestApiError, SdkError, is_empty_value};
use crate::query::build_query;
use crate::router::Router;
use crate::storage::{SessionStorage, Storage};
use crate::util::{correlation_id, user_agent};

/// Client of the general service API.
pub type ServiceClient = Dispatcher<ServiceProfile>;

/// Client of the payment API.
pub type PayClient = Dispatcher<PayProfile>;

const REQUEST_ID_HEADER: &str = "x-request-id";

const REDACTED_HEADERS: [&str; 3] = [
    "x-rest-signature",
    "x-client-signature",
    "x-rest-authorization",
];

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; it replaces any default header of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Request dispatcher for one backend family.
pub struct Dispatcher<P: Profile> {
    config: ClientConfig,
    router: Router,
    http: HttpClient,
    storage: Arc<dyn Storage>,
    profile: PhantomData<P>,
}

impl<P: Profile> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            router: self.router,
            http: self.http.clone(),
            storage: Arc::clone(&self.storage),
            profile: PhantomData,
        }
    }
}

impl<P: Profile> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &P::KIND)
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl<P: Profile> Dispatcher<P> {
    /// Create a client from a validated configuration.
    ///
    /// Plain HTTP is enabled only when the resolved endpoint uses it.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when the profile's credentials are
    /// missing, or [`SdkError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, SdkError> {
        P::validate(&config)?;
        let router = Router::new(P::KIND, config.region(), config.private_zone());

        let mut builder = HttpClientBuilder::new()
            .timeout(config.timeout())
            .user_agent(user_agent(P::VERSION));
        let endpoint = resolve_endpoint::<P>(&config, &router).unwrap_or_default();
        if endpoint.starts_with("http://") {
            tracing::warn!(
                target: "restapi_http::security",
                endpoint = %endpoint,
                "endpoint uses plain HTTP"
            );
            builder = builder.transport(TransportSecurity::AllowInsecureHttp);
        }

        Ok(Self {
            http: builder.build()?,
            config,
            router,
            storage: Arc::new(SessionStorage::new()),
            profile: PhantomData,
        })
    }

    /// Replace the storage.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Base URL including the API version, e.g. `https://host/1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnsupportedRegion`] when neither `server_url`
    /// nor `api_server` is set and the region has no route.
    pub fn endpoint(&self) -> Result<String, SdkError> {
        resolve_endpoint::<P>(&self.config, &self.router)
    }

    /// Headers shared by every request of this client.
    #[must_use]
    pub fn default_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_owned(), P::CONTENT_TYPE.to_owned()),
            ("Accept-Encoding".to_owned(), "gzip, deflate".to_owned()),
            ("User-Agent".to_owned(), user_agent(P::VERSION)),
            ("X-Rest-Sysid".to_owned(), self.config.sys_id().to_owned()),
            ("X-Rest-Client".to_owned(), P::VERSION.to_owned()),
        ];
        headers.extend(P::extra_headers(&self.config));
        headers
    }

    /// Default headers plus the per-request ones (production flag, access
    /// token and a fresh signature).
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Signature`] if signing fails.
    pub fn build_headers(&self) -> Result<Vec<(String, String)>, SdkError> {
        let mut headers = self.default_headers();
        headers.push((
            "X-Rest-Prod".to_owned(),
            if self.config.is_production() { "1" } else { "0" }.to_owned(),
        ));
        if let Some(token) = self.config.access_token().filter(|t| !t.is_empty()) {
            headers.push(("X-Rest-Authorization".to_owned(), token.expose().to_owned()));
        }
        headers.push((
            P::SIGNATURE_HEADER.to_owned(),
            P::sign(&self.config, self.router.iv())?,
        ));
        Ok(headers)
    }

    /// Issue a GET; `data` becomes the query string.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get<T: Serialize + ?Sized>(
        &self,
        path: &str,
        data: &T,
    ) -> Result<Value, SdkError> {
        self.request(Method::GET, path, Some(&to_value(data)?), &RequestOptions::default())
            .await
    }

    /// Issue a POST with `data` as the body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        data: &T,
    ) -> Result<Value, SdkError> {
        self.request(Method::POST, path, Some(&to_value(data)?), &RequestOptions::default())
            .await
    }

    /// Issue a PUT with `data` as the body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        data: &T,
    ) -> Result<Value, SdkError> {
        self.request(Method::PUT, path, Some(&to_value(data)?), &RequestOptions::default())
            .await
    }

    /// Issue a DELETE.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str) -> Result<Value, SdkError> {
        self.request(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    /// Issue a request and decode the JSON answer.
    ///
    /// GET appends `data` as a query string, POST and PUT encode it by the
    /// effective `Content-Type` (JSON or form), DELETE sends no body.
    ///
    /// # Errors
    ///
    /// - [`SdkError::InvalidPath`] if `path` does not start with `/`
    /// - [`SdkError::Transport`] on connection, timeout or parse failures
    /// - [`SdkError::Status`] for any status other than 200
    /// - [`SdkError::BadRequest`] for an HTML answer
    /// - [`SdkError::Decode`] when the body is not JSON
    /// - [`SdkError::Api`] when the body carries an `error_code`
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        data: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, SdkError> {
        if !path.starts_with('/') {
            return Err(SdkError::InvalidPath(path.to_owned()));
        }
        let mut url = format!("{}/{}", self.endpoint()?, path.trim_start_matches('/'));
        let headers = merge_headers(self.build_headers()?, &options.headers);

        let content_type = header_value(&headers, "content-type").unwrap_or_default();
        let body = match (&method, data) {
            (&Method::GET, Some(data)) => {
                let query = build_query(data);
                if !query.is_empty() {
                    url.push(if url.contains('?') { '&' } else { '?' });
                    url.push_str(&query);
                }
                None
            }
            (&Method::POST | &Method::PUT, Some(data)) => encode_body(content_type, data)?,
            _ => None,
        };

        let cid = correlation_id();
        tracing::info!(cid, method = %method, url = %url, "RestAPI request");
        if self.config.debug() {
            tracing::debug!(
                cid,
                headers = %loggable_headers(&headers),
                body = %body.as_ref().map(|b| String::from_utf8_lossy(b)).unwrap_or_default(),
                "RestAPI request detail"
            );
        }

        let mut builder = self.http.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body_bytes(body);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|source| {
            tracing::warn!(cid, url = %url, error = %source, "RestAPI transport error");
            SdkError::Transport {
                url: url.clone(),
                source,
            }
        })?;
        self.handle_response(cid, started, &response)
    }

    /// Post several requests to `/batch`.
    ///
    /// Each entry of `requests` is a JSON object as the backend expects
    /// (`method`, `path`, `body`, ...). The answer holds one entry per
    /// request, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Batch`] listing every entry whose answer carries
    /// an `error_code`, or any error of [`request`](Self::request).
    pub async fn batch(
        &self,
        requests: &[Value],
        options: &RequestOptions,
    ) -> Result<Value, SdkError> {
        let payload = json!({ "requests": requests });
        let response = self
            .request(Method::POST, "/batch", Some(&payload), options)
            .await?;

        let mut error = BatchRequestError::default();
        for (index, request) in requests.iter().enumerate() {
            let entry = response
                .get(index)
                .or_else(|| response.get(index.to_string()));
            if let Some(entry) =
                entry.filter(|e| e.get("error_code").is_some_and(|c| !c.is_null()))
            {
                error.add(request, entry);
            }
        }

        if error.is_empty() {
            Ok(response)
        } else {
            Err(error.into())
        }
    }

    fn handle_response(
        &self,
        cid: u16,
        started: Instant,
        response: &HttpResponse,
    ) -> Result<Value, SdkError> {
        let header_request_id = response.header(REQUEST_ID_HEADER).unwrap_or_default().to_owned();
        let decoded = serde_json::from_slice::<Value>(&response.bytes());

        let logged_request_id = if header_request_id.is_empty() {
            decoded
                .as_ref()
                .ok()
                .and_then(|v| v.get("request_id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
        } else {
            header_request_id.as_str()
        };
        tracing::info!(
            cid,
            status = response.status().as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            request_id = logged_request_id,
            "RestAPI response"
        );
        if self.config.debug() {
            tracing::debug!(cid, body = %response.text(), "RestAPI response detail");
        }

        if response.status() != StatusCode::OK {
            return Err(SdkError::Status {
                request_id: header_request_id,
                status: response.status(),
            });
        }
        if response
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
        {
            return Err(SdkError::BadRequest {
                request_id: header_request_id,
            });
        }

        let data = decoded.map_err(SdkError::Decode)?;
        if data.get("error_code").is_some_and(|code| !is_empty_value(code)) {
            return Err(RestApiError::from_response(data).into());
        }
        Ok(data)
    }
}

fn resolve_endpoint<P: Profile>(
    config: &ClientConfig,
    router: &Router,
) -> Result<String, SdkError> {
    let version = config.api_version();
    if let Some(url) = config.server_url().filter(|u| !u.is_empty()) {
        return Ok(format!("{}/{version}", url.trim_end_matches('/')));
    }
    if let Some(server) = config.api_server().filter(|s| !s.is_empty()) {
        return Ok(format!("{server}/{version}"));
    }
    let routes = router.routes()?;
    Ok(format!(
        "{}://{}/{version}",
        P::scheme(routes.is_private_zone),
        routes.api_server
    ))
}

fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value, SdkError> {
    serde_json::to_value(data).map_err(SdkError::Encode)
}

/// Encode a POST/PUT body according to `content_type`; other types send
/// no body.
fn encode_body(content_type: &str, data: &Value) -> Result<Option<Bytes>, SdkError> {
    if content_type.contains("/json") {
        return serde_json::to_vec(data)
            .map(|b| Some(Bytes::from(b)))
            .map_err(SdkError::Encode);
    }
    if content_type.contains("/x-www-form-urlencoded") {
        return Ok(Some(Bytes::from(build_query(data))));
    }
    Ok(None)
}

/// Apply `overrides` on top of `defaults`, matching names case-insensitively.
fn merge_headers(
    mut defaults: Vec<(String, String)>,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    for (name, value) in overrides {
        if let Some(index) = defaults
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            defaults[index].1.clone_from(value);
        } else {
            defaults.push((name.clone(), value.clone()));
        }
    }
    defaults
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn loggable_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if REDACTED_HEADERS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                format!("{name}: [REDACTED]")
            } else {
                format!("{name}: {value}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
