use bytes::Bytes;
use http::Request;
use std::time::Duration;
use tower::ServiceExt;
use tower::timeout::Timeout;
use tower::util::BoxCloneSyncService;

use crate::builder::HttpClientBuilder;
use crate::config::{RetryConfig, RetryTrigger, TransportSecurity};
use crate::decode::ResponseParser;
use crate::error::HttpError;
use crate::request::{PreparedRequest, RequestBuilder};
use crate::response::HttpResponse;

/// Type-erased `UserAgent → RawTransport` stack.
pub(crate) type InnerService = BoxCloneSyncService<Request<Bytes>, Bytes, HttpError>;

/// HTTP client over a raw HTTP/1.1 transport
///
/// Every request opens a fresh connection, sends `Connection: close` and
/// buffers the whole response before parsing it. The stack per attempt is
/// `Timeout → UserAgent → RawTransport`; idempotent requests are retried
/// according to the configured [`RetryConfig`].
///
/// `HttpClient` is `Clone + Send + Sync` and cheap to clone.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder().timeout(Duration::from_secs(5)).build()?;
/// let resp = client.get("https://api.example.com/health").send().await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: InnerService,
    pub(crate) parser: ResponseParser,
    pub(crate) retry: Option<RetryConfig>,
    pub(crate) request_timeout: Duration,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Client with [`HttpClientConfig::default`](crate::HttpClientConfig) settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Start a request with an arbitrary method
    pub fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.to_owned())
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::DELETE, url)
    }

    pub(crate) async fn execute(
        &self,
        prepared: &PreparedRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let mut attempt = 0;
        loop {
            let result = self.attempt(prepared.to_request(), timeout).await;

            let Some(retry) = &self.retry else {
                return result;
            };
            let trigger = match &result {
                Ok(resp) => Some(RetryTrigger::Status(resp.status().as_u16())),
                Err(HttpError::Timeout(_)) => Some(RetryTrigger::Timeout),
                Err(e) if e.is_transport() => Some(RetryTrigger::TransportError),
                Err(_) => None,
            };
            let retryable =
                trigger.is_some_and(|trigger| retry.should_retry(trigger, &prepared.method));
            if !retryable || attempt >= retry.max_retries {
                return result;
            }

            let delay = retry.backoff.delay(attempt);
            tracing::debug!(
                method = %prepared.method,
                uri = %prepared.uri,
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        req: Request<Bytes>,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let raw = Timeout::new(self.service.clone(), timeout)
            .oneshot(req)
            .await
            .map_err(|e| map_tower_error(e, timeout))?;
        let parsed = self.parser.parse(&raw)?;
        HttpResponse::from_parsed(parsed)
    }
}

/// Map tower errors to `HttpError`, unwrapping errors from the inner service.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::{ExponentialBackoff, HttpClientConfig};
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_client() -> HttpClient {
        HttpClientBuilder::new()
            .allow_insecure_http()
            .retry(None)
            .build()
            .unwrap()
    }

    fn retrying_client(max_retries: usize) -> HttpClient {
        let config = HttpClientConfig {
            retry: Some(RetryConfig {
                max_retries,
                backoff: ExponentialBackoff::fast(),
                ..RetryConfig::default()
            }),
            ..HttpClientConfig::for_testing()
        };
        HttpClientBuilder::with_config(config).build().unwrap()
    }

    fn gzip_compress(data: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_http_client_get() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(Method::GET).path("/test");
            then.status(200).json_body(json!({"success": true}));
        });

        let resp = test_client()
            .get(&format!("{}/test", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body, json!({"success": true}));
    }

    #[tokio::test]
    async fn test_http_client_post_json() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/json")
                .header("content-type", "application/json")
                .json_body(json!({"Action": "DescribeRegions"}));
            then.status(200).json_body(json!({"ok": true}));
        });

        let resp = test_client()
            .post(&format!("{}/json", server.base_url()))
            .json(&json!({"Action": "DescribeRegions"}))
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
        m.assert();
    }

    #[tokio::test]
    async fn test_http_client_post_form() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/form")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("key1=value1&key2=value2");
            then.status(200).body("ok");
        });

        let resp = test_client()
            .post(&format!("{}/form", server.base_url()))
            .form(&[("key1", "value1"), ("key2", "value2")])
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text(), "ok");
        m.assert();
    }

    #[tokio::test]
    async fn test_custom_content_type_not_overridden() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/ct")
                .header("content-type", "application/vnd.custom+json");
            then.status(200);
        });

        test_client()
            .post(&format!("{}/ct", server.base_url()))
            .header("Content-Type", "application/vnd.custom+json")
            .json(&json!({}))
            .unwrap()
            .send()
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn test_user_agent_header() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::GET)
                .path("/ua")
                .header("user-agent", "custom/1.0");
            then.status(200);
        });

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .user_agent("custom/1.0")
            .build()
            .unwrap();
        client
            .get(&format!("{}/ua", server.base_url()))
            .send()
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn test_error_status_is_not_an_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(Method::GET).path("/missing");
            then.status(404).body("not here");
        });

        let resp = test_client()
            .get(&format!("{}/missing", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
        assert!(matches!(
            resp.error_for_status().unwrap_err(),
            HttpError::HttpStatus { body_preview, .. } if body_preview == "not here"
        ));
    }

    #[tokio::test]
    async fn test_gzip_decompression() {
        let server = MockServer::start();
        let original = b"Hello, this is a test body that will be gzip compressed!";
        let compressed = gzip_compress(original);
        let _m = server.mock(|when, then| {
            when.method(Method::GET).path("/gzip");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let resp = test_client()
            .get(&format!("{}/gzip", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.bytes().as_ref(), original);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(Method::GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = client
            .get(&format!("{}/slow", server.base_url()))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_per_request_timeout_overrides_client() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(Method::GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let err = test_client()
            .get(&format!("{}/slow", server.base_url()))
            .timeout(Duration::from_millis(20))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_get_retried_on_503() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::GET).path("/unavailable");
            then.status(503).body("busy");
        });

        let resp = retrying_client(2)
            .get(&format!("{}/unavailable", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(m.calls(), 3, "1 initial + 2 retries");
        assert_eq!(resp.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_post_not_retried() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::POST).path("/unavailable");
            then.status(503);
        });

        let resp = retrying_client(2)
            .post(&format!("{}/unavailable", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(m.calls(), 1);
        assert_eq!(resp.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_outside_triggers_not_retried() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::GET).path("/boom");
            then.status(500);
        });

        retrying_client(3)
            .get(&format!("{}/boom", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(m.calls(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = test_client()
            .get(&format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_client_is_clone_and_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<HttpClient>();

        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(Method::GET).path("/shared");
            then.status(200).body("ok");
        });

        let client = test_client();
        let url = format!("{}/shared", server.base_url());
        let (a, b) = tokio::join!(client.get(&url).send(), client.clone().get(&url).send());
        assert_eq!(a.unwrap().text(), "ok");
        assert_eq!(b.unwrap().text(), "ok");
        assert_eq!(m.calls(), 2);
    }

    #[test]
    fn test_map_tower_error() {
        let timeout = Duration::from_secs(1);
        let inner = HttpError::BodyTooLarge {
            limit: 1,
            actual: 2,
        };
        let err = map_tower_error(Box::new(inner), timeout);
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 1, actual: 2 }));

        let err = map_tower_error("other".into(), timeout);
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
