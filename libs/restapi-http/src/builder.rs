use std::time::Duration;
use tower::ServiceBuilder;
use tower::util::BoxCloneSyncService;

use crate::client::HttpClient;
use crate::config::{HttpClientConfig, RetryConfig, TlsRootConfig, TransportSecurity};
use crate::decode::{Decompressor, ResponseParser};
use crate::error::HttpError;
use crate::layers::UserAgentLayer;
use crate::transport::RawTransport;

/// Builder for constructing an [`HttpClient`]
#[derive(Debug, Clone, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Builder over [`HttpClientConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder starting from `config`.
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Set the per-attempt timeout
    ///
    /// Covers connect, write and read of one attempt. Each retry gets its own
    /// timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// `User-Agent` for requests that do not set one
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Retry policy; `None` disables retries
    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the maximum raw response size
    #[must_use]
    pub fn max_response_size(mut self, size: usize) -> Self {
        self.config.max_response_size = size;
        self
    }

    /// Set the maximum decompressed body size
    #[must_use]
    pub fn max_decompressed_size(mut self, size: usize) -> Self {
        self.config.max_decompressed_size = size;
        self
    }

    /// Accepted URL schemes
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for mock servers and
    /// private-zone endpoints.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Shorthand for `transport(TransportSecurity::AllowInsecureHttp)`
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "restapi_http::security",
            "plain HTTP allowed by allow_insecure_http(); traffic is unencrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Trust anchors for `https`
    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Assemble the tower stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the user agent is not a valid header value or the
    /// TLS configuration cannot be built.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for mock servers or private-zone endpoints"
            );
        }

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;
        let transport = RawTransport::new(&self.config)?;

        // UserAgent → RawTransport; the timeout is wrapped per attempt so a
        // request can override it.
        let service = ServiceBuilder::new().layer(ua_layer).service(transport);

        Ok(HttpClient {
            service: BoxCloneSyncService::new(service),
            parser: ResponseParser::new(Decompressor::with_limit(
                self.config.max_decompressed_size,
            )),
            retry: self.config.retry,
            request_timeout: self.config.request_timeout,
            transport_security: self.config.transport,
        })
    }
}
