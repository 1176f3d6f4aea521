use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;

use crate::decode::DEFAULT_MAX_DECOMPRESSED_SIZE;

/// `User-Agent` sent when the caller sets none
pub const DEFAULT_USER_AGENT: &str = concat!("restapi-http/", env!("CARGO_PKG_VERSION"));

/// Default cap on raw response bytes read from the socket (10 MiB)
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Outcome of an attempt that may warrant another one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Connect, read or write failure
    TransportError,
    /// Attempt exceeded its timeout
    Timeout,
    /// Answer with this status
    Status(u16),
}

impl RetryTrigger {
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    pub const BAD_GATEWAY: Self = Self::Status(502);
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);
}

/// RFC 9110 idempotent methods; only these are replayed.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Delay between attempts: `min(initial * multiplier^attempt, max)`, plus
/// up to 25% jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay (default: 100ms)
    pub initial: Duration,

    /// Upper bound (default: 10s)
    pub max: Duration,

    /// Growth factor per attempt (default: 2.0)
    pub multiplier: f64,

    /// Add a random 0-25% to each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// 1ms to 100ms without jitter, for tests
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Non-finite or negative inputs fall back to safe values instead of
    /// panicking in `Duration::from_secs_f64`.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let initial = self.initial.as_secs_f64();
        let max = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base = initial * multiplier.powi(attempt);
        let clamped = if base.is_finite() {
            base.min(max).max(0.0)
        } else {
            max
        };
        let delay = Duration::from_secs_f64(clamped);

        let delay = if self.jitter {
            let factor = rand::rng().random_range(0.0..=0.25);
            delay + delay.mul_f64(factor)
        } else {
            delay
        };
        delay.min(Duration::from_secs_f64(max))
    }
}

/// Retry policy with exponential backoff.
///
/// Only idempotent methods are ever retried; a POST that hits a trigger
/// fails with the first error.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt (total attempts = 1 + `max_retries`)
    pub max_retries: usize,

    /// Backoff strategy
    pub backoff: ExponentialBackoff,

    /// Conditions that cause a retry
    pub triggers: HashSet<RetryTrigger>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            triggers: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::TOO_MANY_REQUESTS,
                RetryTrigger::BAD_GATEWAY,
                RetryTrigger::SERVICE_UNAVAILABLE,
                RetryTrigger::GATEWAY_TIMEOUT,
            ]),
        }
    }
}

impl RetryConfig {
    /// Whether `trigger` should cause another attempt of a `method` request.
    #[must_use]
    pub fn should_retry(&self, trigger: RetryTrigger, method: &http::Method) -> bool {
        is_idempotent_method(method) && self.triggers.contains(&trigger)
    }
}

/// Where trust anchors come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots from `webpki-roots`
    #[default]
    WebPki,
    /// Platform certificate store
    Native,
}

/// Which URL schemes the transport accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// `https` only
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections (mock servers, private-zone endpoints)
    AllowInsecureHttp,
}

/// Settings consumed by [`HttpClientBuilder`](crate::HttpClientBuilder)
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout covering connect, write and read (default: 15 seconds)
    pub request_timeout: Duration,

    /// Maximum raw response size read from the socket (default: 10 MiB)
    pub max_response_size: usize,

    /// Maximum size of a decompressed body (default: 64 MiB)
    pub max_decompressed_size: usize,

    /// User-Agent header value (default: "restapi-http/<version>")
    pub user_agent: String,

    /// Retry policy; `None` disables retries (default)
    pub retry: Option<RetryConfig>,

    /// Accepted schemes (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// Trust anchors (default: `WebPki`)
    pub tls_roots: TlsRootConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: None,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
        }
    }
}

impl HttpClientConfig {
    /// No retry and a 1 MiB response cap
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            max_response_size: 1024 * 1024,
            ..Self::default()
        }
    }

    /// Plain HTTP allowed and no retry, for local mock servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry: None,
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }
}
