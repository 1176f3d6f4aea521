#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Raw HTTP/1.1 client with manual response parsing
//!
//! This crate talks to REST-style cloud APIs that do not always speak clean
//! HTTP. Instead of a full protocol stack it:
//! - Writes one request per connection (TCP or TLS via rustls) with
//!   `Connection: close` and reads the raw response bytes
//! - Splits status line, headers and body itself ([`decode::ResponseParser`])
//! - De-chunks `Transfer-Encoding` bodies leniently, passing through bodies
//!   that are not really chunked
//! - Decompresses `Content-Encoding` bodies with a cascade of gzip, raw
//!   deflate, a compatibility decoder and zlib, falling back to the bytes
//!   as received
//! - Applies per-attempt timeouts and optional retries with exponential
//!   backoff for idempotent methods
//!
//! # Example
//!
//! ```ignore
//! use restapi_http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .build()?;
//!
//! let resp = client
//!     .post("https://cvm.api.example.com/v2/index.php")
//!     .form(&[("Action", "DescribeInstances")])?
//!     .send()
//!     .await?;
//! let data: serde_json::Value = resp.error_for_status()?.json()?;
//! ```

mod builder;
mod client;
mod config;
pub mod decode;
mod error;
mod layers;
mod request;
mod response;
pub mod tls;
mod transport;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_USER_AGENT, ExponentialBackoff, HttpClientConfig,
    RetryConfig, RetryTrigger, TlsRootConfig, TransportSecurity, is_idempotent_method,
};
pub use decode::{ParsedResponse, ResponseHeaders, ResponseParser, parse_response};
pub use error::{HttpError, InvalidUriKind, MalformedResponse};
pub use layers::{UserAgentLayer, UserAgentService};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse};
pub use transport::{RawTransport, check_uri};
