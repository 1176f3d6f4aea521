use regex::Regex;
use std::sync::LazyLock;

use super::chunked::decode_chunked;
use super::decompress::Decompressor;
use super::headers::ResponseHeaders;
use crate::error::MalformedResponse;

const SEPARATOR: &[u8] = b"\r\n\r\n";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^HTTP/([0-9]\.[0-9])[ \t]+([0-9]{3})(?:[ \t]|$)")
        .expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static FOLDED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]").expect("static regex should not panic"));

/// A raw response split into its parts, with the body decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Protocol version from the status line, e.g. `"1.1"`
    pub version: String,
    /// Numeric status code from the status line
    pub status: u16,
    /// Headers, without `Transfer-Encoding` and `Connection`
    pub headers: ResponseHeaders,
    /// Body after chunked decoding and decompression
    pub body: Vec<u8>,
}

/// Parser for raw HTTP/1.x response bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser {
    decompressor: Decompressor,
}

impl ResponseParser {
    #[must_use]
    pub fn new(decompressor: Decompressor) -> Self {
        Self { decompressor }
    }

    /// Split `raw` into status, headers and decoded body.
    ///
    /// The body starts right after the first `\r\n\r\n`. A `Transfer-Encoding`
    /// header routes it through the chunked decoder and is then dropped; a
    /// `Content-Encoding` header routes it through the decompressor and is
    /// kept. `Connection` headers are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedResponse::MissingSeparator`] when there is no
    /// header/body separator and [`MalformedResponse::InvalidStatusLine`] when
    /// the first line is not an HTTP status line.
    pub fn parse(&self, raw: &[u8]) -> Result<ParsedResponse, MalformedResponse> {
        let split = raw
            .windows(SEPARATOR.len())
            .position(|w| w == SEPARATOR)
            .ok_or(MalformedResponse::MissingSeparator)?;
        let raw_body = raw.get(split + SEPARATOR.len()..).unwrap_or_default();

        let head = String::from_utf8_lossy(&raw[..split]).replace("\r\n", "\n");
        let head = FOLDED_LINE.replace_all(&head, " ");
        let mut lines = head.split('\n');

        let status_line = lines.next().unwrap_or_default();
        let caps = STATUS_LINE
            .captures(status_line)
            .ok_or(MalformedResponse::InvalidStatusLine)?;
        let version = caps.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default();
        let status = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .ok_or(MalformedResponse::InvalidStatusLine)?;

        let mut headers = ResponseHeaders::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name, trim_value(value));
            }
        }

        let mut body = raw_body.to_vec();
        if headers.remove_ignore_case("transfer-encoding") {
            body = decode_chunked(&body);
        }
        if headers.contains_ignore_case("content-encoding") {
            body = self.decompressor.decompress(&body);
        }
        headers.remove_ignore_case("connection");

        Ok(ParsedResponse {
            version,
            status,
            headers,
            body,
        })
    }
}

/// Parse with the default decompression limit.
///
/// # Errors
///
/// See [`ResponseParser::parse`].
pub fn parse_response(raw: &[u8]) -> Result<ParsedResponse, MalformedResponse> {
    ResponseParser::default().parse(raw)
}

fn trim_value(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}
