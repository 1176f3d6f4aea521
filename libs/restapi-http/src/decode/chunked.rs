//! Chunked transfer decoding (RFC 2616 section 3.6.1).
//!
//! The decoder is lenient: anything that does not look like chunk framing is
//! returned unchanged instead of raising an error.

use regex::bytes::Regex;
use std::sync::LazyLock;

/// Chunk-size line: hex size, optional `;name[=value]` extensions, CRLF.
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static CHUNK_SIZE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)^([0-9a-f]+)(?:;[\w-]*(?:=(?:[\w-]*|"[^\r\n]*"))?)*\r\n"#)
        .expect("static regex should not panic")
});

const TRIM_SET: &[u8] = b" \t\n\r\0\x0B";

/// Decode a chunk-framed body.
///
/// Returns `data` unchanged when the first line is not a chunk-size line, when
/// framing breaks part way through, or when a chunk size does not fit `usize`.
#[must_use]
pub fn decode_chunked(data: &[u8]) -> Vec<u8> {
    if !CHUNK_SIZE_LINE.is_match(trim_start(data)) {
        return data.to_vec();
    }

    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    loop {
        let Some(caps) = CHUNK_SIZE_LINE.captures(rest) else {
            return data.to_vec();
        };
        let line_len = caps.get(0).map_or(0, |m| m.end());
        let Some(size) = caps.get(1).and_then(|m| parse_hex(m.as_bytes())) else {
            return data.to_vec();
        };
        if size == 0 {
            return out;
        }

        let chunk = rest.get(line_len..).unwrap_or_default();
        let take = size.min(chunk.len());
        out.extend_from_slice(&chunk[..take]);

        let advance = line_len.saturating_add(size).saturating_add(2);
        rest = rest.get(advance..).unwrap_or_default();

        let remaining = trim(rest);
        if remaining.is_empty() || remaining == b"0" {
            return out;
        }
    }
}

fn parse_hex(digits: &[u8]) -> Option<usize> {
    let s = std::str::from_utf8(digits).ok()?;
    usize::from_str_radix(s, 16).ok()
}

fn trim_start(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !TRIM_SET.contains(b))
        .unwrap_or(data.len());
    &data[start..]
}

fn trim(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !TRIM_SET.contains(b))
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !TRIM_SET.contains(b))
        .map_or(start, |i| i + 1);
    &data[start..end]
}
