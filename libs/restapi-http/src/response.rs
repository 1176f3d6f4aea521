use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::decode::{ParsedResponse, ResponseHeaders};
use crate::error::{HttpError, MalformedResponse};

/// Maximum body preview size for error messages (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// A fully buffered HTTP response.
///
/// The body is already de-chunked and decompressed. `send()` returns this for
/// every status code; use [`HttpResponse::error_for_status`] to turn non-2xx
/// into an error.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    version: String,
    headers: ResponseHeaders,
    body: Bytes,
}

impl HttpResponse {
    pub(crate) fn from_parsed(parsed: ParsedResponse) -> Result<Self, HttpError> {
        let status = StatusCode::from_u16(parsed.status)
            .map_err(|_| MalformedResponse::InvalidStatusLine)?;
        Ok(Self {
            status,
            version: parsed.version,
            headers: parsed.headers,
            body: Bytes::from(parsed.body),
        })
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Protocol version from the status line, e.g. `"1.1"`
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    /// Header value by name, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Decoded body bytes
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body as text; invalid UTF-8 sequences are replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    ///
    /// The status code is not checked; pair with [`Self::error_for_status`]
    /// when non-2xx bodies should not be decoded.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Json`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Return `self` for 2xx responses, otherwise an [`HttpError::HttpStatus`]
    /// carrying up to 8 KiB of the body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::HttpStatus`] for any non-2xx status.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let preview = &self.body[..self.body.len().min(ERROR_BODY_PREVIEW_LIMIT)];
        Err(HttpError::HttpStatus {
            status: self.status,
            body_preview: String::from_utf8_lossy(preview).into_owned(),
            content_type: self.content_type().map(str::to_owned),
        })
    }

    #[must_use]
    pub fn into_parts(self) -> (StatusCode, ResponseHeaders, Bytes) {
        (self.status, self.headers, self.body)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::decode::parse_response;

    fn response(raw: &[u8]) -> HttpResponse {
        HttpResponse::from_parsed(parse_response(raw).unwrap()).unwrap()
    }

    #[test]
    fn test_accessors() {
        let resp = response(
            b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nX-Id: 7\r\n\r\n{\"id\":7}",
        );
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.version(), "1.1");
        assert_eq!(resp.header("x-id"), Some("7"));
        assert_eq!(resp.content_type(), Some("application/json"));
        assert_eq!(resp.text(), "{\"id\":7}");

        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_json_error() {
        let resp = response(b"HTTP/1.1 200 OK\r\n\r\nnot json");
        assert!(matches!(
            resp.json::<serde_json::Value>().unwrap_err(),
            HttpError::Json(_)
        ));
    }

    #[test]
    fn test_error_for_status() {
        let ok = response(b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(ok.error_for_status().is_ok());

        let resp = response(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\r\nmissing");
        match resp.error_for_status().unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body_preview, "missing");
                assert_eq!(content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_preview_is_capped() {
        let mut raw = b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec();
        raw.extend(std::iter::repeat_n(b'e', ERROR_BODY_PREVIEW_LIMIT * 2));

        match response(&raw).error_for_status().unwrap_err() {
            HttpError::HttpStatus { body_preview, .. } => {
                assert_eq!(body_preview.len(), ERROR_BODY_PREVIEW_LIMIT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_below_100_rejected() {
        let parsed = parse_response(b"HTTP/1.1 099 Odd\r\n\r\n").unwrap();
        assert!(matches!(
            HttpResponse::from_parsed(parsed).unwrap_err(),
            HttpError::Malformed(MalformedResponse::InvalidStatusLine)
        ));
    }

    #[test]
    fn test_into_parts() {
        let (status, headers, body) = response(b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nxyz").into_parts();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("A"), Some("b"));
        assert_eq!(body.as_ref(), b"xyz");
    }
}
