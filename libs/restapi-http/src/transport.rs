//! One-shot HTTP/1.1 transport returning the undecoded response bytes.
//!
//! Every call opens a fresh connection, writes the request with
//! `Connection: close` and reads until the server closes or the response is
//! complete by its own framing. Nothing is decoded here; the raw bytes go to
//! [`crate::decode::ResponseParser`].

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST};
use http::{Method, Request, Uri};
use rustls_pki_types::ServerName;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tower::Service;

use crate::config::{HttpClientConfig, TransportSecurity};
use crate::error::{HttpError, InvalidUriKind};

const READ_CHUNK: usize = 8 * 1024;
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Plain or TLS connection to the origin.
enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Where a request goes, resolved from its URI.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
    tls: bool,
    host_header: String,
}

/// Resolve host, port and TLS mode, enforcing the transport security mode.
///
/// # Errors
///
/// `InvalidUri` when the URI has no scheme or host, `InvalidScheme` for
/// anything but `https` (or `http` when insecure HTTP is allowed).
pub fn check_uri(uri: &Uri, security: TransportSecurity) -> Result<(), HttpError> {
    resolve_target(uri, security).map(|_| ())
}

fn resolve_target(uri: &Uri, security: TransportSecurity) -> Result<Target, HttpError> {
    let scheme = uri.scheme_str().ok_or_else(|| HttpError::InvalidUri {
        url: uri.to_string(),
        kind: InvalidUriKind::MissingScheme,
        reason: "URL must have a scheme (http or https)".to_owned(),
    })?;

    let (tls, default_port) = match scheme {
        "https" => (true, 443),
        "http" if security == TransportSecurity::AllowInsecureHttp => (false, 80),
        "http" => {
            return Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "plain HTTP requires TransportSecurity::AllowInsecureHttp".to_owned(),
            });
        }
        other => {
            return Err(HttpError::InvalidScheme {
                scheme: other.to_owned(),
                reason: "only http and https are supported".to_owned(),
            });
        }
    };

    let authority = uri.authority().ok_or_else(|| HttpError::InvalidUri {
        url: uri.to_string(),
        kind: InvalidUriKind::MissingAuthority,
        reason: "URL must have a host".to_owned(),
    })?;
    let host = authority
        .host()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_owned();
    let host_header = authority
        .as_str()
        .rsplit('@')
        .next()
        .unwrap_or(authority.as_str())
        .to_owned();

    Ok(Target {
        host,
        port: authority.port_u16().unwrap_or(default_port),
        tls,
        host_header,
    })
}

/// Request line and headers, ending with the blank line.
fn serialize_head(req: &Request<Bytes>, host_header: &str) -> Vec<u8> {
    let path = req
        .uri()
        .path_and_query()
        .map(http::uri::PathAndQuery::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or("/");

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(req.method().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    out.extend_from_slice(host_header.as_bytes());
    out.extend_from_slice(b"\r\n");

    for (name, value) in req.headers() {
        if name == HOST || name == CONTENT_LENGTH || name == CONNECTION {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    let body_len = req.body().len();
    if body_len > 0 || req.method() == Method::POST || req.method() == Method::PUT {
        out.extend_from_slice(b"Content-Length: ");
        out.extend_from_slice(body_len.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out
}

/// Whether `buf` already holds a whole response, judged by its own framing.
/// Leading interim 1xx heads are skipped first.
///
/// Responses framed only by connection close are never complete here; the
/// reader stops at EOF for those.
fn is_complete(buf: &[u8], head_request: bool) -> bool {
    let buf = &buf[interim_len(buf)..];
    let Some(split) = find(buf, HEADER_END) else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..split]);
    let body = &buf[split + HEADER_END.len()..];

    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok());
    if head_request || matches!(status, Some(101 | 204 | 304)) {
        return true;
    }

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(len) = value.trim().parse::<usize>() {
                return body.len() >= len;
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            return chunked_complete(body);
        }
    }
    false
}

/// Whether a chunked body has reached its zero chunk and trailer terminator.
fn chunked_complete(body: &[u8]) -> bool {
    let mut pos = 0usize;
    loop {
        let Some(rest) = body.get(pos..) else {
            return false;
        };
        let Some(line_end) = find(rest, b"\r\n") else {
            return false;
        };
        let size_field = rest[..line_end]
            .split(|b| *b == b';')
            .next()
            .unwrap_or_default();
        let Some(size) = std::str::from_utf8(size_field)
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
        else {
            return false;
        };

        let data_start = line_end + 2;
        if size == 0 {
            let trailers = &rest[data_start..];
            return trailers.starts_with(b"\r\n") || find(trailers, HEADER_END).is_some();
        }
        pos = match data_start
            .checked_add(size)
            .and_then(|n| n.checked_add(2))
            .and_then(|n| pos.checked_add(n))
        {
            Some(next) => next,
            None => return false,
        };
    }
}

/// Byte length of the interim 1xx heads (`100 Continue`, `103 Early Hints`)
/// that precede the final response. `101` counts as final.
fn interim_len(buf: &[u8]) -> usize {
    let mut offset = 0;
    loop {
        let rest = &buf[offset..];
        let Some(split) = find(rest, HEADER_END) else {
            return offset;
        };
        match status_code(&rest[..split]) {
            Some(code) if (100..200).contains(&code) && code != 101 => {
                offset += split + HEADER_END.len();
            }
            _ => return offset,
        }
    }
}

fn status_code(head: &[u8]) -> Option<u16> {
    let line = head.split(|b| *b == b'\r').next()?;
    std::str::from_utf8(line)
        .ok()?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read until EOF or a complete response, enforcing `limit`.
async fn read_response<S>(
    stream: &mut S,
    limit: usize,
    head_request: bool,
) -> Result<Bytes, HttpError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        let n = match stream.read_buf(&mut buf).await {
            Ok(n) => n,
            // Peers that close TLS without close_notify
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !buf.is_empty() => 0,
            Err(e) => return Err(e.into()),
        };
        if buf.len() > limit {
            return Err(HttpError::BodyTooLarge {
                limit,
                actual: buf.len(),
            });
        }
        if n == 0 || is_complete(&buf, head_request) {
            let interim = interim_len(&buf);
            return Ok(buf.freeze().slice(interim..));
        }
        if buf.capacity() == buf.len() {
            buf.reserve(READ_CHUNK);
        }
    }
}

/// Tower service that sends one request per connection and returns the raw
/// response bytes.
#[derive(Clone)]
pub struct RawTransport {
    tls: TlsConnector,
    security: TransportSecurity,
    max_response_size: usize,
}

impl RawTransport {
    /// Create a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Tls`] if the TLS client configuration cannot be built.
    pub fn new(config: &HttpClientConfig) -> Result<Self, HttpError> {
        Ok(Self {
            tls: crate::tls::connector(config.tls_roots)?,
            security: config.transport,
            max_response_size: config.max_response_size,
        })
    }

    async fn execute(self, req: Request<Bytes>) -> Result<Bytes, HttpError> {
        let target = resolve_target(req.uri(), self.security)?;
        let head = serialize_head(&req, &target.host_header);

        tracing::trace!(
            host = %target.host,
            port = target.port,
            tls = target.tls,
            "opening connection"
        );
        let tcp = TcpStream::connect((target.host.as_str(), target.port)).await?;
        let mut stream = if target.tls {
            let server_name = ServerName::try_from(target.host.clone())
                .map_err(|e| HttpError::Tls(Box::new(e)))?;
            let tls = self
                .tls
                .connect(server_name, tcp)
                .await
                .map_err(|e| HttpError::Tls(Box::new(e)))?;
            HttpStream::Tls(Box::new(tls))
        } else {
            HttpStream::Plain(tcp)
        };

        stream.write_all(&head).await?;
        stream.write_all(req.body()).await?;
        stream.flush().await?;

        let raw = read_response(
            &mut stream,
            self.max_response_size,
            req.method() == Method::HEAD,
        )
        .await?;
        tracing::trace!(bytes = raw.len(), "raw response received");
        Ok(raw)
    }
}

impl Service<Request<Bytes>> for RawTransport {
    type Response = Bytes;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Bytes, HttpError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        let this = self.clone();
        Box::pin(this.execute(req))
    }
}
