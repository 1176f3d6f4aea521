//! File uploads to the storage provider.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use md5::{Digest, Md5};
use restapi_http::{HttpClient, HttpClientBuilder, TransportSecurity};
use serde_json::Value;

use crate::error::SdkError;
use crate::util::version_string;

const DEFAULT_MIME: &str = "application/octet-stream";
const FILE_FIELD: &str = "file";

/// File content to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

/// A storage provider accepting multipart uploads.
#[async_trait]
pub trait Uploader: Send + Sync {
    fn upload_url(&self) -> &str;

    fn auth_token(&self) -> &str;

    /// Upload `content` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] when the upload fails and
    /// [`SdkError::Decode`] when the answer is not JSON.
    async fn upload(
        &self,
        content: &[u8],
        mime_type: Option<&str>,
        key: &str,
    ) -> Result<Value, SdkError>;

    /// Read a local file and upload it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Io`] if the file cannot be read, or any error
    /// of [`upload`](Self::upload).
    async fn upload_local_file(&self, path: &Path, key: &str) -> Result<Value, SdkError> {
        let content = tokio::fs::read(path).await?;
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_type);
        self.upload(&content, mime, key).await
    }
}

/// Uploader for `provider`; only `"uhz"` is known.
///
/// # Errors
///
/// Returns [`SdkError::UnsupportedProvider`] for any other provider, or
/// [`SdkError::Http`] if the HTTP client cannot be built.
pub fn create_uploader(
    provider: &str,
    upload_url: &str,
    auth_token: &str,
) -> Result<Box<dyn Uploader>, SdkError> {
    match provider {
        "uhz" => Ok(Box::new(UhzUploader::new(upload_url, auth_token)?)),
        other => Err(SdkError::UnsupportedProvider(other.to_owned())),
    }
}

/// MIME type for a file extension, if known.
#[must_use]
pub fn mime_type(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "zip" => "application/zip",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Escape quotes, backslashes and NUL with a backslash.
fn escape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' | '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

/// Encode `params` and an optional file as `multipart/form-data`.
#[must_use]
pub fn multipart_encode(
    file: Option<&UploadFile>,
    params: &[(String, String)],
    boundary: &str,
) -> Vec<u8> {
    let mut body = b"\r\n".to_vec();
    for (key, value) in params {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{key}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        let mime = file.mime_type.as_deref().unwrap_or(DEFAULT_MIME);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{FILE_FIELD}\"; filename=\"{}\"\r\n\
                 Content-Type: {mime}\r\n\r\n",
                escape_filename(&file.name)
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Boundary: hex MD5 of the current time.
fn boundary() -> String {
    let now = chrono::Utc::now();
    let stamp = format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros());
    hex::encode(Md5::digest(stamp.as_bytes()))
}

/// CRC-32 of `data`.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Uploader of the in-house storage service.
#[derive(Debug, Clone)]
pub struct UhzUploader {
    upload_url: String,
    auth_token: String,
    user_agent: String,
    http: HttpClient,
    app_id: Option<i64>,
    file_type_id: Option<i64>,
    cust_id: Option<i64>,
    user_id: Option<i64>,
    post_params: Vec<(String, String)>,
}

impl UhzUploader {
    /// # Errors
    ///
    /// Returns [`SdkError::Http`] if the HTTP client cannot be built.
    pub fn new(upload_url: &str, auth_token: &str) -> Result<Self, SdkError> {
        let user_agent = version_string();
        let mut builder = HttpClientBuilder::new().user_agent(user_agent.clone());
        if upload_url.starts_with("http://") {
            builder = builder.transport(TransportSecurity::AllowInsecureHttp);
        }
        Ok(Self {
            upload_url: upload_url.to_owned(),
            auth_token: auth_token.to_owned(),
            user_agent,
            http: builder.build()?,
            app_id: None,
            file_type_id: None,
            cust_id: None,
            user_id: None,
            post_params: Vec::new(),
        })
    }

    #[must_use]
    pub fn app_id(mut self, app_id: i64) -> Self {
        self.app_id = Some(app_id);
        self
    }

    #[must_use]
    pub fn file_type_id(mut self, type_id: i64) -> Self {
        self.file_type_id = Some(type_id);
        self
    }

    #[must_use]
    pub fn cust_id(mut self, cust_id: i64) -> Self {
        self.cust_id = Some(cust_id);
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Route `app_id`, `type_id`, `cust_id` and `user_id` to their fields;
    /// the remaining entries are sent as extra form params.
    ///
    /// Ids that are not integers are ignored.
    #[must_use]
    pub fn set_upload_params(mut self, params: &BTreeMap<String, Value>) -> Self {
        let mut rest = Vec::new();
        for (key, value) in params {
            let id = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            match key.as_str() {
                "app_id" => self.app_id = id.or(self.app_id),
                "type_id" => self.file_type_id = id.or(self.file_type_id),
                "cust_id" => self.cust_id = id.or(self.cust_id),
                "user_id" => self.user_id = id.or(self.user_id),
                _ => rest.push((key.clone(), param_text(value))),
            }
        }
        if !rest.is_empty() {
            self.post_params = rest;
        }
        self
    }

    /// Form params for one upload, in wire order.
    fn params(&self, content: &[u8], key: &str) -> Vec<(String, String)> {
        let mut params = vec![
            ("token".to_owned(), self.auth_token.clone()),
            ("key".to_owned(), key.to_owned()),
            ("crc32".to_owned(), crc32(content).to_string()),
        ];
        for (name, value) in [
            ("app_id", self.app_id),
            ("file_type_id", self.file_type_id),
            ("cust_id", self.cust_id),
            ("user_id", self.user_id),
        ] {
            if let Some(value) = value {
                params.push((name.to_owned(), value.to_string()));
            }
        }
        params.extend(self.post_params.iter().cloned());
        params
    }
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Uploader for UhzUploader {
    fn upload_url(&self) -> &str {
        &self.upload_url
    }

    fn auth_token(&self) -> &str {
        &self.auth_token
    }

    async fn upload(
        &self,
        content: &[u8],
        mime_type: Option<&str>,
        key: &str,
    ) -> Result<Value, SdkError> {
        let boundary = boundary();
        let file = UploadFile {
            name: key.to_owned(),
            mime_type: mime_type.map(str::to_owned),
            content: content.to_vec(),
        };
        let body = multipart_encode(Some(&file), &self.params(content, key), &boundary);

        tracing::info!(url = %self.upload_url, key, size = content.len(), "uploading file");
        let response = self
            .http
            .post(&self.upload_url)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", &format!("multipart/form-data; boundary={boundary}"))
            .body_bytes(body)
            .send()
            .await
            .map_err(|source| SdkError::Transport {
                url: self.upload_url.clone(),
                source,
            })?;

        serde_json::from_slice(&response.bytes()).map_err(SdkError::Decode)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn multipart_layout() {
        let file = UploadFile {
            name: "a\"b.txt".to_owned(),
            mime_type: None,
            content: b"hello".to_vec(),
        };
        let body = multipart_encode(
            Some(&file),
            &[("token".to_owned(), "t".to_owned())],
            "XYZ",
        );
        let expected = "\r\n--XYZ\r\nContent-Disposition: form-data; name=\"token\"\r\n\r\nt\r\n\
                        --XYZ\r\nContent-Disposition: form-data; name=\"file\"; \
                        filename=\"a\\\"b.txt\"\r\n\
                        Content-Type: application/octet-stream\r\n\r\nhello\r\n--XYZ--\r\n";
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    #[test]
    fn multipart_without_file() {
        let body = multipart_encode(None, &[], "B");
        assert_eq!(body, b"\r\n--B--\r\n");
    }

    #[test]
    fn filename_escaping() {
        assert_eq!(escape_filename(r"x\y'z"), r"x\\y\'z");
        assert_eq!(escape_filename("n\0ul"), "n\\0ul");
    }

    #[test]
    fn crc32_matches_reference() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn boundary_is_md5_hex() {
        let b = boundary();
        assert_eq!(b.len(), 32);
        assert!(b.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn mime_table() {
        assert_eq!(mime_type("PNG"), Some("image/png"));
        assert_eq!(mime_type("jpeg"), Some("image/jpeg"));
        assert_eq!(mime_type("unknown"), None);
    }

    #[test]
    fn unknown_provider() {
        let err = create_uploader("s3", "https://u.test", "t").err().unwrap();
        assert_eq!(err.to_string(), "File provider not supported: s3");
        assert!(create_uploader("uhz", "https://u.test", "t").is_ok());
    }

    #[test]
    fn upload_params_are_routed() {
        let mut extra = BTreeMap::new();
        extra.insert("app_id".to_owned(), json!("12"));
        extra.insert("type_id".to_owned(), json!(3));
        extra.insert("folder".to_owned(), json!("avatars"));
        let uploader = UhzUploader::new("https://u.test", "tok")
            .unwrap()
            .user_id(99)
            .set_upload_params(&extra);

        let params = uploader.params(b"123456789", "k.png");
        let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["token", "key", "crc32", "app_id", "file_type_id", "user_id", "folder"]
        );
        assert_eq!(params[2].1, "3421780262");
        assert_eq!(params[3].1, "12");
        assert_eq!(params[6].1, "avatars");
    }

    #[tokio::test]
    async fn uploads_multipart_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upload")
                .header("user-agent", "RESTAPI-SDK/0.2.0")
                .header_exists("content-type")
                .body_includes("name=\"token\"\r\n\r\nsecret-token")
                .body_includes("name=\"key\"\r\n\r\nphotos/a.png")
                .body_includes("Content-Type: image/png");
            then.status(200).json_body(json!({"url": "https://cdn.test/photos/a.png"}));
        });

        let uploader = create_uploader("uhz", &server.url("/upload"), "secret-token").unwrap();
        let result = uploader
            .upload(b"PNGDATA", Some("image/png"), "photos/a.png")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(result["url"], "https://cdn.test/photos/a.png");
    }

    #[tokio::test]
    async fn upload_local_file_detects_mime() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upload")
                .body_includes("Content-Type: text/csv")
                .body_includes("name=\"key\"\r\n\r\nreports/q1.csv")
                .body_includes("a,b\n1,2");
            then.status(200).json_body(json!({"ok": true}));
        });

        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"a,b\n1,2").unwrap();

        let uploader = UhzUploader::new(&server.url("/upload"), "tok").unwrap();
        let result = uploader
            .upload_local_file(file.path(), "reports/q1.csv")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let uploader = UhzUploader::new("https://u.test", "tok").unwrap();
        let err = uploader
            .upload_local_file(Path::new("/definitely/not/here.bin"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Io(_)));
    }
}
