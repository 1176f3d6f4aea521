use crate::config::ClientConfig;
use crate::error::SdkError;
use crate::router::ServiceKind;
use crate::signature::{Cipher, SignaturePayload};

/// What differs between the backend families a [`Dispatcher`] talks to.
///
/// [`Dispatcher`]: super::Dispatcher
pub trait Profile: Send + Sync + 'static {
    /// Client version sent in `X-Rest-Client` and `User-Agent`
    const VERSION: &'static str;
    const KIND: ServiceKind;
    /// Default `Content-Type`, which also selects the body encoding
    const CONTENT_TYPE: &'static str;
    const SIGNATURE_HEADER: &'static str;

    /// Check the credentials this profile needs.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] naming the missing field.
    fn validate(config: &ClientConfig) -> Result<(), SdkError>;

    /// Headers added after the common defaults.
    fn extra_headers(_config: &ClientConfig) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Signature header value for one request.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Signature`] when encryption fails.
    fn sign(config: &ClientConfig, iv: &str) -> Result<String, SdkError>;

    /// Scheme of routed endpoints.
    fn scheme(_private_zone: bool) -> &'static str {
        "https"
    }
}

/// General service API: JSON bodies, AES-256 signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceProfile;

impl Profile for ServiceProfile {
    const VERSION: &'static str = "0.2.0";
    const KIND: ServiceKind = ServiceKind::Service;
    const CONTENT_TYPE: &'static str = "application/json;charset=utf-8";
    const SIGNATURE_HEADER: &'static str = "X-Rest-Signature";

    fn validate(_config: &ClientConfig) -> Result<(), SdkError> {
        // sys_id and secret_key are already enforced by the config builder
        Ok(())
    }

    fn sign(config: &ClientConfig, iv: &str) -> Result<String, SdkError> {
        SignaturePayload::service(config.sys_id(), config.api_version(), config.client_ip()).sign(
            Cipher::Aes256Cbc,
            config.secret_key(),
            iv,
        )
    }
}

/// Payment API: form bodies, per-application AES-128 signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayProfile;

impl Profile for PayProfile {
    const VERSION: &'static str = "1.0.5";
    const KIND: ServiceKind = ServiceKind::Pay;
    const CONTENT_TYPE: &'static str = "application/x-www-form-urlencoded;charset=utf-8";
    const SIGNATURE_HEADER: &'static str = "X-Client-Signature";

    fn validate(config: &ClientConfig) -> Result<(), SdkError> {
        if config.app_id().is_none_or(str::is_empty) {
            return Err(SdkError::Config("app_id is required for the pay client".to_owned()));
        }
        if config.app_secret().is_none_or(|s| s.is_empty()) {
            return Err(SdkError::Config(
                "app_secret is required for the pay client".to_owned(),
            ));
        }
        Ok(())
    }

    fn extra_headers(config: &ClientConfig) -> Vec<(String, String)> {
        [
            ("X-Client-Appid", config.app_id()),
            ("X-Client-Aprid", config.apr_id()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_owned(), v.to_owned())))
        .collect()
    }

    fn sign(config: &ClientConfig, iv: &str) -> Result<String, SdkError> {
        let secret = config.app_secret().ok_or_else(|| {
            SdkError::Config("app_secret is required for the pay client".to_owned())
        })?;
        SignaturePayload::pay(
            config.app_id().unwrap_or_default(),
            config.app_version(),
            config.api_version(),
        )
        .sign(Cipher::Aes128Cbc, secret, iv)
    }

    /// Private-zone payment hosts only listen on plain HTTP.
    fn scheme(private_zone: bool) -> &'static str {
        if private_zone { "http" } else { "https" }
    }
}
