//! Client configuration.
//!
//! [`ClientSettings`] is the raw, layered input (defaults, YAML file,
//! `RESTAPI_*` environment). [`ClientConfig`] is the validated value a
//! client holds for its whole life.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Deserializer};

use crate::env;
use crate::error::SdkError;
use crate::region::Region;
use crate::router::private_zone_from_env;
use crate::secret::SecretString;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default API version appended to the endpoint.
pub const DEFAULT_API_VERSION: &str = "1.0";

/// Layered settings as read from file and environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    #[serde(deserialize_with = "lossy_string")]
    pub sys_id: Option<String>,
    #[serde(deserialize_with = "lossy_secret")]
    pub secret_key: Option<SecretString>,
    pub region: Option<Region>,
    #[serde(deserialize_with = "lossy_string")]
    pub server_url: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    pub api_server: Option<String>,
    /// `"production"` turns on production mode
    #[serde(deserialize_with = "lossy_string")]
    pub env: Option<String>,
    pub timeout_secs: u64,
    #[serde(deserialize_with = "lossy_string")]
    pub client_ip: Option<String>,
    #[serde(deserialize_with = "lossy_secret")]
    pub access_token: Option<SecretString>,
    pub debug: bool,
    /// Overrides `DEPLOY_IS_VPC_ZONE` when set
    pub private_zone: Option<bool>,
    #[serde(deserialize_with = "lossy_string")]
    pub app_id: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    pub apr_id: Option<String>,
    #[serde(deserialize_with = "lossy_secret")]
    pub app_secret: Option<SecretString>,
    #[serde(deserialize_with = "lossy_string")]
    pub app_version: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    pub api_version: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            sys_id: None,
            secret_key: None,
            region: None,
            server_url: None,
            api_server: None,
            env: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client_ip: None,
            access_token: None,
            debug: false,
            private_zone: None,
            app_id: None,
            apr_id: None,
            app_secret: None,
            app_version: None,
            api_version: None,
        }
    }
}

impl ClientSettings {
    /// Figment with defaults, the optional YAML file and
    /// `[ENV_PREFIX]RESTAPI_*` variables, in increasing priority.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(&format!("{}RESTAPI_", env::prefix())))
    }

    /// Load settings from all layers.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when a layer holds a value of the wrong
    /// type.
    pub fn load(path: Option<&Path>) -> Result<Self, SdkError> {
        Self::figment(path)
            .extract()
            .map_err(|e| SdkError::Config(e.to_string()))
    }
}

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    sys_id: String,
    secret_key: SecretString,
    region: Region,
    server_url: Option<String>,
    api_server: Option<String>,
    production: bool,
    timeout: Duration,
    client_ip: Option<String>,
    access_token: Option<SecretString>,
    debug: bool,
    private_zone: bool,
    app_id: Option<String>,
    apr_id: Option<String>,
    app_secret: Option<SecretString>,
    app_version: String,
    api_version: String,
}

impl ClientConfig {
    #[must_use]
    pub fn builder(
        sys_id: impl Into<String>,
        secret_key: impl Into<SecretString>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(sys_id, secret_key)
    }

    /// Validate loaded settings.
    ///
    /// When `private_zone` is not set, `DEPLOY_IS_VPC_ZONE` decides.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `sys_id` or `secret_key` is missing.
    pub fn from_settings(settings: ClientSettings) -> Result<Self, SdkError> {
        let mut builder = ClientConfigBuilder::new(
            settings.sys_id.unwrap_or_default(),
            settings.secret_key.unwrap_or_else(|| SecretString::new("")),
        )
        .production(settings.env.as_deref() == Some("production"))
        .timeout(Duration::from_secs(settings.timeout_secs))
        .debug(settings.debug)
        .private_zone(settings.private_zone.unwrap_or_else(private_zone_from_env));

        if let Some(region) = settings.region {
            builder = builder.region(region);
        }
        builder.config.server_url = settings.server_url;
        builder.config.api_server = settings.api_server;
        builder.config.client_ip = settings.client_ip;
        builder.config.access_token = settings.access_token;
        builder.config.app_id = settings.app_id;
        builder.config.apr_id = settings.apr_id;
        builder.config.app_secret = settings.app_secret;
        if let Some(v) = settings.app_version {
            builder = builder.app_version(v);
        }
        if let Some(v) = settings.api_version {
            builder = builder.api_version(v);
        }
        builder.build()
    }

    /// Load from file and environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, SdkError> {
        Self::from_settings(ClientSettings::load(path)?)
    }

    #[must_use]
    pub fn sys_id(&self) -> &str {
        &self.sys_id
    }

    #[must_use]
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    #[must_use]
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    #[must_use]
    pub fn api_server(&self) -> Option<&str> {
        self.api_server.as_deref()
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.production
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn private_zone(&self) -> bool {
        self.private_zone
    }

    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    #[must_use]
    pub fn apr_id(&self) -> Option<&str> {
        self.apr_id.as_deref()
    }

    #[must_use]
    pub fn app_secret(&self) -> Option<&SecretString> {
        self.app_secret.as_ref()
    }

    #[must_use]
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(sys_id: impl Into<String>, secret_key: impl Into<SecretString>) -> Self {
        Self {
            config: ClientConfig {
                sys_id: sys_id.into(),
                secret_key: secret_key.into(),
                region: Region::default(),
                server_url: None,
                api_server: None,
                production: false,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                client_ip: None,
                access_token: None,
                debug: false,
                private_zone: false,
                app_id: None,
                apr_id: None,
                app_secret: None,
                app_version: String::new(),
                api_version: DEFAULT_API_VERSION.to_owned(),
            },
        }
    }

    #[must_use]
    pub fn region(mut self, region: Region) -> Self {
        self.config.region = region;
        self
    }

    /// Explicit server URL; takes precedence over routing.
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = Some(url.into());
        self
    }

    /// Endpoint override, below `server_url` and above routing.
    #[must_use]
    pub fn api_server(mut self, server: impl Into<String>) -> Self {
        self.config.api_server = Some(server.into());
        self
    }

    #[must_use]
    pub fn production(mut self, production: bool) -> Self {
        self.config.production = production;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.config.client_ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn access_token(mut self, token: impl Into<SecretString>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn private_zone(mut self, private_zone: bool) -> Self {
        self.config.private_zone = private_zone;
        self
    }

    /// Application credentials of the pay client.
    #[must_use]
    pub fn app(mut self, app_id: impl Into<String>, app_secret: impl Into<SecretString>) -> Self {
        self.config.app_id = Some(app_id.into());
        self.config.app_secret = Some(app_secret.into());
        self
    }

    #[must_use]
    pub fn apr_id(mut self, apr_id: impl Into<String>) -> Self {
        self.config.apr_id = Some(apr_id.into());
        self
    }

    #[must_use]
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.config.app_version = version.into();
        self
    }

    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `sys_id` or `secret_key` is empty,
    /// or the timeout is zero.
    pub fn build(self) -> Result<ClientConfig, SdkError> {
        let config = self.config;
        if config.sys_id.trim().is_empty() {
            return Err(SdkError::Config("sys_id is required".to_owned()));
        }
        if config.secret_key.is_empty() {
            return Err(SdkError::Config("secret_key is required".to_owned()));
        }
        if config.timeout.is_zero() {
            return Err(SdkError::Config("timeout must be greater than zero".to_owned()));
        }
        Ok(config)
    }
}

/// Strings that may arrive as numbers or booleans from env or YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lossy {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl Lossy {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(n) => n.to_string(),
            Self::Uint(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

fn lossy_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Lossy>::deserialize(deserializer)?
        .map(Lossy::into_string)
        .filter(|s| !s.is_empty()))
}

fn lossy_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    Ok(lossy_string(deserializer)?.map(SecretString::from))
}
