#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client SDK for the RestAPI session, service and payment backends
//!
//! - [`ServiceClient`] and [`PayClient`] sign every request, pick the
//!   endpoint from the configuration or the region [`Router`], and turn
//!   answers into JSON values or typed [`SdkError`]s
//! - [`ClientConfig`] is loaded from YAML and `RESTAPI_*` variables with
//!   figment, or built in code
//! - [`create_uploader`] returns a multipart file [`Uploader`]
//!
//! # Example
//!
//! ```ignore
//! use restapi_sdk::{ClientConfig, ServiceClient};
//! use serde_json::json;
//!
//! let config = ClientConfig::load(Some("restapi.yaml".as_ref()))?;
//! let client = ServiceClient::new(config)?;
//! let user = client.get("/users/show", &json!({"id": 7})).await?;
//! ```

mod config;
mod dispatcher;
pub mod env;
mod error;
mod query;
mod region;
mod router;
mod secret;
pub mod signature;
mod storage;
mod uploader;
pub mod util;

pub use config::{
    ClientConfig, ClientConfigBuilder, ClientSettings, DEFAULT_API_VERSION, DEFAULT_TIMEOUT_SECS,
};
pub use dispatcher::{
    Dispatcher, PayClient, PayProfile, Profile, RequestOptions, ServiceClient, ServiceProfile,
};
pub use error::{BatchError, BatchRequestError, RestApiError, SdkError};
pub use query::build_query;
pub use region::Region;
pub use router::{
    PRIVATE_ZONE_ENV, REGION_ENV, ROUTE_TTL, RouteTable, Router, ServiceKind,
    private_zone_from_env,
};
pub use secret::SecretString;
pub use storage::{STORAGE_NAMESPACE, SessionStorage, Storage};
pub use uploader::{
    UhzUploader, UploadFile, Uploader, create_uploader, mime_type, multipart_encode,
};
