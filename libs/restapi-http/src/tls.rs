//! TLS setup for the raw transport.
//!
//! Native root certificates are loaded once per process and cached; the
//! Mozilla bundle from `webpki-roots` is compiled in.

use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};
use tokio_rustls::TlsConnector;

use crate::config::TlsRootConfig;
use crate::error::HttpError;

/// Cached native root certificates; empty means none were found.
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

/// Native root certificates, loaded lazily on first call.
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Crypto provider: the globally installed one if any, otherwise aws-lc-rs
/// without installing it globally.
#[must_use]
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_root_store() -> Result<RootCertStore, HttpError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(tls_error(
            "no native root CA certificates found in OS certificate store",
        ));
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(tls_error(format!(
            "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
            certs.len()
        )));
    }
    Ok(store)
}

fn webpki_root_store() -> RootCertStore {
    webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect()
}

/// Build a rustls client config for the given root strategy.
///
/// # Errors
///
/// Returns [`HttpError::Tls`] when native roots are requested but none can be
/// loaded, or when the provider rejects the default protocol versions.
pub fn client_config(roots: TlsRootConfig) -> Result<rustls::ClientConfig, HttpError> {
    let store = match roots {
        TlsRootConfig::WebPki => webpki_root_store(),
        TlsRootConfig::Native => native_root_store()?,
    };

    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(config)
}

/// TLS connector for the given root strategy.
///
/// # Errors
///
/// See [`client_config`].
pub fn connector(roots: TlsRootConfig) -> Result<TlsConnector, HttpError> {
    Ok(TlsConnector::from(Arc::new(client_config(roots)?)))
}

fn tls_error(message: impl Into<String>) -> HttpError {
    let message: String = message.into();
    HttpError::Tls(message.into())
}
