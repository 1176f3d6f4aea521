//! Request signatures.
//!
//! A signature is a short form-encoded query (ids, versions, timestamp and a
//! random salt) encrypted with AES-CBC/PKCS#7 and base64 encoded. The
//! backend decrypts it with the shared secret to authenticate the caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};

use crate::error::SdkError;
use crate::query::build_pairs;
use crate::secret::SecretString;
use crate::util::random_string;

const BLOCK_SIZE: usize = 16;
const SALT_LEN: usize = 10;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Block cipher used for a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes128Cbc,
    Aes256Cbc,
}

impl Cipher {
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc => 32,
        }
    }
}

/// Zero-pad or truncate `bytes` to `len`.
fn fit(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let n = bytes.len().min(len);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn padding_error() -> SdkError {
    SdkError::Signature("buffer too small for PKCS#7 padding".to_owned())
}

/// Encrypt `plaintext` and return the raw ciphertext.
///
/// Keys and IVs of the wrong length are zero-padded or truncated.
///
/// # Errors
///
/// Returns [`SdkError::Signature`] if the cipher rejects the input.
pub fn encrypt(
    cipher: Cipher,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SdkError> {
    let key = fit(key, cipher.key_len());
    let iv = fit(iv, BLOCK_SIZE);

    let len = plaintext.len();
    // PKCS#7 always adds between 1 and 16 bytes
    let mut buf = vec![0u8; len + BLOCK_SIZE - len % BLOCK_SIZE];
    buf[..len].copy_from_slice(plaintext);

    let written = match cipher {
        Cipher::Aes128Cbc => Aes128CbcEnc::new_from_slices(&key, &iv)
            .map_err(|e| SdkError::Signature(e.to_string()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, len)
            .map_err(|_| padding_error())?
            .len(),
        Cipher::Aes256Cbc => Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|e| SdkError::Signature(e.to_string()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, len)
            .map_err(|_| padding_error())?
            .len(),
    };
    buf.truncate(written);
    Ok(buf)
}

/// Encrypt a query string and base64 it.
///
/// # Errors
///
/// Returns [`SdkError::Signature`] if encryption fails.
pub fn seal(cipher: Cipher, key: &SecretString, iv: &str, query: &str) -> Result<String, SdkError> {
    let raw = encrypt(cipher, key.expose().as_bytes(), iv.as_bytes(), query.as_bytes())?;
    Ok(STANDARD.encode(raw))
}

/// Signature payload: ordered fields plus `_time` and `_salt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    fields: Vec<(&'static str, String)>,
}

impl SignaturePayload {
    /// Service payload: `sys_id`, `version` and `client_ip` (when set).
    #[must_use]
    pub fn service(sys_id: &str, api_version: &str, client_ip: Option<&str>) -> Self {
        let mut fields = vec![
            ("sys_id", sys_id.to_owned()),
            ("version", api_version.to_owned()),
        ];
        if let Some(ip) = client_ip.filter(|ip| !ip.is_empty()) {
            fields.push(("client_ip", ip.to_owned()));
        }
        Self { fields }
    }

    /// Pay payload: `app_id`, `app_version` and `api_version`.
    #[must_use]
    pub fn pay(app_id: &str, app_version: &str, api_version: &str) -> Self {
        Self {
            fields: vec![
                ("app_id", app_id.to_owned()),
                ("app_version", app_version.to_owned()),
                ("api_version", api_version.to_owned()),
            ],
        }
    }

    /// Query string stamped with `time` (Unix seconds) and `salt`.
    #[must_use]
    pub fn to_query(&self, time: i64, salt: &str) -> String {
        let time = time.to_string();
        build_pairs(
            self.fields
                .iter()
                .map(|(k, v)| (*k, v.as_str()))
                .chain([("_time", time.as_str()), ("_salt", salt)]),
        )
    }

    /// Stamp with the current time and a fresh salt, then seal.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Signature`] if encryption fails.
    pub fn sign(&self, cipher: Cipher, key: &SecretString, iv: &str) -> Result<String, SdkError> {
        let query = self.to_query(chrono::Utc::now().timestamp(), &random_string(SALT_LEN));
        seal(cipher, key, iv, &query)
    }
}
