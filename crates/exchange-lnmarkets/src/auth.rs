//! HMAC-SHA256 request signing for the LN Markets API.
//!
//! The signature covers `timestamp + METHOD + path + data`, where `data` is
//! `?query` for GET/DELETE requests with a query string, the JSON body for
//! POST/PUT requests and empty otherwise. The path is the full request path
//! including the API version prefix. The result is base64 encoded with the
//! standard alphabet.
//!
//! # Security
//!
//! - Secrets are held as `SecretString` and never logged
//! - The key id is zeroized on drop

use crate::error::{LnMarketsError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use risk_guard_core::Credentials;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key id.
pub const HEADER_KEY: &str = "ACCESS-KEY";
/// Header carrying the base64 signature.
pub const HEADER_SIGNATURE: &str = "ACCESS-SIGNATURE";
/// Header carrying the passphrase.
pub const HEADER_PASSPHRASE: &str = "ACCESS-PASSPHRASE";
/// Header carrying the millisecond timestamp.
pub const HEADER_TIMESTAMP: &str = "ACCESS-TIMESTAMP";

// =============================================================================
// Signed Headers
// =============================================================================

/// Headers required for authenticated LN Markets requests.
#[derive(Clone)]
pub struct SignedHeaders {
    /// ACCESS-KEY header.
    pub access_key: String,

    /// ACCESS-SIGNATURE header (base64 encoded).
    pub signature: String,

    /// ACCESS-PASSPHRASE header.
    pub passphrase: SecretString,

    /// ACCESS-TIMESTAMP header (Unix timestamp in milliseconds).
    pub timestamp: String,
}

impl SignedHeaders {
    /// Returns headers as tuples for reqwest.
    #[must_use]
    pub fn as_tuples(&self) -> [(&'static str, &str); 4] {
        [
            (HEADER_KEY, &self.access_key),
            (HEADER_SIGNATURE, &self.signature),
            (HEADER_PASSPHRASE, self.passphrase.expose_secret()),
            (HEADER_TIMESTAMP, &self.timestamp),
        ]
    }
}

impl std::fmt::Debug for SignedHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedHeaders")
            .field("access_key", &self.access_key)
            .field("signature", &self.signature)
            .field("passphrase", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

// =============================================================================
// LnMarketsSigner
// =============================================================================

/// Builds the authentication headers for every exchange call.
pub struct LnMarketsSigner {
    api_key: String,
    api_secret: SecretString,
    passphrase: SecretString,
}

impl std::fmt::Debug for LnMarketsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LnMarketsSigner")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

impl Drop for LnMarketsSigner {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl LnMarketsSigner {
    /// Creates a signer from raw key material.
    ///
    /// # Errors
    /// Returns error if the key id or secret is empty.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: SecretString,
        passphrase: SecretString,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LnMarketsError::Configuration("api key is empty".to_string()));
        }
        if api_secret.expose_secret().is_empty() {
            return Err(LnMarketsError::Configuration("api secret is empty".to_string()));
        }

        Ok(Self {
            api_key,
            api_secret,
            passphrase,
        })
    }

    /// Creates a signer from a user's credential set.
    ///
    /// # Errors
    /// Returns error if the key id or secret is empty.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        Self::new(
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
            credentials.passphrase.clone(),
        )
    }

    /// Returns the API key id.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Signs a request using the current time.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, PUT, DELETE)
    /// * `path` - Full request path including the version prefix
    /// * `query` - Encoded query string without the leading `?`
    /// * `body` - JSON body as sent on the wire
    ///
    /// # Errors
    /// Returns error if the system clock is before the Unix epoch or signing fails.
    pub fn sign(&self, method: &str, path: &str, query: &str, body: &str) -> Result<SignedHeaders> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| LnMarketsError::Signing(format!("system time error: {e}")))?
            .as_millis();

        self.sign_with_timestamp(method, path, query, body, timestamp_ms)
    }

    /// Signs a request with a caller-supplied millisecond timestamp.
    ///
    /// # Errors
    /// Returns error if the HMAC cannot be initialized.
    pub fn sign_with_timestamp(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
        timestamp_ms: u128,
    ) -> Result<SignedHeaders> {
        let timestamp = timestamp_ms.to_string();
        let message = signing_payload(&timestamp, method, path, query, body);

        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| LnMarketsError::Signing(format!("invalid key length: {e}")))?;
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        Ok(SignedHeaders {
            access_key: self.api_key.clone(),
            signature,
            passphrase: self.passphrase.clone(),
            timestamp,
        })
    }
}

/// Builds the exact string covered by the signature.
#[must_use]
pub fn signing_payload(timestamp: &str, method: &str, path: &str, query: &str, body: &str) -> String {
    let method = method.to_ascii_uppercase();
    let data = match method.as_str() {
        "GET" | "DELETE" if !query.is_empty() => format!("?{query}"),
        "POST" | "PUT" => body.to_string(),
        _ => String::new(),
    };

    format!("{timestamp}{method}{path}{data}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_guard_core::Network;

    fn signer() -> LnMarketsSigner {
        LnMarketsSigner::new(
            "key-id",
            SecretString::from("test-secret".to_string()),
            SecretString::from("open-sesame".to_string()),
        )
        .unwrap()
    }

    // ==================== Payload Tests ====================

    #[test]
    fn test_payload_get_with_query() {
        let payload = signing_payload("1700000000000", "get", "/v2/futures", "type=running", "");
        assert_eq!(payload, "1700000000000GET/v2/futures?type=running");
    }

    #[test]
    fn test_payload_get_without_query() {
        let payload = signing_payload("1700000000000", "GET", "/v2/user", "", "");
        assert_eq!(payload, "1700000000000GET/v2/user");
    }

    #[test]
    fn test_payload_post_includes_body_not_query() {
        let payload = signing_payload(
            "1700000000000",
            "POST",
            "/v2/futures/add-margin",
            "ignored=1",
            r#"{"id":"abc","amount":20000}"#,
        );
        assert_eq!(
            payload,
            r#"1700000000000POST/v2/futures/add-margin{"id":"abc","amount":20000}"#
        );
    }

    #[test]
    fn test_payload_delete_with_query() {
        let payload = signing_payload("1", "DELETE", "/v2/futures", "id=abc", "");
        assert_eq!(payload, "1DELETE/v2/futures?id=abc");
    }

    // ==================== Signature Tests ====================

    #[test]
    fn test_signature_is_deterministic() {
        let signer = signer();
        let a = signer
            .sign_with_timestamp("GET", "/v2/futures", "type=running", "", 1_700_000_000_000)
            .unwrap();
        let b = signer
            .sign_with_timestamp("GET", "/v2/futures", "type=running", "", 1_700_000_000_000)
            .unwrap();
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.timestamp, "1700000000000");
    }

    #[test]
    fn test_timestamp_changes_signature() {
        let signer = signer();
        let a = signer
            .sign_with_timestamp("GET", "/v2/user", "", "", 1_700_000_000_000)
            .unwrap();
        let b = signer
            .sign_with_timestamp("GET", "/v2/user", "", "", 1_700_000_000_001)
            .unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_body_matters_for_post_only() {
        let signer = signer();
        let post_a = signer
            .sign_with_timestamp("POST", "/v2/futures/cash-in", "", r#"{"amount":1}"#, 1)
            .unwrap();
        let post_b = signer
            .sign_with_timestamp("POST", "/v2/futures/cash-in", "", r#"{"amount":2}"#, 1)
            .unwrap();
        assert_ne!(post_a.signature, post_b.signature);

        let get_a = signer
            .sign_with_timestamp("GET", "/v2/user", "", r#"{"amount":1}"#, 1)
            .unwrap();
        let get_b = signer
            .sign_with_timestamp("GET", "/v2/user", "", r#"{"amount":2}"#, 1)
            .unwrap();
        assert_eq!(get_a.signature, get_b.signature);
    }

    #[test]
    fn test_signature_matches_reference_hmac() {
        let headers = signer()
            .sign_with_timestamp("GET", "/v2/user", "", "", 1_700_000_000_000)
            .unwrap();

        let mut mac = HmacSha256::new_from_slice(b"test-secret").unwrap();
        mac.update(b"1700000000000GET/v2/user");
        let expected = BASE64.encode(mac.finalize().into_bytes());

        assert_eq!(headers.signature, expected);
        // 32-byte digest in standard base64
        assert_eq!(headers.signature.len(), 44);
    }

    // ==================== Header Tests ====================

    #[test]
    fn test_header_names() {
        let headers = signer().sign("GET", "/v2/user", "", "").unwrap();
        let names: Vec<_> = headers.as_tuples().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "ACCESS-KEY",
                "ACCESS-SIGNATURE",
                "ACCESS-PASSPHRASE",
                "ACCESS-TIMESTAMP"
            ]
        );
        assert_eq!(headers.as_tuples()[2].1, "open-sesame");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let signer = signer();
        let debug = format!("{signer:?}");
        assert!(!debug.contains("test-secret"));
        assert!(!debug.contains("open-sesame"));

        let headers = signer.sign("GET", "/v2/user", "", "").unwrap();
        assert!(!format!("{headers:?}").contains("open-sesame"));
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = LnMarketsSigner::new(
            "",
            SecretString::from("secret".to_string()),
            SecretString::from("pass".to_string()),
        );
        assert!(matches!(result, Err(LnMarketsError::Configuration(_))));
    }

    #[test]
    fn test_from_credentials() {
        let credentials = Credentials::new("key-id", "test-secret", "open-sesame", Network::Testnet);
        let signer = LnMarketsSigner::from_credentials(&credentials).unwrap();
        assert_eq!(signer.api_key(), "key-id");
    }
}
