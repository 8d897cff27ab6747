//! Public key exchange between the backend and requesters.
//!
//! The backend publishes its current public key so clients can pre-wrap
//! record keys for storage. Requesters register their own public key, which
//! the read flow uses to wrap the record key for transport.

use crate::error::{KeyError, KeyResult};
use crate::store::KeyStore;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use medvault_crypto::pem::{has_public_key_marker, parse_public_key};
use medvault_crypto::{
    public_key_fingerprint, wrap_key_with, CryptoResult, SymmetricKey, WrappedKey,
};
use medvault_policy::{AuditAction, AuditDecision, AuditEvent, AuditSink, Requester};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the requester's public key on read requests.
pub const PUBLIC_KEY_HEADER: &str = "x-public-key";

/// Header carrying a client-wrapped record key on pre-wrapped creates.
pub const WRAPPED_KEY_HEADER: &str = "x-encrypted-aes-key";

// ── RequesterPublicKey ──────────────────────────────────────────

/// A validated requester public key, used for one read operation.
#[derive(Clone)]
pub struct RequesterPublicKey {
    pem: String,
    key: RsaPublicKey,
    fingerprint: String,
}

impl RequesterPublicKey {
    /// Validates a PEM public key. Anything without a public-key marker, or
    /// with a marker but no parseable RSA key behind it, is rejected.
    pub fn parse(pem: &str) -> KeyResult<Self> {
        let pem = pem.trim();
        if !has_public_key_marker(pem) {
            return Err(KeyError::InvalidPublicKeyFormat);
        }
        let key = parse_public_key(pem).map_err(|_| KeyError::InvalidPublicKeyFormat)?;
        let fingerprint = public_key_fingerprint(&key)?;
        Ok(Self {
            pem: pem.to_string(),
            key,
            fingerprint,
        })
    }

    /// Decodes the `x-public-key` header value.
    ///
    /// Accepts a raw PEM, a PEM whose newlines arrive as literal `\n`
    /// sequences, or a base64 encoding of the PEM.
    pub fn from_header(value: &str) -> KeyResult<Self> {
        let value = value.trim();
        if value.contains("-----BEGIN") {
            return Self::parse(&value.replace("\\n", "\n"));
        }
        let decoded = STANDARD
            .decode(value)
            .map_err(|_| KeyError::InvalidPublicKeyFormat)?;
        let pem = String::from_utf8(decoded).map_err(|_| KeyError::InvalidPublicKeyFormat)?;
        Self::parse(&pem)
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Wraps a record key for transport to this requester.
    pub fn wrap(&self, key: &SymmetricKey) -> CryptoResult<WrappedKey> {
        wrap_key_with(key, &self.key)
    }
}

impl fmt::Debug for RequesterPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequesterPublicKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

// ── Endpoint bodies ─────────────────────────────────────────────

/// Body of the backend public key response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// Body of a requester key registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterKeyResponse {
    pub message: String,
}

impl RegisterKeyResponse {
    pub fn accepted() -> Self {
        Self {
            message: "Frontend public key saved successfully".to_string(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            message: "Invalid public key format".to_string(),
        }
    }
}

// ── KeyExchange ─────────────────────────────────────────────────

/// Serves the backend public key and validates requester keys.
pub struct KeyExchange {
    store: Arc<KeyStore>,
    audit: Arc<dyn AuditSink>,
}

impl KeyExchange {
    pub fn new(store: Arc<KeyStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// PEM of the backend's current public key.
    pub fn backend_public_key(&self) -> String {
        self.store.public_key_pem()
    }

    pub fn public_key_response(&self) -> PublicKeyResponse {
        PublicKeyResponse {
            public_key: self.backend_public_key(),
        }
    }

    /// Validates a requester public key.
    pub fn register_requester_key(&self, pem: &str) -> KeyResult<RequesterPublicKey> {
        let key = RequesterPublicKey::parse(pem)?;
        debug!(fingerprint = key.fingerprint(), "validated requester public key");
        Ok(key)
    }

    /// Handles a registration request from an authenticated requester and
    /// records the outcome in the audit log.
    pub async fn register(
        &self,
        requester: &Requester,
        request: &RegisterKeyRequest,
    ) -> KeyResult<(RequesterPublicKey, RegisterKeyResponse)> {
        match self.register_requester_key(&request.public_key) {
            Ok(key) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditAction::KeyRegister, AuditDecision::Allowed)
                            .with_actor(requester)
                            .with_details(format!("fingerprint {}", key.fingerprint())),
                    )
                    .await;
                Ok((key, RegisterKeyResponse::accepted()))
            }
            Err(e) => {
                warn!(requester = %requester.id, "rejected requester public key: {e}");
                self.audit
                    .record(
                        AuditEvent::new(AuditAction::KeyRegister, AuditDecision::Denied)
                            .with_actor(requester)
                            .with_details(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }
}
