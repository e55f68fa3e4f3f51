//! Tagged ciphertext envelope.
//!
//! Ciphertext that leaves the process (persisted, mailed, handed to the
//! content store) carries an explicit encoding tag. The receiving side
//! decodes from the tag — deterministically — instead of the legacy
//! base64-then-raw-then-hex guessing, which turned malformed input into
//! silent garbage.

use crate::error::{CryptoError, CryptoResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Ciphertext plus its wire encoding.
///
/// Serializes as `{"encoding": "raw"|"base64"|"hex", "bytes": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "bytes", rename_all = "lowercase")]
pub enum CiphertextEnvelope {
    Raw(Vec<u8>),
    Base64(String),
    Hex(String),
}

impl CiphertextEnvelope {
    /// Wraps raw ciphertext bytes without re-encoding.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        CiphertextEnvelope::Raw(bytes.into())
    }

    /// Encodes ciphertext bytes as base64 (the transport-friendly default).
    pub fn base64(bytes: &[u8]) -> Self {
        CiphertextEnvelope::Base64(BASE64.encode(bytes))
    }

    /// Encodes ciphertext bytes as lowercase hex.
    pub fn hex(bytes: &[u8]) -> Self {
        CiphertextEnvelope::Hex(hex::encode(bytes))
    }

    /// The encoding tag as it appears on the wire.
    pub fn encoding_tag(&self) -> &'static str {
        match self {
            CiphertextEnvelope::Raw(_) => "raw",
            CiphertextEnvelope::Base64(_) => "base64",
            CiphertextEnvelope::Hex(_) => "hex",
        }
    }

    /// Decodes the payload to raw ciphertext bytes.
    ///
    /// Fails with [`CryptoError::MalformedEnvelope`] when the payload does
    /// not match its declared encoding. There is no fallback decoding.
    pub fn decode(&self) -> CryptoResult<Vec<u8>> {
        match self {
            CiphertextEnvelope::Raw(bytes) => Ok(bytes.clone()),
            CiphertextEnvelope::Base64(s) => BASE64
                .decode(s)
                .map_err(|e| CryptoError::MalformedEnvelope(format!("base64: {e}"))),
            CiphertextEnvelope::Hex(s) => hex::decode(s)
                .map_err(|e| CryptoError::MalformedEnvelope(format!("hex: {e}"))),
        }
    }
}
