//! Row types and tagged operation outcomes.

use chrono::{DateTime, Duration, Utc};
use qumail_entropy::KeyProtocol;
use std::fmt;
use std::str::FromStr;

/// Per-holder usage status. `Used` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Unused,
    Used,
    Expired,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Unused => "unused",
            KeyStatus::Used => "used",
            KeyStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unused" => Ok(KeyStatus::Unused),
            "used" => Ok(KeyStatus::Used),
            "expired" => Ok(KeyStatus::Expired),
            other => Err(format!("unknown key status: {other}")),
        }
    }
}

/// One holder's copy of a quantum key, with the material already decrypted.
///
/// The same `key_id` may exist under several holders (sender plus each
/// recipient); `(key_id, holder_id)` identifies this row.
#[derive(Clone, Debug)]
pub struct KeyRecord {
    pub key_id: String,
    pub holder_id: String,
    /// The other party in the original exchange, if any.
    pub counterpart_id: Option<String>,
    pub purpose: String,
    /// Raw key material (decrypted from at-rest storage).
    pub key_material: Vec<u8>,
    pub key_length: usize,
    /// SHA-256 hex digest of the raw material, for cross-party checks.
    pub fingerprint: String,
    pub protocol: KeyProtocol,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub usage_count: u64,
}

/// Outcome of a `fetch`. `Expired` is distinguished from `NotFound` for
/// observability; callers must treat both as "no material".
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Found(KeyRecord),
    NotFound,
    Expired,
}

impl FetchOutcome {
    pub fn found(self) -> Option<KeyRecord> {
        match self {
            FetchOutcome::Found(record) => Some(record),
            _ => None,
        }
    }
}

/// Aggregate row counts across the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub total_keys: u64,
    pub unused_keys: u64,
    pub used_keys: u64,
    pub expired_keys: u64,
    pub distinct_holders: u64,
}

/// Key store configuration. Defaults mirror the deployed service: 256-byte
/// keys bounded to 64..=4096, 24-hour TTL, BB84 tagging.
#[derive(Clone, Debug)]
pub struct KeyStoreConfig {
    /// Operator secret; the store-wide at-rest key is Argon2id-derived
    /// from it at open time.
    pub at_rest_passphrase: String,
    /// Time-to-live applied to every generated key.
    pub ttl: Duration,
    pub default_protocol: KeyProtocol,
    pub min_key_length: usize,
    pub max_key_length: usize,
    pub default_key_length: usize,
    /// Regeneration budget for the entropy verification battery.
    pub verification_attempts: u32,
}

impl KeyStoreConfig {
    pub fn new(at_rest_passphrase: impl Into<String>) -> Self {
        Self {
            at_rest_passphrase: at_rest_passphrase.into(),
            ttl: Duration::hours(24),
            default_protocol: KeyProtocol::Bb84,
            min_key_length: 64,
            max_key_length: 4096,
            default_key_length: 256,
            verification_attempts: 3,
        }
    }

    /// Rejects configurations that cannot produce a working store.
    pub fn validate(&self) -> Result<(), String> {
        if self.at_rest_passphrase.is_empty() {
            return Err("at-rest passphrase must not be empty".into());
        }
        if self.min_key_length == 0 {
            return Err("minimum key length must be at least 1".into());
        }
        if self.min_key_length > self.max_key_length {
            return Err(format!(
                "minimum key length {} exceeds maximum {}",
                self.min_key_length, self.max_key_length
            ));
        }
        if self.default_key_length < self.min_key_length
            || self.default_key_length > self.max_key_length
        {
            return Err(format!(
                "default key length {} outside {}..={}",
                self.default_key_length, self.min_key_length, self.max_key_length
            ));
        }
        Ok(())
    }
}
