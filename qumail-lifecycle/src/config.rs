//! User-facing configuration, mapped onto the key store's settings.

use crate::error::{LifecycleError, LifecycleResult};
use chrono::Duration;
use qumail_entropy::KeyProtocol;
use qumail_keystore::KeyStoreConfig;

/// Top-level QuMail configuration.
///
/// Defaults mirror the deployed service: 256-byte keys bounded to 64..=4096,
/// 24-hour key TTL, BB84 protocol tagging, three verification attempts.
#[derive(Clone, Debug)]
pub struct QumailConfig {
    /// Operator secret the at-rest key is derived from.
    pub at_rest_passphrase: String,
    /// Time-to-live applied to every generated key.
    pub key_ttl: Duration,
    pub protocol: KeyProtocol,
    pub min_key_length: usize,
    pub max_key_length: usize,
    pub default_key_length: usize,
    pub verification_attempts: u32,
}

impl QumailConfig {
    pub fn new(at_rest_passphrase: impl Into<String>) -> Self {
        Self {
            at_rest_passphrase: at_rest_passphrase.into(),
            key_ttl: Duration::hours(24),
            protocol: KeyProtocol::Bb84,
            min_key_length: 64,
            max_key_length: 4096,
            default_key_length: 256,
            verification_attempts: 3,
        }
    }

    /// Rejects configurations the store or generator would choke on.
    /// Checked here so a bad config fails at startup, not mid-compose.
    pub fn validate(&self) -> LifecycleResult<()> {
        if self.key_ttl <= Duration::zero() {
            return Err(LifecycleError::Config("key TTL must be positive".into()));
        }
        self.store_config()
            .validate()
            .map_err(LifecycleError::Config)
    }

    /// The key store settings this configuration implies.
    pub fn store_config(&self) -> KeyStoreConfig {
        let mut config = KeyStoreConfig::new(self.at_rest_passphrase.clone());
        config.ttl = self.key_ttl;
        config.default_protocol = self.protocol;
        config.min_key_length = self.min_key_length;
        config.max_key_length = self.max_key_length;
        config.default_key_length = self.default_key_length;
        config.verification_attempts = self.verification_attempts;
        config
    }
}
