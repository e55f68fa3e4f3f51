//! The lifecycle manager: compose, share, open.

use crate::config::QumailConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::services::{ContentStore, IntegrityStamper};
use qumail_crypto::{otp_decrypt_text, otp_encrypt, CiphertextEnvelope};
use qumail_keystore::{FetchOutcome, KeyStore};
use std::path::Path;
use tracing::{info, warn};

/// Why a recipient could not get key material for a message.
///
/// Distinct from cipher errors: these mean "the key is gone", and the
/// remediation (ask the sender to re-send with a fresh key) differs from a
/// malformed envelope or an undecodable body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyUnavailability {
    /// No copy of this key exists for this holder.
    NotFound,
    /// The holder's copy existed but passed its expiry.
    Expired,
}

/// Outcome of opening a message. Key unavailability is an outcome, not an
/// error — the envelope may still be openable later if the key is reshared.
#[derive(Clone, Debug)]
pub enum DecryptOutcome {
    Message(String),
    KeyUnavailable(KeyUnavailability),
}

impl DecryptOutcome {
    pub fn message(self) -> Option<String> {
        match self {
            DecryptOutcome::Message(text) => Some(text),
            DecryptOutcome::KeyUnavailable(_) => None,
        }
    }
}

/// Whether the recipient's key copy was created during compose.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareStatus {
    Shared,
    /// The message is encrypted and the sender holds the key, but the
    /// recipient's copy could not be created. Recoverable via
    /// [`LifecycleManager::retry_share`].
    Degraded(String),
}

impl ShareStatus {
    pub fn is_shared(&self) -> bool {
        matches!(self, ShareStatus::Shared)
    }
}

/// An encrypted outbound message: which key opens it, the tagged
/// ciphertext, and whether the recipient can already fetch that key.
#[derive(Clone, Debug)]
pub struct ComposedMessage {
    pub key_id: String,
    pub envelope: CiphertextEnvelope,
    pub share_status: ShareStatus,
}

/// Orchestrates the key store and the OTP engine for the send/receive
/// flows. Collaborators are passed in explicitly; the manager owns no
/// global state.
#[derive(Clone)]
pub struct LifecycleManager {
    store: KeyStore,
}

impl LifecycleManager {
    pub fn new(store: KeyStore) -> Self {
        Self { store }
    }

    /// Validates the configuration and opens the backing store at `path`.
    pub fn open(path: &Path, config: &QumailConfig) -> LifecycleResult<Self> {
        config.validate()?;
        Ok(Self::new(KeyStore::open(path, config.store_config())?))
    }

    /// In-memory variant of [`LifecycleManager::open`] (for testing).
    pub fn open_in_memory(config: &QumailConfig) -> LifecycleResult<Self> {
        config.validate()?;
        Ok(Self::new(KeyStore::open_in_memory(config.store_config())?))
    }

    /// Direct access to the backing store for maintenance operations
    /// (`sweep_expired`, `statistics`, listings).
    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Encrypts `plaintext` under a fresh single-use key and shares that
    /// key with the recipient.
    ///
    /// A share failure does not fail the compose: the ciphertext and the
    /// sender's key copy both exist, so the result is `Degraded` and the
    /// share can be retried. The key length tracks the message length
    /// within configured bounds; a message longer than the maximum key
    /// falls back to cyclic stretching.
    pub fn compose(
        &self,
        owner: &str,
        recipient: &str,
        plaintext: &str,
    ) -> LifecycleResult<ComposedMessage> {
        let bounds = self.store.config();
        let key_length = plaintext
            .len()
            .clamp(bounds.min_key_length, bounds.max_key_length);

        let record = self
            .store
            .generate(owner, Some(recipient), "email-otp", Some(key_length))?;
        let ciphertext = otp_encrypt(plaintext.as_bytes(), &record.key_material)?;
        let envelope = CiphertextEnvelope::base64(&ciphertext);

        let share_status = match self.store.share(&record.key_id, owner, recipient) {
            Ok(true) => ShareStatus::Shared,
            Ok(false) => {
                warn!(key_id = record.key_id, recipient, "share refused during compose");
                ShareStatus::Degraded("key copy was not shareable".into())
            }
            Err(e) => {
                warn!(key_id = record.key_id, recipient, error = %e, "share failed during compose");
                ShareStatus::Degraded(e.to_string())
            }
        };

        // The sender's copy has done its one job; retire it from new use
        if let Err(e) = self.store.mark_used(&record.key_id, owner, recipient) {
            warn!(key_id = record.key_id, error = %e, "could not mark sender copy used");
        }

        info!(
            key_id = record.key_id,
            owner,
            recipient,
            shared = share_status.is_shared(),
            "composed message"
        );
        Ok(ComposedMessage {
            key_id: record.key_id,
            envelope,
            share_status,
        })
    }

    /// Retries the share leg of a degraded compose.
    pub fn retry_share(
        &self,
        key_id: &str,
        owner: &str,
        recipient: &str,
    ) -> LifecycleResult<ShareStatus> {
        if self.store.share(key_id, owner, recipient)? {
            Ok(ShareStatus::Shared)
        } else {
            Ok(ShareStatus::Degraded("key copy was not shareable".into()))
        }
    }

    /// Opens a received message with the holder's copy of the named key.
    ///
    /// A missing or expired key is a [`DecryptOutcome::KeyUnavailable`];
    /// a malformed envelope or a body that does not decode as UTF-8 is an
    /// error — those call for different remediation than a lost key.
    pub fn open_message(
        &self,
        key_id: &str,
        holder: &str,
        envelope: &CiphertextEnvelope,
    ) -> LifecycleResult<DecryptOutcome> {
        let record = match self.store.fetch(key_id, holder)? {
            FetchOutcome::Found(record) => record,
            FetchOutcome::NotFound => {
                return Ok(DecryptOutcome::KeyUnavailable(KeyUnavailability::NotFound))
            }
            FetchOutcome::Expired => {
                return Ok(DecryptOutcome::KeyUnavailable(KeyUnavailability::Expired))
            }
        };

        let ciphertext = envelope.decode()?;
        let text = otp_decrypt_text(&ciphertext, &record.key_material)?;
        Ok(DecryptOutcome::Message(text))
    }

    /// Hands the envelope's wire form to the content store and records the
    /// returned reference against the key.
    pub fn attach_content(
        &self,
        content_store: &dyn ContentStore,
        key_id: &str,
        envelope: &CiphertextEnvelope,
    ) -> LifecycleResult<String> {
        let payload = serde_json::to_vec(envelope)?;
        let content_ref = content_store
            .put(key_id, &payload)
            .map_err(|e| LifecycleError::Content(e.to_string()))?;
        self.store.record_content_ref(key_id, &content_ref)?;
        info!(key_id, content_ref, "attached content");
        Ok(content_ref)
    }

    /// Stamps the key's fingerprint with the integrity service and records
    /// the stamp reference. `Ok(None)` when no such key exists.
    pub fn stamp_key(
        &self,
        stamper: &dyn IntegrityStamper,
        key_id: &str,
        holder: &str,
    ) -> LifecycleResult<Option<String>> {
        let Some(fingerprint) = self.store.fingerprint(key_id, holder)? else {
            return Ok(None);
        };
        let stamp_ref = stamper
            .stamp(key_id, &fingerprint)
            .map_err(|e| LifecycleError::Stamping(e.to_string()))?;
        self.store.record_stamp_ref(key_id, &stamp_ref)?;
        info!(key_id, stamp_ref, "stamped key");
        Ok(Some(stamp_ref))
    }
}
