//! Opaque collaborator seams: content storage and integrity stamping.
//!
//! The manager only needs "hand me bytes, get back a reference" and "stamp
//! this fingerprint, get back a reference". Real deployments plug in their
//! own backends; the in-memory implementations below serve tests and
//! single-process setups.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Collaborator failure, carried into `LifecycleError::{Content,Stamping}`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// Stores opaque ciphertext payloads and returns an addressable reference.
pub trait ContentStore {
    fn put(&self, key_id: &str, payload: &[u8]) -> Result<String, ServiceError>;
    fn get(&self, content_ref: &str) -> Result<Option<Vec<u8>>, ServiceError>;
}

/// Records a key fingerprint externally and returns a stamp reference.
pub trait IntegrityStamper {
    fn stamp(&self, key_id: &str, fingerprint: &str) -> Result<String, ServiceError>;
}

/// Content-addressed in-memory store. References are `mem://<sha256>`.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A writer panicking mid-insert leaves the map usable (content-addressed
    // entries are independent), so recover rather than poison every caller
    fn lock_payloads(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.payloads.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(&self, _key_id: &str, payload: &[u8]) -> Result<String, ServiceError> {
        let content_ref = format!("mem://{}", hex::encode(Sha256::digest(payload)));
        self.lock_payloads().insert(content_ref.clone(), payload.to_vec());
        Ok(content_ref)
    }

    fn get(&self, content_ref: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        Ok(self.lock_payloads().get(content_ref).cloned())
    }
}

/// Stamper that derives the reference from the fingerprint itself. Good
/// enough for verification flows that only need a stable, checkable ref.
#[derive(Debug, Default)]
pub struct HashStamper;

impl IntegrityStamper for HashStamper {
    fn stamp(&self, key_id: &str, fingerprint: &str) -> Result<String, ServiceError> {
        let digest = Sha256::digest(format!("{key_id}:{fingerprint}").as_bytes());
        Ok(format!("stamp://{}", hex::encode(digest)))
    }
}
