use thiserror::Error;

/// Failures crossing the lifecycle boundary. Key unavailability (missing,
/// expired) is *not* here — it is a [`crate::DecryptOutcome`] variant with
/// its own user-facing remediation, while these are operational faults.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] qumail_keystore::StorageError),

    #[error(transparent)]
    Crypto(#[from] qumail_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("content store error: {0}")]
    Content(String),

    #[error("integrity stamping error: {0}")]
    Stamping(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
