use thiserror::Error;

/// Infrastructure failures only. "Not found", "expired" and "already used"
/// are normal outcomes ([`crate::FetchOutcome`], `Ok(false)` returns), not
/// errors — callers branch on them as control flow.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] qumail_crypto::CryptoError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("at-rest passphrase does not match the existing store")]
    InvalidPassphrase,
}

pub type StoreResult<T> = Result<T, StorageError>;
