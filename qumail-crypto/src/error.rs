use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, actual {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key material must not be empty")]
    EmptyKey,

    #[error("key shorter than data ({key_len} < {data_len} bytes) and stretching is disabled")]
    KeyTooShort { key_len: usize, data_len: usize },

    #[error("malformed ciphertext envelope: {0}")]
    MalformedEnvelope(String),

    #[error("decrypted bytes are not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
