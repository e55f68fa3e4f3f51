//! Cryptography for QuMail.
//!
//! Two distinct layers live here — they must not be confused:
//!
//! 1. **At-rest encryption** of stored key material: Argon2id derives a
//!    store-wide key from the operator passphrase, ChaCha20-Poly1305
//!    authenticates and encrypts each row's material. This layer *is*
//!    authenticated encryption.
//!
//! 2. **The OTP cipher engine** used for message bodies: byte-wise XOR
//!    against single-use key material. This layer provides confidentiality
//!    only — XOR cannot detect a wrong key or a tampered ciphertext, and
//!    once the key is shorter than the message the cyclic stretching
//!    policy forfeits the one-time-pad guarantee. Callers needing
//!    integrity must layer a MAC on top; this crate deliberately does not
//!    pretend to.
//!
//! Ciphertext travelling outside the process is wrapped in a tagged
//! [`CiphertextEnvelope`] so the receiving side decodes deterministically
//! instead of guessing at encodings.

mod cipher;
mod envelope;
mod error;
mod key;
mod otp;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::CiphertextEnvelope;
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
pub use otp::{
    otp_decrypt, otp_decrypt_strict, otp_decrypt_text, otp_encrypt, otp_encrypt_strict,
};
