//! The OTP/XOR cipher engine.
//!
//! Byte-wise XOR of data against key material. With a key at least as long
//! as the data and never reused, this is a one-time pad. The legacy
//! stretching policy below cyclically repeats a short key to cover longer
//! data — at that point the one-time-pad guarantee is gone (repeated key
//! bytes leak structure across the message) and the cipher degrades to a
//! Vigenère-style XOR. The strict variants refuse to stretch instead.
//!
//! XOR cannot fail on a wrong key; decryption with the wrong material
//! "succeeds" and yields garbage. Integrity and authenticity must be
//! layered on top if needed.

use crate::error::{CryptoError, CryptoResult};

/// Encrypts `plaintext` by XOR against `key`, stretching or truncating the
/// key to the plaintext length (legacy policy).
pub fn otp_encrypt(plaintext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    xor_with_fitted_key(plaintext, key)
}

/// Decrypts `ciphertext` by XOR against `key`. Identical to [`otp_encrypt`]
/// — the fit-then-XOR policy must match on both sides for round-trips to
/// hold.
pub fn otp_decrypt(ciphertext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    xor_with_fitted_key(ciphertext, key)
}

/// Strict encrypt: fails with [`CryptoError::KeyTooShort`] rather than
/// stretch a short key.
pub fn otp_encrypt_strict(plaintext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    require_covering_key(plaintext, key)?;
    xor_with_fitted_key(plaintext, key)
}

/// Strict decrypt counterpart of [`otp_encrypt_strict`].
pub fn otp_decrypt_strict(ciphertext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    require_covering_key(ciphertext, key)?;
    xor_with_fitted_key(ciphertext, key)
}

/// Decrypts and UTF-8-decodes a text message.
///
/// A UTF-8 failure here is a distinct outcome from a cipher error: the XOR
/// itself cannot fail, so invalid UTF-8 usually means the wrong key — but
/// the engine cannot tell, and reports only the decoding failure.
pub fn otp_decrypt_text(ciphertext: &[u8], key: &[u8]) -> CryptoResult<String> {
    let bytes = xor_with_fitted_key(ciphertext, key)?;
    String::from_utf8(bytes).map_err(CryptoError::InvalidUtf8)
}

fn require_covering_key(data: &[u8], key: &[u8]) -> CryptoResult<()> {
    if key.len() < data.len() {
        return Err(CryptoError::KeyTooShort {
            key_len: key.len(),
            data_len: data.len(),
        });
    }
    Ok(())
}

/// XOR `data` against `key` cyclically. The cycle index handles both the
/// stretch case (short key repeats) and the truncate case (long key's tail
/// is simply never reached).
fn xor_with_fitted_key(data: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.is_empty() {
        return Err(CryptoError::EmptyKey);
    }

    Ok(data
        .iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect())
}
