//! Entropy key generation for QuMail.
//!
//! Produces raw symmetric key material from the OS CSPRNG, runs it through a
//! protocol-tagged mixing pass (a simulated QKD noise model — cosmetic, no
//! cryptographic meaning), and scores the result with a normalized Shannon
//! entropy measure plus a small battery of statistical checks.
//!
//! The generator never fails for quality reasons: a key that flunks the
//! verification battery is returned anyway with `verification_passed = false`
//! in its report, and the caller decides policy. The only error is a
//! length-validation rejection, raised before any randomness is drawn.

mod generator;
mod protocol;
mod report;

pub use generator::{verify_randomness, EntropyError, EntropyGenerator, EntropyResult};
pub use protocol::{KeyProtocol, UnknownProtocol};
pub use report::{GenerationReport, RandomnessReport};

/// Normalized Shannon entropy over the byte histogram, in `[0, 1]`.
///
/// 1.0 means every byte value is equally likely (8 bits of entropy per
/// byte). Short inputs can never reach 1.0 — a 4-byte key has at most
/// `log2(4) / 8 = 0.25` — so callers should treat this as a coarse health
/// check, not an absolute measure.
pub fn entropy_quality(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }

    let mut counts = [0usize; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }

    let total = bytes.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }

    (entropy / 8.0).min(1.0)
}
