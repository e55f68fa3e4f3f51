//! Generation and randomness reports, serialized into `key_metadata`.

use crate::KeyProtocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of the statistical verification battery run against a candidate
/// key. Each check is pass/fail; `passed` is the conjunction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RandomnessReport {
    /// Normalized Shannon entropy of the byte histogram, `[0, 1]`.
    pub entropy_quality: f64,
    /// Fraction of one-bits stays within 10% of 0.5.
    pub frequency_balanced: bool,
    /// Bit run count stays within 10% of the expected `total_bits / 2`.
    pub runs_balanced: bool,
    /// Chi-square statistic of the byte histogram below threshold.
    pub chi_square_ok: bool,
    /// All checks passed.
    pub passed: bool,
}

/// Metadata describing one generated key.
///
/// Persisted as JSON alongside the key row; the raw material itself never
/// appears here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationReport {
    pub protocol: KeyProtocol,
    pub key_length: usize,
    /// Simulated channel bit-flip rate applied during the mixing pass.
    pub error_rate: f64,
    /// Normalized Shannon entropy of the final key bytes.
    pub entropy_quality: f64,
    pub generated_at: DateTime<Utc>,
    /// 1-based attempt number that produced this key.
    pub attempt: u32,
    /// False only when `generate_with_verification` exhausted its attempts
    /// without producing a key that passed the battery.
    pub verification_passed: bool,
    /// Battery results, present when verification was requested.
    pub randomness: Option<RandomnessReport>,
}
