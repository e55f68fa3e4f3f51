//! QKD protocol tags.
//!
//! These label which noise-injection variant produced a key. They carry no
//! security meaning — the error rates below are flavor for the simulated
//! quantum channel, nothing more.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entropy-mixing variant applied to freshly drawn key material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyProtocol {
    /// Four-state polarization protocol (the default).
    #[serde(rename = "BB84")]
    Bb84,
    /// Two non-orthogonal states, lower efficiency.
    #[serde(rename = "B92")]
    B92,
    /// Photon-number-splitting-resistant BB84 variant.
    #[serde(rename = "SARG04")]
    Sarg04,
    /// Entangled-pair protocol, lowest simulated noise.
    #[serde(rename = "E91")]
    E91,
}

impl KeyProtocol {
    /// Simulated channel error-rate range for this protocol, as
    /// `(low, high)` bit-flip probabilities.
    pub(crate) fn error_rate_range(self) -> (f64, f64) {
        match self {
            KeyProtocol::Bb84 => (0.001, 0.01),
            KeyProtocol::B92 => (0.002, 0.015),
            KeyProtocol::Sarg04 => (0.001, 0.008),
            KeyProtocol::E91 => (0.0005, 0.005),
        }
    }

    /// Theoretical sifting efficiency of the protocol (reported, unused).
    pub fn efficiency(self) -> f64 {
        match self {
            KeyProtocol::Bb84 | KeyProtocol::E91 => 0.5,
            KeyProtocol::B92 | KeyProtocol::Sarg04 => 0.25,
        }
    }

    /// Canonical tag string as stored in the `protocol_tag` column.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyProtocol::Bb84 => "BB84",
            KeyProtocol::B92 => "B92",
            KeyProtocol::Sarg04 => "SARG04",
            KeyProtocol::E91 => "E91",
        }
    }
}

impl Default for KeyProtocol {
    fn default() -> Self {
        KeyProtocol::Bb84
    }
}

impl fmt::Display for KeyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyProtocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BB84" => Ok(KeyProtocol::Bb84),
            "B92" => Ok(KeyProtocol::B92),
            "SARG04" => Ok(KeyProtocol::Sarg04),
            "E91" => Ok(KeyProtocol::E91),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

/// Returned when parsing an unrecognized protocol tag.
#[derive(Debug, thiserror::Error)]
#[error("unknown quantum protocol tag: {0}")]
pub struct UnknownProtocol(pub String);
