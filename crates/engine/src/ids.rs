//! Caller fingerprints and generated asset ids.

use chrono::{DateTime, Utc};
use ledgerdoc_core::error::CoreError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256, Sha512};

/// Hash turning a caller certificate into an identity fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFunc {
    Sha512,
    Sha256,
}

impl IdFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_lowercase().as_str() {
            "sha512" => Ok(Self::Sha512),
            "sha256" => Ok(Self::Sha256),
            other => Err(CoreError::BadRequest(format!("unknown id function: {other}"))),
        }
    }

    /// Lower-case hex digest of `certificate`.
    pub fn fingerprint(&self, certificate: &[u8]) -> String {
        match self {
            Self::Sha512 => format!("{:x}", Sha512::digest(certificate)),
            Self::Sha256 => format!("{:x}", Sha256::digest(certificate)),
        }
    }
}

/// Version 4 style uuid derived from the transaction and a counter.
///
/// Every peer executing the same transaction generates the same ids in the
/// same order.
pub fn deterministic_uuid(tx_id: &str, timestamp: DateTime<Utc>, counter: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx_id.as_bytes());
    hasher.update(timestamp.timestamp().to_be_bytes());
    hasher.update(timestamp.timestamp_subsec_nanos().to_be_bytes());
    hasher.update(counter.to_be_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_be_bytes(seed));

    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}
