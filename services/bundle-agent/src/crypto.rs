//! Checksum formats used on the action wire.
//!
//! The algorithm is implied by the checksum text:
//! - `sha256:<hex>` / `sha512:<hex>`: prefixed digests, prefix in any case
//! - anything else: legacy unprefixed SHA-1 hex

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Sha1 => None,
            Self::Sha256 => Some("sha256"),
            Self::Sha512 => Some("sha512"),
        }
    }

    fn hex_digest(self, data: &[u8]) -> String {
        match self {
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

/// A checksum as supplied by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: DigestAlgorithm,
    raw: String,
}

impl Checksum {
    /// Parse a checksum. Never fails: unrecognized text is treated as SHA-1
    /// and will simply not match any payload.
    pub fn parse(raw: &str) -> Self {
        let algorithm = match raw.split_once(':') {
            Some((prefix, _)) if prefix.eq_ignore_ascii_case("sha256") => DigestAlgorithm::Sha256,
            Some((prefix, _)) if prefix.eq_ignore_ascii_case("sha512") => DigestAlgorithm::Sha512,
            _ => DigestAlgorithm::Sha1,
        };
        Self {
            algorithm,
            raw: raw.to_string(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Digest `data` with this checksum's algorithm, formatted the same way.
    pub fn compute(&self, data: &[u8]) -> String {
        let hex = self.algorithm.hex_digest(data);
        match self.algorithm.prefix() {
            Some(prefix) => format!("{prefix}:{hex}"),
            None => hex,
        }
    }

    /// Compare against a value produced by [`Checksum::compute`].
    /// Hex digits compare case-insensitively.
    pub fn matches(&self, computed: &str) -> bool {
        self.raw.eq_ignore_ascii_case(computed)
    }
}
