//! Hash algorithm selection and hex digests used to anonymize values.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Narrowest supported digest, used whenever a name is not recognized
    pub const FALLBACK: HashAlgorithm = HashAlgorithm::Sha1;

    /// Parse an algorithm name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Resolve the algorithm for a request.
    ///
    /// A recognized request-level name wins over the server default. An
    /// unrecognized or empty name on either side never fails: the lookup
    /// falls through to the default, then to [`HashAlgorithm::FALLBACK`].
    pub fn resolve(default: &str, requested: &str) -> Self {
        Self::parse(requested)
            .or_else(|| Self::parse(default))
            .unwrap_or(Self::FALLBACK)
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the lowercase hex digest in characters
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Lowercase hex digest of `input`
    pub fn hex_digest(self, input: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(input)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(input)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(input)),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
