//! Content digests (`algorithm:encoded`).
//!
//! Only sha256 is computed locally; other algorithms are carried through
//! verbatim but cannot be verified.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{EciError, Result};

/// The only algorithm we compute locally.
pub const SHA256: &str = "sha256";

/// A validated content digest such as `sha256:3b0c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse and validate a digest string.
    pub fn parse(s: &str) -> Result<Self> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| EciError::InvalidDigest(format!("missing algorithm in '{}'", s)))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        {
            return Err(EciError::InvalidDigest(format!(
                "invalid algorithm '{}'",
                algorithm
            )));
        }
        if encoded.is_empty() {
            return Err(EciError::InvalidDigest(format!("empty encoding in '{}'", s)));
        }
        if algorithm == SHA256
            && (encoded.len() != 64 || !encoded.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')))
        {
            return Err(EciError::InvalidDigest(format!(
                "sha256 digest must be 64 lowercase hex characters: '{}'",
                s
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// Compute the sha256 digest of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(data);
        digester.digest()
    }

    /// Algorithm part, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    /// Encoded part (hex for sha256).
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, e)| e).unwrap_or_default()
    }

    /// Short form used in progress output: the first 12 hex characters of a
    /// sha256 digest, the full string otherwise.
    pub fn short(&self) -> &str {
        if self.algorithm() == SHA256 {
            &self.encoded()[..12]
        } else {
            &self.0
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = EciError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = EciError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// Incremental sha256 over a byte stream.
#[derive(Clone, Default)]
pub struct Digester {
    hasher: Sha256,
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything fed so far. The digester can keep going.
    pub fn digest(&self) -> Digest {
        Digest(format!("{}:{}", SHA256, hex::encode(self.hasher.clone().finalize())))
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester").field("digest", &self.digest()).finish()
    }
}
