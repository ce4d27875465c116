//! Short fingerprints of node configurations, logged per scenario so two
//! runs can be compared without diffing the whole tree.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// `sha256:` followed by the first 16 bytes of the digest, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigHash(String);

impl ConfigHash {
    pub fn of<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        // Going through `Value` sorts object keys, so map order never
        // changes the fingerprint.
        let bytes = serde_json::to_vec(&serde_json::to_value(value)?)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(format!("sha256:{}", hex::encode(&digest[..16]))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
