//! Run identifiers and scale set names.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{IdError, Ulid};

// =============================================================================
// Run
// =============================================================================

/// Identifier of one nodecheck invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(Ulid);

impl RunId {
    /// The prefix for run IDs.
    pub const PREFIX: &'static str = "run";

    /// Creates a new run ID with a fresh ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> Ulid {
        self.0
    }

    /// Parses a run ID in the format `run_{ulid}`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((prefix, ulid_str)) = s.split_once('_') else {
            return Err(IdError::MissingSeparator);
        };

        if prefix != Self::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        let ulid = ulid_str
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;

        Ok(Self(ulid))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Scale sets
// =============================================================================

/// Name of a transient scale set created for one scenario.
///
/// Node names in the cluster are derived from it (`{name}000000`), so the
/// health validator matches nodes by this prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VmssName(String);

impl VmssName {
    /// Fixed prefix of every generated name.
    pub const PREFIX: &'static str = "abtest";

    /// Number of random lowercase letters after the prefix.
    pub const SUFFIX_LEN: usize = 4;

    /// Generate a name from the given random source.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut name = String::with_capacity(Self::PREFIX.len() + Self::SUFFIX_LEN);
        name.push_str(Self::PREFIX);
        for _ in 0..Self::SUFFIX_LEN {
            name.push(rng.random_range(b'a'..=b'z') as char);
        }
        Self(name)
    }

    /// Validate an existing name.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some(suffix) = s.strip_prefix(Self::PREFIX) else {
            return Err(IdError::InvalidName {
                name: s.to_string(),
                reason: "missing abtest prefix",
            });
        };

        if suffix.len() != Self::SUFFIX_LEN {
            return Err(IdError::InvalidName {
                name: s.to_string(),
                reason: "suffix must be four characters",
            });
        }

        if !suffix.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(IdError::InvalidName {
                name: s.to_string(),
                reason: "suffix must be lowercase letters",
            });
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VmssName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VmssName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for VmssName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Hands out scale set names that are unique for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct NameRegistry {
    issued: Mutex<HashSet<VmssName>>,
}

impl NameRegistry {
    /// Attempts before giving up on finding an unused name.
    pub const MAX_ATTEMPTS: u32 = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a name not issued before by this registry.
    pub fn allocate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<VmssName, IdError> {
        let mut issued = self
            .issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for _ in 0..Self::MAX_ATTEMPTS {
            let name = VmssName::generate(rng);
            if issued.insert(name.clone()) {
                return Ok(name);
            }
        }

        Err(IdError::NamesExhausted {
            attempts: Self::MAX_ATTEMPTS,
        })
    }

    /// Number of names issued so far.
    pub fn issued_count(&self) -> usize {
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
