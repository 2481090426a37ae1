//! Migration Versions - Ordering identifiers for migrations
//!
//! A [`Version`] is a `major.minor.revision` triple compared component by
//! component. The ledger never stores versions in their display form: it goes
//! through a [`VersionCodec`], whose encoded strings must sort exactly the way
//! the versions themselves do.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult, MigrationError};

/// Ordered identifier of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    revision: u32,
}

impl Version {
    /// Create a version from its three components
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// The version following this one in the revision component, if the
    /// revision has room left
    pub fn next_revision(&self) -> Option<Self> {
        self.revision
            .checked_add(1)
            .map(|revision| Self::new(self.major, self.minor, revision))
    }
}

impl From<u32> for Version {
    fn from(major: u32) -> Self {
        Self::new(major, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}.{}.{}", self.major, self.minor, self.revision))
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| MigrationError::InvalidVersion {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("version is empty"));
        }

        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("expected at most three components (major.minor.revision)"));
        }

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("components must be unsigned integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("component does not fit in 32 bits"))?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Converts versions to and from the representation stored in a ledger
///
/// Implementations must preserve ordering: for any two versions `a < b`,
/// `encode(a) < encode(b)` under plain string comparison. Ledgers hand the
/// codec in at construction time.
pub trait VersionCodec: Send + Sync {
    fn encode(&self, version: &Version) -> String;

    fn decode(&self, raw: &str) -> LedgerResult<Version>;
}

/// Width of one zero-padded component; `u32::MAX` has ten digits.
const COMPONENT_WIDTH: usize = 10;

/// Default codec: every component zero-padded to ten digits
///
/// `1.10.0` encodes as `0000000001.0000000010.0000000000`, which sorts after
/// the encoding of `1.2.0` where the display forms would not.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaddedVersionCodec;

impl VersionCodec for PaddedVersionCodec {
    fn encode(&self, version: &Version) -> String {
        format!(
            "{:0width$}.{:0width$}.{:0width$}",
            version.major,
            version.minor,
            version.revision,
            width = COMPONENT_WIDTH
        )
    }

    fn decode(&self, raw: &str) -> LedgerResult<Version> {
        raw.parse().map_err(|e: MigrationError| LedgerError::Decode {
            raw: raw.to_string(),
            message: e.to_string(),
        })
    }
}
