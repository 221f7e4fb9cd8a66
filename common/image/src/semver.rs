// Licensed under the Apache-2.0 license

//! 16-byte version encoding used by the preamble's `semver`/`min_semver`
//! fields.

use core::fmt;

/// Encoded length of a [`SemVer`].
pub const SEMVER_LEN: usize = 16;

/// Version as the boot loader reads it: four little-endian u16 components,
/// then an optional commit id. `extra` is a free-form build counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SemVer {
    pub major: u16,
    pub minor: u16,
    pub rev: u16,
    pub extra: u16,
    pub commit: Option<u32>,
}

impl SemVer {
    pub fn new(major: u16, minor: u16, rev: u16) -> Self {
        SemVer {
            major,
            minor,
            rev,
            extra: 0,
            commit: None,
        }
    }

    pub fn to_bytes(&self) -> [u8; SEMVER_LEN] {
        let mut out = [0u8; SEMVER_LEN];
        out[0..2].copy_from_slice(&self.major.to_le_bytes());
        out[2..4].copy_from_slice(&self.minor.to_le_bytes());
        out[4..6].copy_from_slice(&self.rev.to_le_bytes());
        out[6..8].copy_from_slice(&self.extra.to_le_bytes());
        out[8..12].copy_from_slice(&self.commit.unwrap_or(0).to_le_bytes());
        out[12..16].copy_from_slice(&u32::from(self.commit.is_some()).to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; SEMVER_LEN]) -> Self {
        let word = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let commit = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let has_commit = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) != 0;
        SemVer {
            major: word(0),
            minor: word(2),
            rev: word(4),
            extra: word(6),
            commit: has_commit.then_some(commit),
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.rev)?;
        if self.extra != 0 {
            write!(f, "+{}", self.extra)?;
        }
        if let Some(commit) = self.commit {
            write!(f, " (g{commit:08x})")?;
        }
        Ok(())
    }
}
