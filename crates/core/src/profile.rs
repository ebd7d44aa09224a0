// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM profile variants.

use std::fmt;
use std::str::FromStr;

/// How a VM is configured: `standard` has no dev mounts and no file sync,
/// `developer` binds host source/payload directories into the guest and
/// requires the sync controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Standard,
    Developer,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Standard => "standard",
            Profile::Developer => "developer",
        }
    }

    pub fn is_developer(self) -> bool {
        matches!(self, Profile::Developer)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Profile::Standard),
            "developer" => Ok(Profile::Developer),
            other => Err(format!("unknown profile: '{other}'")),
        }
    }
}
