// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provision marker: a per-VM record of the exact option set used for
//! the last successful provision.
//!
//! The format is line-oriented `key: value`. Parsing is tolerant (missing
//! boolean keys default to `false` and missing strings to `""`), but a
//! file with no recognizable lines at all parses as `None`, which callers
//! treat as an unparseable marker. Writing always rewrites the whole file;
//! there is no merge.

use std::io;
use std::path::Path;

use crate::fsio::atomic_write_text;

pub const SYNC_BACKEND_MUTAGEN: &str = "mutagen";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionMarker {
    pub vm_name: String,
    pub profile: String,
    pub playwright: bool,
    pub tailscale: bool,
    pub signal_cli: bool,
    pub signal_payload: bool,
    pub sync_backend: String,
    pub provisioned_at: String,
}

impl ProvisionMarker {
    /// Read a marker file. `None` when the file is missing, unreadable,
    /// or contains no `key: value` lines.
    pub fn from_file(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        let mut found_any = false;
        let mut get = MarkerFields::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            found_any = true;
            get.set(key.trim(), value.trim());
        }
        if !found_any {
            return None;
        }
        Some(Self {
            vm_name: get.vm_name,
            profile: get.profile,
            playwright: get.playwright,
            tailscale: get.tailscale,
            signal_cli: get.signal_cli,
            signal_payload: get.signal_payload,
            sync_backend: get.sync_backend,
            provisioned_at: get.provisioned_at,
        })
    }

    /// Full rewrite of the marker file (atomic).
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let content = format!(
            "vm_name: {}\nprofile: {}\nplaywright: {}\ntailscale: {}\nsignal_cli: {}\n\
             signal_payload: {}\nsync_backend: {}\nprovisioned_at: {}\n",
            self.vm_name,
            self.profile,
            bool_str(self.playwright),
            bool_str(self.tailscale),
            bool_str(self.signal_cli),
            bool_str(self.signal_payload),
            self.sync_backend,
            self.provisioned_at,
        );
        atomic_write_text(path, &content)
    }

    /// `profile/playwright/tailscale/signal_cli/signal_payload` summary
    /// used in mismatch errors and status output.
    pub fn flags_summary(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.profile,
            bool_str(self.playwright),
            bool_str(self.tailscale),
            bool_str(self.signal_cli),
            bool_str(self.signal_payload),
        )
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Default)]
struct MarkerFields {
    vm_name: String,
    profile: String,
    playwright: bool,
    tailscale: bool,
    signal_cli: bool,
    signal_payload: bool,
    sync_backend: String,
    provisioned_at: String,
}

impl MarkerFields {
    fn set(&mut self, key: &str, value: &str) {
        match key {
            "vm_name" => self.vm_name = value.to_string(),
            "profile" => self.profile = value.to_string(),
            "playwright" => self.playwright = value == "true",
            "tailscale" => self.tailscale = value == "true",
            "signal_cli" => self.signal_cli = value == "true",
            "signal_payload" => self.signal_payload = value == "true",
            "sync_backend" => self.sync_backend = value.to_string(),
            "provisioned_at" => self.provisioned_at = value.to_string(),
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "marker_tests.rs"]
mod tests;
