// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group-vars scalar lookup and VM naming.
//!
//! The deployment-wide base name comes from the ansible group-vars file
//! and must match `^[A-Za-z0-9][A-Za-z0-9-]*$`; anything else silently
//! falls back to the default so a corrupt config cannot produce VM names
//! the backend would reject.

use std::path::Path;

use crate::scalar::parse_scalar;

pub const DEFAULT_VM_BASE_NAME: &str = "clawbox";

/// The group-variables file, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct GroupVars {
    text: Option<String>,
}

impl GroupVars {
    /// Load from `<data_root>/ansible/group_vars/all.yml`. A missing or
    /// unreadable file behaves as an empty one.
    pub fn load(path: &Path) -> Self {
        Self { text: std::fs::read_to_string(path).ok() }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }

    pub fn empty() -> Self {
        Self { text: None }
    }

    /// Scalar value for `key`, or `default` when absent or empty.
    pub fn scalar(&self, key: &str, default: &str) -> String {
        let Some(text) = &self.text else {
            return default.to_string();
        };
        let value = parse_scalar(text, key);
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    }

    pub fn vm_base_name(&self) -> String {
        let value = self.scalar("vm_base_name", DEFAULT_VM_BASE_NAME);
        if is_valid_base_name(&value) {
            value
        } else {
            DEFAULT_VM_BASE_NAME.to_string()
        }
    }
}

fn is_valid_base_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

pub fn vm_name_for(base_name: &str, number: u32) -> String {
    format!("{base_name}-{number}")
}

/// Parse the `N` out of a `<base>-<N>` VM name. Returns `None` for names
/// outside the managed namespace or with a non-positive suffix.
pub fn parse_vm_suffix_number(vm_name: &str, base_name: &str) -> Option<u32> {
    let suffix = vm_name.strip_prefix(base_name)?.strip_prefix('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = suffix.parse().ok()?;
    if value < 1 {
        return None;
    }
    Some(value)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
