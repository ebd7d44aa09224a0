// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of the data root, state directory, and secrets file.
//!
//! The data root must carry the provisioning playbook and the packer
//! template; candidates that lack either are skipped. When Clawbox runs
//! out of a writable checkout, state and secrets stay repo-local so test
//! runs and development never touch `~/.clawbox`.

use std::env;
use std::path::{Path, PathBuf};

pub const DATA_ROOT_ENV: &str = "CLAWBOX_DATA_DIR";
pub const STATE_DIR_ENV: &str = "CLAWBOX_STATE_DIR";
pub const SECRETS_FILE_ENV: &str = "CLAWBOX_SECRETS_FILE";

/// Expand a leading `~` to the home directory.
pub fn expand_user(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(raw)
}

fn has_required_project_files(root: &Path) -> bool {
    root.join("ansible").join("playbooks").join("provision.yml").exists()
        && root.join("packer").join("macos-base.pkr.hcl").exists()
}

/// Locate the directory holding the ansible and packer project data.
///
/// Candidates, in order: the `CLAWBOX_DATA_DIR` override, the current
/// working directory (a development checkout), and `share/clawbox` next
/// to the installed binary's prefix. Falls back to the working directory
/// so later lookups produce actionable "file not found" errors.
pub fn resolve_data_root() -> PathBuf {
    if let Ok(env_root) = env::var(DATA_ROOT_ENV) {
        if !env_root.is_empty() {
            let candidate = expand_user(&env_root);
            if has_required_project_files(&candidate) {
                return candidate;
            }
        }
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if has_required_project_files(&cwd) {
        return cwd;
    }

    if let Ok(exe) = env::current_exe() {
        if let Some(prefix) = exe.parent().and_then(Path::parent) {
            let candidate = prefix.join("share").join("clawbox");
            if has_required_project_files(&candidate) {
                return candidate;
            }
        }
    }

    cwd
}

fn prefer_repo_local_paths(data_root: &Path) -> bool {
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(_) => return false,
    };
    if data_root != cwd || !has_required_project_files(data_root) {
        return false;
    }
    !data_root.metadata().map(|m| m.permissions().readonly()).unwrap_or(true)
}

pub fn default_state_dir(data_root: &Path) -> PathBuf {
    if let Ok(override_dir) = env::var(STATE_DIR_ENV) {
        if !override_dir.is_empty() {
            return expand_user(&override_dir);
        }
    }
    if prefer_repo_local_paths(data_root) {
        return data_root.join(".clawbox").join("state");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".clawbox").join("state")
}

pub fn default_secrets_file(data_root: &Path) -> PathBuf {
    if let Ok(override_file) = env::var(SECRETS_FILE_ENV) {
        if !override_file.is_empty() {
            return expand_user(&override_file);
        }
    }
    if prefer_repo_local_paths(data_root) {
        return data_root.join("ansible").join("secrets.yml");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".clawbox").join("secrets.yml")
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
