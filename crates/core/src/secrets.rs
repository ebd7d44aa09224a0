// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The secrets file carrying the provisioned VM user's password.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scalar::parse_scalar;

pub const DEFAULT_VM_PASSWORD: &str = "clawbox";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secrets file not found: {0}")]
    Missing(PathBuf),

    #[error("Error: Could not parse vm_password from {0}")]
    Unparseable(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub fn secrets_file_contents(password: &str) -> String {
    format!("vm_password: \"{password}\"\n")
}

/// Shell recipe shown when the secrets file is required but absent.
pub fn missing_secrets_message(path: &Path) -> String {
    let contents = secrets_file_contents(DEFAULT_VM_PASSWORD);
    format!(
        "Error: Secrets file not found: {path}\n\n\
         Create it with:\n\
         \x20 mkdir -p \"{parent}\"\n\
         \x20 cat > \"{path}\" <<'EOF_SECRETS'\n\
         \x20 {contents}\n\
         \x20 EOF_SECRETS\n\
         \x20 chmod 600 \"{path}\"",
        path = path.display(),
        parent = path.parent().unwrap_or_else(|| Path::new(".")).display(),
        contents = contents.trim_end(),
    )
}

/// Create the secrets file with the default password if it does not exist.
/// Returns `true` when a new file was written.
pub fn ensure_vm_password_file(path: &Path, create_if_missing: bool) -> Result<bool, SecretsError> {
    if path.exists() {
        return Ok(false);
    }
    if !create_if_missing {
        return Err(SecretsError::Missing(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secrets_file_contents(DEFAULT_VM_PASSWORD))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(true)
}

pub fn parse_vm_password(text: &str) -> Option<String> {
    let value = parse_scalar(text, "vm_password");
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub fn read_vm_password(path: &Path) -> Result<String, SecretsError> {
    if !path.exists() {
        return Err(SecretsError::Missing(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_vm_password(&text).ok_or_else(|| SecretsError::Unparseable(path.to_path_buf()))
}

/// Credentials for the provisioned per-VM user account: the user is named
/// after the VM, the password comes from the secrets file.
pub fn vm_user_credentials(
    vm_name: &str,
    secrets_file: &Path,
) -> Result<(String, String), SecretsError> {
    Ok((vm_name.to_string(), read_vm_password(secrets_file)?))
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
