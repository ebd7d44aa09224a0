// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process exclusive locks on host directories.
//!
//! A lock is a directory under `<lock_root>/<kind>/<sha256(path)>/` whose
//! existence is the lock itself, so `mkdir` is the atomic acquire. Metadata
//! files inside (path, owner VM, owner host, timestamp) are written via
//! tempfile-and-rename so readers never see a torn write. At most one lock
//! directory exists per `(kind, VM)`: acquiring a new path prunes the VM's
//! previous lock for that kind.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use clawbox_adapters::{BackendError, VmBackend};
use clawbox_core::fsio::atomic_write_text;
use clawbox_core::paths::expand_user;
use clawbox_core::utc_timestamp;

const MAX_ATTEMPTS: u32 = 12;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);
const RECLAIM_BACKOFF: Duration = Duration::from_millis(50);
/// Attempts to wait for another writer still filling in its metadata
/// before treating the lock as abandoned.
const METADATA_GRACE_ATTEMPTS: u32 = 3;

/// One lock kind: its namespace directory, the metadata field naming the
/// locked path, and the words used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSpec {
    pub lock_kind: &'static str,
    pub path_field: &'static str,
    pub resource_label: &'static str,
    pub arg_hint: &'static str,
}

pub const OPENCLAW_SOURCE_LOCK: LockSpec = LockSpec {
    lock_kind: "openclaw-source",
    path_field: "source_path",
    resource_label: "OpenClaw source",
    arg_hint: "--openclaw-source",
};

pub const OPENCLAW_PAYLOAD_LOCK: LockSpec = LockSpec {
    lock_kind: "openclaw-payload",
    path_field: "payload_path",
    resource_label: "OpenClaw payload",
    arg_hint: "--openclaw-payload",
};

pub const SIGNAL_PAYLOAD_LOCK: LockSpec = LockSpec {
    lock_kind: "signal-payload",
    path_field: "payload_path",
    resource_label: "Signal payload",
    arg_hint: "--signal-cli-payload",
};

pub const ALL_LOCK_SPECS: [LockSpec; 3] =
    [OPENCLAW_SOURCE_LOCK, OPENCLAW_PAYLOAD_LOCK, SIGNAL_PAYLOAD_LOCK];

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "Error: {resource_label} is already in use by running VM '{owner_vm}'.\n\
         \x20 path: {path}\n\
         \x20 owner host: {owner_host}\n\
         Use a different {arg_hint} path or run clawbox down on the owner VM first."
    )]
    HeldByRunningVm {
        resource_label: String,
        owner_vm: String,
        owner_host: String,
        path: String,
        arg_hint: String,
    },

    #[error(
        "Error: Could not acquire lock for {resource_label}.\n\
         The lock directory was contended by concurrent operations. Retry the command."
    )]
    Contended { resource_label: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Expand and resolve a user-supplied path so equivalent spellings key the
/// same lock directory. Falls back to the absolute form when the path
/// cannot be resolved.
fn canonical_path(raw: &str) -> PathBuf {
    let expanded = expand_user(raw);
    if let Ok(resolved) = expanded.canonicalize() {
        return resolved;
    }
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(expanded)
    }
}

fn lock_dir_for(lock_root: &Path, spec: &LockSpec, canonical: &Path) -> PathBuf {
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let mut key = String::with_capacity(64);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    lock_root.join(spec.lock_kind).join(key)
}

fn short_hostname() -> String {
    let host = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    let short = host.split('.').next().unwrap_or("");
    if short.is_empty() {
        "unknown-host".to_string()
    } else {
        short.to_string()
    }
}

fn write_metadata(
    lock_dir: &Path,
    spec: &LockSpec,
    canonical: &Path,
    vm_name: &str,
) -> io::Result<()> {
    atomic_write_text(&lock_dir.join(spec.path_field), &format!("{}\n", canonical.display()))?;
    atomic_write_text(&lock_dir.join("owner_vm"), &format!("{vm_name}\n"))?;
    atomic_write_text(&lock_dir.join("owner_host"), &format!("{}\n", short_hostname()))?;
    atomic_write_text(&lock_dir.join("updated_at"), &format!("{}\n", utc_timestamp()))?;
    Ok(())
}

fn read_meta(lock_dir: &Path, name: &str) -> String {
    std::fs::read_to_string(lock_dir.join(name)).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn reclaim_lock_dir(lock_dir: &Path) {
    let _ = std::fs::remove_dir_all(lock_dir);
}

/// Remove any other lock directory under the same kind owned by `vm_name`,
/// keeping the `(kind, VM)` invariant after a path change.
fn cleanup_other_locks_for_vm(lock_root: &Path, spec: &LockSpec, vm_name: &str, keep: &Path) {
    let kind_root = lock_root.join(spec.lock_kind);
    let Ok(entries) = std::fs::read_dir(&kind_root) else {
        return;
    };
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() || dir == keep {
            continue;
        }
        if read_meta(&dir, "owner_vm") == vm_name {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

/// Acquire the lock for `resource_path` on behalf of `vm_name`.
///
/// Same-VM acquisition is idempotent and refreshes the metadata. A lock
/// held by a VM the backend reports as running fails; anything else
/// (stale owner, half-written metadata past its grace period) is
/// reclaimed and retried, up to 12 attempts.
pub fn acquire_path_lock(
    lock_root: &Path,
    spec: &LockSpec,
    vm_name: &str,
    resource_path: &str,
    backend: &dyn VmBackend,
) -> Result<(), LockError> {
    let canonical = canonical_path(resource_path);
    let lock_dir = lock_dir_for(lock_root, spec, &canonical);
    std::fs::create_dir_all(lock_root.join(spec.lock_kind))?;

    for attempt in 1..=MAX_ATTEMPTS {
        match std::fs::create_dir(&lock_dir) {
            Ok(()) => {
                write_metadata(&lock_dir, spec, &canonical, vm_name)?;
                cleanup_other_locks_for_vm(lock_root, spec, vm_name, &lock_dir);
                debug!(kind = spec.lock_kind, vm = vm_name, path = %canonical.display(), "lock acquired");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(_) => {
                if attempt == MAX_ATTEMPTS {
                    break;
                }
                std::thread::sleep(RETRY_BACKOFF);
                continue;
            }
        }

        let owner_vm = read_meta(&lock_dir, "owner_vm");
        let owner_host = read_meta(&lock_dir, "owner_host");
        let owner_path = read_meta(&lock_dir, spec.path_field);

        if owner_vm.is_empty() {
            // Another process may still be writing metadata.
            if attempt <= METADATA_GRACE_ATTEMPTS {
                std::thread::sleep(RETRY_BACKOFF);
                continue;
            }
            reclaim_lock_dir(&lock_dir);
            continue;
        }

        if owner_vm == vm_name {
            write_metadata(&lock_dir, spec, &canonical, vm_name)?;
            cleanup_other_locks_for_vm(lock_root, spec, vm_name, &lock_dir);
            return Ok(());
        }

        if backend.running(&owner_vm)? {
            return Err(LockError::HeldByRunningVm {
                resource_label: spec.resource_label.to_string(),
                owner_vm,
                owner_host: if owner_host.is_empty() { "unknown".to_string() } else { owner_host },
                path: if owner_path.is_empty() {
                    canonical.display().to_string()
                } else {
                    owner_path
                },
                arg_hint: spec.arg_hint.to_string(),
            });
        }

        reclaim_lock_dir(&lock_dir);
        std::thread::sleep(RECLAIM_BACKOFF);
    }

    Err(LockError::Contended { resource_label: spec.resource_label.to_string() })
}

/// Remove every lock, across all kinds, owned by `vm_name`.
pub fn cleanup_locks_for_vm(lock_root: &Path, vm_name: &str) {
    for spec in &ALL_LOCK_SPECS {
        let kind_root = lock_root.join(spec.lock_kind);
        let Ok(entries) = std::fs::read_dir(&kind_root) else {
            continue;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            if read_meta(&dir, "owner_vm") == vm_name {
                let _ = std::fs::remove_dir_all(&dir);
            }
        }
    }
}

/// The canonical path a VM currently holds for a kind, if any. Used to
/// reactivate sync after boot without re-passing mount arguments.
pub fn locked_path_for_vm(lock_root: &Path, spec: &LockSpec, vm_name: &str) -> Option<PathBuf> {
    let kind_root = lock_root.join(spec.lock_kind);
    let entries = std::fs::read_dir(&kind_root).ok()?;
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        if read_meta(&dir, "owner_vm") == vm_name {
            let path = read_meta(&dir, spec.path_field);
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
