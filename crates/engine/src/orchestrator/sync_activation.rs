// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bringing a developer VM's sync sessions up.
//!
//! Activation is an end-to-end sequence: resolve the guest IP, pick the
//! SSH credential, provision the keypair and alias, install the key,
//! prepare guest destinations, recreate the sessions, then gate on the
//! readiness protocol: marker files dropped in each host path must become
//! visible at the guest paths before the configured timeout. Markers are
//! removed on every exit path. The attempt is bracketed with
//! `activate_start` / `activate_ok` / `activate_error` events.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clawbox_adapters::{
    ensure_ssh_alias, ensure_vm_keypair, ensure_vm_sessions, install_authorized_key,
    mark_vm_active, prepare_guest_dirs, wait_for_probe, CredentialedShell, RemoteShell,
    SessionSpec,
};
use clawbox_core::{read_text_or_empty, vm_user_credentials, ProvisionMarker};

use crate::error::UserFacingError;
use crate::sync_events::emit_sync_event;

use super::Orchestrator;

/// Which guest account the sync plumbing authenticates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCredential {
    /// Provisioned VM user when a marker exists, bootstrap admin otherwise.
    Auto,
    /// Always the bootstrap admin (pre-provision activation).
    BootstrapAdmin,
}

/// The host paths backing a developer VM's sessions.
#[derive(Debug, Clone)]
pub(crate) struct SyncPaths {
    pub openclaw_source: PathBuf,
    pub openclaw_payload: PathBuf,
    pub signal_payload: Option<PathBuf>,
}

/// The fixed session bindings for the developer profile.
pub(crate) fn developer_session_specs(vm_name: &str, paths: &SyncPaths) -> Vec<SessionSpec> {
    let mut specs = vec![
        SessionSpec {
            kind: "openclaw-source".to_string(),
            host_path: paths.openclaw_source.clone(),
            guest_path: format!("/Users/{vm_name}/Developer/openclaw"),
            ignore_vcs: true,
            ignored_paths: vec!["node_modules".to_string()],
            ready_required: true,
        },
        SessionSpec::new(
            "openclaw-payload",
            paths.openclaw_payload.clone(),
            format!("/Users/{vm_name}/.openclaw"),
        ),
    ];
    if let Some(signal) = &paths.signal_payload {
        specs.push(SessionSpec {
            kind: "signal-payload".to_string(),
            host_path: signal.clone(),
            guest_path: format!("/Users/{vm_name}/.local/share/signal-cli"),
            ignore_vcs: false,
            ignored_paths: Vec::new(),
            ready_required: false,
        });
    }
    specs
}

/// Removes the readiness marker files from the host paths on every exit.
struct ReadinessMarkerGuard {
    files: Vec<PathBuf>,
}

impl Drop for ReadinessMarkerGuard {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = std::fs::remove_file(file);
        }
    }
}

pub(crate) fn activate_vm_sync(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    paths: &SyncPaths,
    credential: SyncCredential,
    actor: &str,
    reason: &str,
) -> Result<(), UserFacingError> {
    emit_sync_event(&orch.ctx.state_dir, vm_name, "activate_start", actor, reason, None);
    match activate_inner(orch, vm_name, paths, credential) {
        Ok(()) => {
            emit_sync_event(&orch.ctx.state_dir, vm_name, "activate_ok", actor, reason, None);
            Ok(())
        }
        Err(e) => {
            emit_sync_event(
                &orch.ctx.state_dir,
                vm_name,
                "activate_error",
                actor,
                reason,
                Some(serde_json::json!({ "error": e.to_string() })),
            );
            Err(e)
        }
    }
}

fn sync_credentials(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    credential: SyncCredential,
) -> Result<(String, String), UserFacingError> {
    let ctx = orch.ctx;
    let marker_exists = match credential {
        SyncCredential::BootstrapAdmin => false,
        SyncCredential::Auto => ProvisionMarker::from_file(&ctx.marker_file(vm_name)).is_some(),
    };
    if marker_exists {
        Ok(vm_user_credentials(vm_name, &ctx.secrets_file)?)
    } else {
        Ok((ctx.bootstrap_admin_user.clone(), ctx.bootstrap_admin_password.clone()))
    }
}

fn activate_inner(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    paths: &SyncPaths,
    credential: SyncCredential,
) -> Result<(), UserFacingError> {
    let ctx = orch.ctx;

    println!("  activating file sync for '{vm_name}'...");
    let ip = orch.resolve_vm_ip(vm_name, Duration::from_secs(ctx.vm_boot_timeout_seconds))?;
    let (user, password) = sync_credentials(orch, vm_name, credential)?;

    let keypair = ensure_vm_keypair(&ctx.state_dir, vm_name)?;
    let alias = ensure_ssh_alias(&ctx.ssh_dir, vm_name, &ip, &user, &keypair.private_key)
        .map_err(|e| {
            UserFacingError::new(format!(
                "Error: Could not update SSH configuration for '{vm_name}': {e}"
            ))
        })?;

    let inventory = format!("{ip},");
    let shell = CredentialedShell { runner: orch.shell, user, password };

    let public_key = read_text_or_empty(&keypair.public_key);
    if public_key.trim().is_empty() {
        return Err(UserFacingError::new(format!(
            "Error: Sync public key is missing or empty: {}",
            keypair.public_key.display()
        )));
    }
    install_authorized_key(&shell, &ip, Some(&inventory), &public_key)?;

    let specs = developer_session_specs(vm_name, paths);
    prepare_guest_dirs(&shell, &ip, Some(&inventory), &specs)?;
    ensure_vm_sessions(orch.sync, vm_name, &alias, &specs)?;

    wait_for_session_readiness(orch, &shell, vm_name, &ip, &inventory, &specs)?;

    mark_vm_active(&ctx.state_dir, vm_name).map_err(|e| {
        UserFacingError::new(format!("Error: Could not record active sync for '{vm_name}': {e}"))
    })?;
    println!("  file sync active for '{vm_name}'.");
    Ok(())
}

/// The readiness protocol: a uniquely named marker in each host path must
/// become visible at the corresponding guest path. Required sessions gate
/// success; optional ones may still be propagating.
fn wait_for_session_readiness(
    orch: &Orchestrator<'_>,
    shell: &dyn RemoteShell,
    vm_name: &str,
    target: &str,
    inventory: &str,
    specs: &[SessionSpec],
) -> Result<(), UserFacingError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let marker_name = format!(".clawbox-sync-ready-{now}-{}", std::process::id());

    let mut guard = ReadinessMarkerGuard { files: Vec::new() };
    let mut required_guest_files = Vec::new();
    let mut all_guest_files = Vec::new();
    for spec in specs {
        let host_marker = spec.host_path.join(&marker_name);
        std::fs::write(&host_marker, "sync readiness probe\n").map_err(|e| {
            UserFacingError::new(format!(
                "Error: Could not write sync readiness marker: {}\n{e}",
                host_marker.display()
            ))
        })?;
        guard.files.push(host_marker);
        let guest_file = format!("{}/{marker_name}", spec.guest_path);
        if spec.ready_required {
            required_guest_files.push(guest_file.clone());
        }
        all_guest_files.push(guest_file);
    }

    let check_cmd = super::preflight::file_check_command(&all_guest_files);
    let required = required_guest_files.clone();
    let (succeeded, last_statuses, last_error) = wait_for_probe(
        shell,
        target,
        &check_cmd,
        &all_guest_files,
        Duration::from_secs(orch.ctx.mutagen_ready_timeout_seconds),
        Some(inventory),
        move |_exit, statuses| {
            required
                .iter()
                .all(|path| statuses.get(path).map(String::as_str) == Some("ok"))
        },
    )?;
    if succeeded {
        return Ok(());
    }

    let mut lines = vec![
        format!("Error: File sync did not become ready for '{vm_name}'."),
        format!("  timeout: {}s", orch.ctx.mutagen_ready_timeout_seconds),
        "  readiness checks:".to_string(),
        clawbox_adapters::format_path_statuses(&all_guest_files, &last_statuses),
    ];
    if !last_error.is_empty() {
        lines.push("  last probe output:".to_string());
        lines.push(format!("    {last_error}"));
    }
    lines.push("Check sync sessions with: clawbox status".to_string());
    Err(UserFacingError::new(lines.join("\n")))
}

/// Resolve the sync host paths for a VM from its held locks, for flows
/// that must reactivate sync without the original mount arguments.
pub(crate) fn locked_sync_paths(orch: &Orchestrator<'_>, vm_name: &str) -> Option<SyncPaths> {
    let lock_root = &orch.ctx.lock_root;
    let source = crate::locks::locked_path_for_vm(
        lock_root,
        &crate::locks::OPENCLAW_SOURCE_LOCK,
        vm_name,
    )?;
    let payload = crate::locks::locked_path_for_vm(
        lock_root,
        &crate::locks::OPENCLAW_PAYLOAD_LOCK,
        vm_name,
    )?;
    let signal = crate::locks::locked_path_for_vm(
        lock_root,
        &crate::locks::SIGNAL_PAYLOAD_LOCK,
        vm_name,
    );
    Some(SyncPaths { openclaw_source: source, openclaw_payload: payload, signal_payload: signal })
}

#[cfg(test)]
#[path = "sync_activation_tests.rs"]
mod tests;
