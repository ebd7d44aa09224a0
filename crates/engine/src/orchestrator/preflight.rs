// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guest-visibility preflights.
//!
//! Before provisioning a developer VM, Clawbox proves the shared folders
//! actually carry host content: probe files written on the host must turn
//! up at the expected guest paths. The signal-payload marker is the same
//! idea with destructive-seeding stakes: the provisioner refuses to seed
//! a payload whose destination is an unmounted or wrong directory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clawbox_adapters::{
    format_path_statuses, mount_status_command, run_path_probe, sh_quote, wait_for_probe,
    RemoteShell,
};

use crate::error::UserFacingError;

use super::Orchestrator;

/// Removes the host-side probe files on every exit path.
struct ProbeFileGuard {
    files: Vec<PathBuf>,
}

impl Drop for ProbeFileGuard {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = std::fs::remove_file(file);
        }
    }
}

/// One shell command checking file visibility: prints `path=ok` or
/// `path=missing` per path and exits nonzero if anything is missing.
pub(crate) fn file_check_command(paths: &[String]) -> String {
    let clauses: Vec<String> = paths
        .iter()
        .map(|path| {
            let quoted = sh_quote(path);
            format!(
                "if [ -f {quoted} ]; then printf '%s=%s\\n' {quoted} ok; \
                 else printf '%s=%s\\n' {quoted} missing; missing=1; fi"
            )
        })
        .collect();
    format!("missing=0; {}; exit $missing", clauses.join("; "))
}

fn probe_file_name(suffix: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!(".clawbox-mount-probe-{now}-{}-{suffix}", std::process::id())
}

/// Write the host-side marker file into the signal payload directory.
/// Its visibility in the guest is the provisioner's precondition for the
/// signal-payload task.
pub(crate) fn ensure_signal_payload_host_marker(
    orch: &Orchestrator<'_>,
    signal_payload_host: &str,
    vm_name: &str,
) -> Result<(), UserFacingError> {
    let marker_path =
        PathBuf::from(signal_payload_host).join(&orch.ctx.signal_payload_marker_filename);
    let content = format!(
        "This marker is used by Clawbox to verify signal-cli payload sync destination readiness.\n\
         vm: {vm_name}\n"
    );
    std::fs::write(&marker_path, content).map_err(|e| {
        UserFacingError::new(format!(
            "Error: Could not write signal payload marker file: {}\n{e}",
            marker_path.display()
        ))
    })
}

/// Verify that host content is visible at the guest mount points before
/// provisioning. The source mount is probed via the well-known repository
/// file; payload (and signal) mounts via freshly written probe files.
#[allow(clippy::too_many_arguments)]
pub(crate) fn preflight_developer_mounts(
    orch: &Orchestrator<'_>,
    shell: &dyn RemoteShell,
    vm_name: &str,
    vm_number: u32,
    openclaw_payload_host: &str,
    signal_payload_host: &str,
    include_signal_payload: bool,
    timeout: Duration,
) -> Result<(), UserFacingError> {
    let ctx = orch.ctx;
    let mut mount_paths =
        vec![ctx.openclaw_source_mount.clone(), ctx.openclaw_payload_mount.clone()];
    if include_signal_payload {
        mount_paths.push(ctx.signal_payload_mount.clone());
    }

    println!("  verifying shared folder mounts...");

    let mut guard = ProbeFileGuard { files: Vec::new() };

    let payload_probe_name = probe_file_name("payload");
    let payload_probe_path = PathBuf::from(openclaw_payload_host).join(&payload_probe_name);
    std::fs::write(&payload_probe_path, "probe\n").map_err(|e| {
        UserFacingError::new(format!(
            "Error: Could not write mount probe file: {}\n{e}",
            payload_probe_path.display()
        ))
    })?;
    guard.files.push(payload_probe_path);

    let mut required_files = vec![
        format!("{}/package.json", ctx.openclaw_source_mount),
        format!("{}/{payload_probe_name}", ctx.openclaw_payload_mount),
    ];

    if include_signal_payload && !signal_payload_host.is_empty() {
        let signal_probe_name = probe_file_name("signal");
        let signal_probe_path = PathBuf::from(signal_payload_host).join(&signal_probe_name);
        std::fs::write(&signal_probe_path, "probe\n").map_err(|e| {
            UserFacingError::new(format!(
                "Error: Could not write mount probe file: {}\n{e}",
                signal_probe_path.display()
            ))
        })?;
        guard.files.push(signal_probe_path);
        required_files.push(format!("{}/{signal_probe_name}", ctx.signal_payload_mount));
    }

    let checks_cmd = file_check_command(&required_files);
    let (succeeded, last_checks, last_error) = wait_for_probe(
        shell,
        vm_name,
        &checks_cmd,
        &required_files,
        timeout,
        None,
        |exit, statuses| exit == 0 && statuses.values().all(|status| status == "ok"),
    )?;
    if succeeded {
        println!("  shared folder mounts verified.");
        return Ok(());
    }

    // Gather mount-table diagnostics for the failure message.
    let mut last_mounts: BTreeMap<String, String> =
        mount_paths.iter().map(|p| (p.clone(), "unknown".to_string())).collect();
    let mount_cmd = mount_status_command(&mount_paths);
    if let Ok(outcome) = run_path_probe(shell, vm_name, &mount_cmd, &mount_paths, None) {
        if outcome.exit_code == 0 {
            last_mounts = outcome.statuses;
        }
    }

    let mut lines = vec![
        "Error: Required shared folders failed preflight checks in the guest.".to_string(),
        "Clawbox requires visible shared folder content before provisioning in developer mode."
            .to_string(),
        format!("  vm: {vm_name}"),
        format!("  timeout: {}s", timeout.as_secs()),
        "  file visibility checks:".to_string(),
        format_path_statuses(&required_files, &last_checks),
        "  mount command diagnostics:".to_string(),
        format_path_statuses(&mount_paths, &last_mounts),
    ];
    if !last_error.is_empty() {
        lines.push("  last probe output:".to_string());
        lines.push(format!("    {last_error}"));
    }
    lines.push("Rerun with a fresh VM if needed:".to_string());
    lines.push(format!("  clawbox delete {vm_number}"));
    lines.push(format!("  clawbox up {vm_number} --developer ..."));
    Err(UserFacingError::new(lines.join("\n")))
}

/// Wait until the host-written signal-payload marker is visible at the
/// guest mount point.
pub(crate) fn preflight_signal_payload_marker(
    orch: &Orchestrator<'_>,
    shell: &dyn RemoteShell,
    vm_name: &str,
    vm_number: u32,
    timeout: Duration,
    inventory_path: Option<&str>,
    target_host: Option<&str>,
) -> Result<(), UserFacingError> {
    let ctx = orch.ctx;
    let marker_path =
        format!("{}/{}", ctx.signal_payload_mount, ctx.signal_payload_marker_filename);
    println!("  verifying signal-cli payload marker visibility...");

    let quoted = sh_quote(&marker_path);
    let check_cmd = format!(
        "if [ -f {quoted} ]; then printf '%s=%s\\n' {quoted} ok; exit 0; \
         else printf '%s=%s\\n' {quoted} missing; exit 1; fi"
    );
    let paths = vec![marker_path.clone()];
    let target = target_host.unwrap_or(vm_name);
    let (succeeded, last_statuses, last_error) = wait_for_probe(
        shell,
        target,
        &check_cmd,
        &paths,
        timeout,
        inventory_path,
        |exit, statuses| {
            exit == 0 && statuses.get(&marker_path).map(String::as_str) == Some("ok")
        },
    )?;
    if succeeded {
        println!("  signal-cli payload marker verified.");
        return Ok(());
    }

    let last_status =
        last_statuses.get(&marker_path).map(String::as_str).unwrap_or("unknown").to_string();
    let mut lines = vec![
        "Error: signal-cli payload marker was not visible in the guest.".to_string(),
        "This safety check prevents destructive payload seeding from an unmounted/wrong directory."
            .to_string(),
        format!("  vm: {vm_name}"),
        format!("  expected marker: {marker_path}"),
        format!("  timeout: {}s", timeout.as_secs()),
        format!("  last marker status: {last_status}"),
    ];
    if !last_error.is_empty() {
        lines.push("  last probe output:".to_string());
        lines.push(format!("    {last_error}"));
    }
    lines.push("Retry with a fresh launch and then provision:".to_string());
    lines.push(format!("  clawbox launch {vm_number} --developer --signal-cli-payload <path> ..."));
    lines.push(format!(
        "  clawbox provision {vm_number} --developer --add-signal-cli-provisioning --enable-signal-payload"
    ));
    Err(UserFacingError::new(lines.join("\n")))
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
