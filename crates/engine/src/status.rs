// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status reporting for one VM or the whole environment.
//!
//! A report is built from host state (marker files), backend state
//! (exists/running/IP), and, when the VM is reachable and provisioned for
//! the developer profile, remote probes of the sync paths and the mutagen
//! session list. Reports render as indented text or as a JSON envelope.

use std::collections::BTreeMap;

use serde::Serialize;

use clawbox_adapters::{
    mount_status_command, parse_path_statuses, vm_sessions_status, BackendError, RemoteShell,
    SyncCli, VmBackend,
};
use clawbox_core::{parse_vm_suffix_number, ProvisionMarker};

use crate::context::EngineContext;

const MAX_SUMMARY_LINES: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionMarkerReport {
    pub present: bool,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPathsReport {
    pub note: Option<String>,
    pub probe: String,
    pub paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalPayloadSyncReport {
    pub enabled: bool,
    pub probe: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutagenSyncReport {
    pub enabled: bool,
    pub probe: String,
    pub active: Option<bool>,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmStatusReport {
    pub vm: String,
    pub exists: bool,
    pub running: bool,
    pub provision_marker: ProvisionMarkerReport,
    pub ip: Option<String>,
    pub sync_paths: SyncPathsReport,
    pub signal_payload_sync: SignalPayloadSyncReport,
    pub mutagen_sync: MutagenSyncReport,
    pub warnings: Vec<String>,

    #[serde(skip)]
    marker: Option<ProvisionMarker>,
    #[serde(skip)]
    mount_path_order: Vec<String>,
}

const PROBE_NOT_APPLICABLE: &str = "not_applicable";
const PROBE_OK: &str = "ok";
const PROBE_UNAVAILABLE: &str = "unavailable";

/// Compress raw `mutagen sync list -l` output into an active flag and a
/// short summary, preferring the `Name:`/`Status:` lines.
pub fn summarize_sync_status(status_output: &str) -> (bool, Vec<String>) {
    let lines: Vec<&str> = status_output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let filtered: Vec<&str> =
        lines.into_iter().filter(|line| !line.bytes().all(|b| b == b'-')).collect();
    if filtered.is_empty()
        || filtered.iter().any(|line| line.contains("No synchronization sessions found"))
    {
        return (false, vec!["no active sessions found".to_string()]);
    }
    let summary: Vec<String> = filtered
        .iter()
        .filter(|line| line.starts_with("Name: ") || line.starts_with("Status: "))
        .take(MAX_SUMMARY_LINES)
        .map(|line| line.to_string())
        .collect();
    if !summary.is_empty() {
        return (true, summary);
    }
    (true, filtered.iter().take(MAX_SUMMARY_LINES).map(|line| line.to_string()).collect())
}

/// Mount paths worth probing for this marker, plus an explanatory note
/// when probing is skipped entirely.
pub fn status_mount_paths(
    marker: Option<&ProvisionMarker>,
    ctx: &EngineContext,
) -> (Vec<String>, Option<String>) {
    match marker {
        Some(marker) if marker.profile == "developer" => {
            let mut paths =
                vec![ctx.openclaw_source_mount.clone(), ctx.openclaw_payload_mount.clone()];
            if marker.signal_payload {
                paths.push(ctx.signal_payload_mount.clone());
            }
            (paths, None)
        }
        Some(_) => (Vec::new(), None),
        None => {
            (Vec::new(), Some("no marker found; skipping remote sync-path probe".to_string()))
        }
    }
}

/// VMs worth reporting on: the backend's list union the marker files,
/// filtered to the `<base>-<N>` namespace and ordered by N.
pub fn candidate_vm_names(
    backend: &dyn VmBackend,
    ctx: &EngineContext,
) -> Result<Vec<String>, BackendError> {
    let mut names = std::collections::BTreeSet::new();

    for vm in backend.list()? {
        if parse_vm_suffix_number(&vm.name, &ctx.vm_base_name).is_some() {
            names.insert(vm.name);
        }
    }

    if let Ok(entries) = std::fs::read_dir(&ctx.state_dir) {
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(vm_name) = file_name.strip_suffix(".provisioned") else {
                continue;
            };
            if parse_vm_suffix_number(vm_name, &ctx.vm_base_name).is_some() {
                names.insert(vm_name.to_string());
            }
        }
    }

    let mut ordered: Vec<String> = names.into_iter().collect();
    ordered.sort_by_key(|name| {
        (parse_vm_suffix_number(name, &ctx.vm_base_name).unwrap_or(u32::MAX), name.clone())
    });
    Ok(ordered)
}

fn marker_data(marker: &ProvisionMarker) -> serde_json::Value {
    serde_json::json!({
        "profile": marker.profile,
        "playwright": marker.playwright,
        "tailscale": marker.tailscale,
        "signal_cli": marker.signal_cli,
        "signal_payload": marker.signal_payload,
        "sync_backend": marker.sync_backend,
    })
}

/// Report skeleton from host-side state only.
pub fn status_report_base(
    vm_name: &str,
    marker_present: bool,
    marker: Option<ProvisionMarker>,
    exists: bool,
    running: bool,
) -> VmStatusReport {
    let mutagen_enabled = marker
        .as_ref()
        .map(|m| m.profile == "developer" && m.sync_backend == "mutagen")
        .unwrap_or(false);
    VmStatusReport {
        vm: vm_name.to_string(),
        exists,
        running,
        provision_marker: ProvisionMarkerReport {
            present: marker_present,
            data: marker.as_ref().map(marker_data),
        },
        ip: None,
        sync_paths: SyncPathsReport {
            note: None,
            probe: PROBE_NOT_APPLICABLE.to_string(),
            paths: BTreeMap::new(),
        },
        signal_payload_sync: SignalPayloadSyncReport {
            enabled: marker.as_ref().map(|m| m.signal_payload).unwrap_or(false),
            probe: PROBE_NOT_APPLICABLE.to_string(),
            lines: Vec::new(),
        },
        mutagen_sync: MutagenSyncReport {
            enabled: mutagen_enabled,
            probe: PROBE_NOT_APPLICABLE.to_string(),
            active: None,
            lines: Vec::new(),
        },
        warnings: Vec::new(),
        marker,
        mount_path_order: Vec::new(),
    }
}

/// Build the full report for one VM. `shell` carries the credentials for
/// the remote sync-path probe; `None` (creds unavailable) marks the probe
/// unavailable, with the caller's warnings explaining why.
pub fn build_vm_status_report(
    ctx: &EngineContext,
    backend: &dyn VmBackend,
    sync: &dyn SyncCli,
    shell: Option<&dyn RemoteShell>,
    cred_warnings: Vec<String>,
    vm_name: &str,
) -> Result<VmStatusReport, BackendError> {
    let marker_file = ctx.marker_file(vm_name);
    let marker = ProvisionMarker::from_file(&marker_file);
    let exists = backend.exists(vm_name)?;
    let running = if exists { backend.running(vm_name)? } else { false };

    let mut report = status_report_base(vm_name, marker_file.exists(), marker, exists, running);
    if exists {
        report.ip = backend.ip(vm_name)?;
    }

    if !(exists && running && report.ip.is_some()) {
        return Ok(report);
    }

    if report.mutagen_sync.enabled {
        let status_output = vm_sessions_status(sync, vm_name);
        if status_output == "mutagen not available" {
            report.mutagen_sync.probe = PROBE_UNAVAILABLE.to_string();
            report.mutagen_sync.lines = vec!["mutagen CLI unavailable on host".to_string()];
            report.warnings.push("Mutagen sync status is unavailable.".to_string());
        } else {
            let (active, lines) = summarize_sync_status(&status_output);
            report.mutagen_sync.probe = PROBE_OK.to_string();
            report.mutagen_sync.active = Some(active);
            report.mutagen_sync.lines = lines;
            if !active {
                report.warnings.push(
                    "Mutagen sync backend is configured, but no active Mutagen sessions were found."
                        .to_string(),
                );
            }
        }
    }

    let (mount_paths, note) = status_mount_paths(report.marker.as_ref(), ctx);
    report.sync_paths.note = note;
    report.warnings.extend(cred_warnings);
    if mount_paths.is_empty() {
        return Ok(report);
    }
    report.mount_path_order = mount_paths.clone();

    let Some(shell) = shell else {
        report.sync_paths.probe = PROBE_UNAVAILABLE.to_string();
        return Ok(report);
    };

    let cmd = mount_status_command(&mount_paths);
    match shell.run_shell(vm_name, &cmd, false, None) {
        Ok(output) if output.success() => {
            let statuses = parse_path_statuses(&output.stdout, &mount_paths);
            if statuses.values().all(|status| status == "unknown") {
                report.sync_paths.probe = PROBE_UNAVAILABLE.to_string();
            } else {
                report.sync_paths.probe = PROBE_OK.to_string();
                report.sync_paths.paths = statuses;
            }
        }
        _ => {
            report.sync_paths.probe = PROBE_UNAVAILABLE.to_string();
        }
    }
    Ok(report)
}

/// Render one report as the indented text block `status` prints.
pub fn render_status_text(report: &VmStatusReport) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut out = Vec::new();
    out.push(format!("VM: {}", report.vm));
    out.push(format!("  exists: {}", yes_no(report.exists)));
    out.push(format!("  running: {}", yes_no(report.running)));
    out.push(format!(
        "  provision marker: {}",
        if report.provision_marker.present { "present" } else { "missing" }
    ));
    if let Some(marker) = &report.marker {
        let backend =
            if marker.sync_backend.is_empty() { "(missing)" } else { marker.sync_backend.as_str() };
        out.push(format!(
            "  marker profile/playwright/tailscale/signal_cli/signal_payload/sync_backend: {}/{}",
            marker.flags_summary(),
            backend,
        ));
    }
    if !report.warnings.is_empty() {
        out.push("  warnings:".to_string());
        for warning in &report.warnings {
            out.push(format!("    - {warning}"));
        }
    }

    if !report.exists {
        return out.join("\n");
    }

    out.push(format!("  ip: {}", report.ip.as_deref().unwrap_or("(unavailable)")));
    if !report.running || report.ip.is_none() {
        return out.join("\n");
    }

    if let Some(note) = &report.sync_paths.note {
        out.push(format!("  note: {note}"));
    }

    if report.sync_paths.probe == PROBE_UNAVAILABLE {
        out.push("  sync paths: unavailable (remote probe failed)".to_string());
    } else if report.sync_paths.probe == PROBE_OK {
        out.push("  sync paths:".to_string());
        for path in &report.mount_path_order {
            if let Some(status) = report.sync_paths.paths.get(path) {
                out.push(format!("    - {path}: {status}"));
            }
        }
    }

    if report.mutagen_sync.enabled {
        if report.mutagen_sync.probe == PROBE_UNAVAILABLE {
            out.push("  mutagen sync: unavailable".to_string());
        } else if report.mutagen_sync.probe == PROBE_OK {
            let state = if report.mutagen_sync.active == Some(true) { "active" } else { "inactive" };
            out.push(format!("  mutagen sync: {state}"));
        }
        for line in &report.mutagen_sync.lines {
            out.push(format!("    - {line}"));
        }
    }

    out.join("\n")
}

/// The JSON envelope for environment mode.
pub fn environment_payload(reports: &[VmStatusReport]) -> serde_json::Value {
    serde_json::json!({
        "mode": "environment",
        "vm_count": reports.len(),
        "running_count": reports.iter().filter(|r| r.running).count(),
        "vms": reports,
    })
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
