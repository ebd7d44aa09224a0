// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `status` command: one VM or the whole environment.

use clawbox_adapters::{reconcile_vm_sync, CredentialedShell, RemoteShell};
use clawbox_core::{missing_secrets_message, vm_user_credentials, ProvisionMarker, SecretsError};

use crate::error::UserFacingError;
use crate::status::{
    build_vm_status_report, candidate_vm_names, environment_payload, render_status_text,
    VmStatusReport,
};
use crate::watcher::reconcile_vm_watchers;

use super::Orchestrator;

/// Credentials for the remote sync-path probe, or warnings explaining why
/// probing is off. Only developer-profile markers warrant a probe.
fn status_probe_auth(
    orch: &Orchestrator<'_>,
    vm_name: &str,
) -> (Option<(String, String)>, Vec<String>) {
    let marker = ProvisionMarker::from_file(&orch.ctx.marker_file(vm_name));
    let probe_allowed = marker.map(|m| m.profile == "developer").unwrap_or(false);
    if !probe_allowed {
        return (None, Vec::new());
    }
    match vm_user_credentials(vm_name, &orch.ctx.secrets_file) {
        Ok(creds) => (Some(creds), Vec::new()),
        Err(SecretsError::Missing(path)) => (None, vec![missing_secrets_message(&path)]),
        Err(e) => (None, vec![e.to_string()]),
    }
}

fn build_report(orch: &Orchestrator<'_>, vm_name: &str) -> Result<VmStatusReport, UserFacingError> {
    let (creds, warnings) = status_probe_auth(orch, vm_name);
    let shell = creds.map(|(user, password)| CredentialedShell {
        runner: orch.shell,
        user,
        password,
    });
    let report = build_vm_status_report(
        orch.ctx,
        orch.backend,
        orch.sync,
        shell.as_ref().map(|s| s as &dyn RemoteShell),
        warnings,
        vm_name,
    )?;
    Ok(report)
}

pub(super) fn status_vm(
    orch: &Orchestrator<'_>,
    vm_number: u32,
    as_json: bool,
) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(vm_number);
    let report = build_report(orch, &vm_name)?;

    if as_json {
        let payload = serde_json::to_string_pretty(&report)
            .map_err(|e| UserFacingError::new(format!("Error: Could not render status: {e}")))?;
        println!("{payload}");
        return Ok(());
    }
    println!("{}", render_status_text(&report));
    Ok(())
}

pub(super) fn status_environment(
    orch: &Orchestrator<'_>,
    as_json: bool,
) -> Result<(), UserFacingError> {
    // Environment status doubles as the reconciliation sweep.
    reconcile_vm_watchers(orch.backend, &orch.ctx.state_dir, &orch.ctx.lock_root);
    reconcile_vm_sync(orch.sync, orch.backend, &orch.ctx.ssh_dir, &orch.ctx.state_dir);

    let vm_names = candidate_vm_names(orch.backend, orch.ctx)?;
    let mut reports = Vec::with_capacity(vm_names.len());
    for vm_name in &vm_names {
        reports.push(build_report(orch, vm_name)?);
    }

    if as_json {
        let payload = serde_json::to_string_pretty(&environment_payload(&reports))
            .map_err(|e| UserFacingError::new(format!("Error: Could not render status: {e}")))?;
        println!("{payload}");
        return Ok(());
    }

    println!("Clawbox environment:");
    println!("  vms discovered: {}", reports.len());

    if reports.is_empty() {
        println!("  no Clawbox VMs found.");
        println!("  run `clawbox up` to create and provision one.");
        return Ok(());
    }

    for report in &reports {
        println!();
        println!("{}", render_status_text(report));
    }
    Ok(())
}

#[cfg(test)]
#[path = "status_cmd_tests.rs"]
mod tests;
