// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `provision`: configure a booted guest via the provisioning tool.
//!
//! The marker write is deliberately the last step of a successful run, so
//! a crash between guest configuration and marker write leaves a state
//! that `up` refuses as ambiguous and forces through `recreate`.

use std::time::Duration;

use clawbox_core::{utc_timestamp, Profile, ProvisionMarker, ServiceSelection};

use crate::error::UserFacingError;

use super::preflight::preflight_signal_payload_marker;
use super::sync_activation::{activate_vm_sync, locked_sync_paths, SyncCredential};
use super::validate::validate_feature_flags;
use super::Orchestrator;

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub vm_number: u32,
    pub profile: Profile,
    pub services: ServiceSelection,
    pub enable_signal_payload: bool,
    /// Set by `up` when sync was already activated earlier in this
    /// process, so provisioning does not redo it.
    pub sync_already_active: bool,
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

pub(super) fn provision_vm(
    orch: &Orchestrator<'_>,
    opts: &ProvisionOptions,
) -> Result<(), UserFacingError> {
    validate_feature_flags(opts.profile, opts.services, opts.enable_signal_payload, "")?;
    orch.ensure_secrets_file(false)?;

    let vm_name = orch.ctx.vm_name_for(opts.vm_number);
    orch.require_vm_exists(&vm_name, opts.vm_number)?;
    orch.require_vm_running(&vm_name, opts.vm_number)?;
    let boot_timeout = Duration::from_secs(orch.ctx.vm_boot_timeout_seconds);

    println!("Provisioning {vm_name}...");
    println!("  profile: {}", opts.profile);
    println!("  playwright enabled: {}", bool_str(opts.services.playwright));
    println!("  tailscale enabled: {}", bool_str(opts.services.tailscale));
    println!("  signal-cli enabled: {}", bool_str(opts.services.signal_cli));
    println!("  signal payload enabled: {}", bool_str(opts.enable_signal_payload));
    println!(
        "  waiting for VM IP (timeout: {}s; resolver: agent->default)...",
        boot_timeout.as_secs()
    );
    let vm_ip = orch.resolve_vm_ip(&vm_name, boot_timeout)?;
    println!("  vm ip: {vm_ip}");
    let inventory = format!("{vm_ip},");

    if opts.profile.is_developer() && !opts.sync_already_active {
        let Some(paths) = locked_sync_paths(orch, &vm_name) else {
            return Err(UserFacingError::new(format!(
                "Error: No locked source/payload paths found for '{vm_name}'.\n\
                 Launch the VM in developer mode first: clawbox launch {} --developer ...",
                opts.vm_number
            )));
        };
        activate_vm_sync(
            orch,
            &vm_name,
            &paths,
            SyncCredential::BootstrapAdmin,
            "cli",
            "provision",
        )?;
    }

    if opts.profile.is_developer() && opts.enable_signal_payload {
        let preflight_timeout = Duration::from_secs(orch.ctx.vm_boot_timeout_seconds.min(120));
        let shell = orch.bootstrap_shell();
        preflight_signal_payload_marker(
            orch,
            &shell,
            &vm_name,
            opts.vm_number,
            preflight_timeout,
            Some(&inventory),
            Some(&vm_ip),
        )?;
    }

    let enable_dev_mounts = opts.profile.is_developer();
    let playbook_args = vec![
        "-i".to_string(),
        inventory,
        "playbooks/provision.yml".to_string(),
        "--extra-vars".to_string(),
        format!("@{}", orch.ctx.secrets_file.display()),
        "--extra-vars".to_string(),
        "ansible_become=true".to_string(),
        "--extra-vars".to_string(),
        format!("vm_number={}", opts.vm_number),
        "--extra-vars".to_string(),
        format!("clawbox_profile={}", opts.profile),
        "--extra-vars".to_string(),
        format!("clawbox_enable_dev_mounts={}", bool_str(enable_dev_mounts)),
        "--extra-vars".to_string(),
        format!("clawbox_enable_playwright={}", bool_str(opts.services.playwright)),
        "--extra-vars".to_string(),
        format!("clawbox_enable_tailscale={}", bool_str(opts.services.tailscale)),
        "--extra-vars".to_string(),
        format!("clawbox_enable_signal_cli={}", bool_str(opts.services.signal_cli)),
        "--extra-vars".to_string(),
        format!("clawbox_enable_signal_payload={}", bool_str(opts.enable_signal_payload)),
    ];
    let exit_code = orch.provisioner.run_playbook(&orch.ctx.ansible_dir, &playbook_args)?;
    if exit_code != 0 {
        return Err(UserFacingError::new("Provisioning failed."));
    }

    let marker = ProvisionMarker {
        vm_name: vm_name.clone(),
        profile: opts.profile.to_string(),
        playwright: opts.services.playwright,
        tailscale: opts.services.tailscale,
        signal_cli: opts.services.signal_cli,
        signal_payload: opts.enable_signal_payload,
        sync_backend: "mutagen".to_string(),
        provisioned_at: utc_timestamp(),
    };
    marker.write(&orch.ctx.marker_file(&vm_name)).map_err(|e| {
        UserFacingError::new(format!(
            "Error: Could not write provision marker for '{vm_name}': {e}"
        ))
    })?;
    println!("Provisioning completed: {vm_name}");
    Ok(())
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
