// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `up` and `recreate`: the composite flows.

use std::time::Duration;

use clawbox_adapters::{reconcile_vm_sync, sh_quote, wait_for_running};
use clawbox_core::{Profile, ProvisionMarker, ServiceSelection, OPTIONAL_SERVICES};

use crate::error::UserFacingError;
use crate::watcher::reconcile_vm_watchers;

use super::provision::ProvisionOptions;
use super::sync_activation::{activate_vm_sync, SyncCredential, SyncPaths};
use super::validate::{validate_dirs, validate_feature_flags, validate_profile_mount_args};
use super::{LaunchOptions, Orchestrator, STOP_TIMEOUT};

const POST_LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
const POST_PROVISION_GRACE: Duration = Duration::from_secs(30);
const POST_RELAUNCH_TIMEOUT: Duration = Duration::from_secs(120);
const LIFECYCLE_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct UpOptions {
    pub vm_number: u32,
    pub profile: Profile,
    pub openclaw_source: String,
    pub openclaw_payload: String,
    pub signal_payload: String,
    pub services: ServiceSelection,
}

impl UpOptions {
    fn launch_options(&self, headless: bool) -> LaunchOptions {
        LaunchOptions {
            vm_number: self.vm_number,
            profile: self.profile,
            openclaw_source: self.openclaw_source.clone(),
            openclaw_payload: self.openclaw_payload.clone(),
            signal_payload: self.signal_payload.clone(),
            headless,
        }
    }

    fn sync_paths(&self) -> SyncPaths {
        SyncPaths {
            openclaw_source: self.openclaw_source.clone().into(),
            openclaw_payload: self.openclaw_payload.clone().into(),
            signal_payload: if self.signal_payload.is_empty() {
                None
            } else {
                Some(self.signal_payload.clone().into())
            },
        }
    }
}

/// Shell-quoted `clawbox up …` line reproducing this invocation.
pub(super) fn render_up_command(opts: &UpOptions) -> String {
    let mut cmd = vec!["clawbox".to_string(), "up".to_string(), opts.vm_number.to_string()];
    if opts.profile.is_developer() {
        cmd.push("--developer".to_string());
        cmd.push("--openclaw-source".to_string());
        cmd.push(opts.openclaw_source.clone());
        cmd.push("--openclaw-payload".to_string());
        cmd.push(opts.openclaw_payload.clone());
    }
    for spec in &OPTIONAL_SERVICES {
        if opts.services.is_enabled(spec.key) {
            cmd.push(spec.cli_flag.to_string());
        }
    }
    if !opts.signal_payload.is_empty() {
        cmd.push("--signal-cli-payload".to_string());
        cmd.push(opts.signal_payload.clone());
    }
    cmd.iter().map(|part| sh_quote(part)).collect::<Vec<_>>().join(" ")
}

pub(super) fn render_recreate_commands(opts: &UpOptions) -> String {
    format!("  clawbox delete {}\n  {}", opts.vm_number, render_up_command(opts))
}

/// Why provisioning must run, or `""` to skip it. Errors force the user
/// through `recreate`: in-place reprovision after an initial provision is
/// treated as unsafe.
fn compute_up_provision_reason(
    orch: &Orchestrator<'_>,
    opts: &UpOptions,
    created_vm: bool,
    desired_signal_payload: bool,
) -> Result<String, UserFacingError> {
    if created_vm {
        return Ok("VM was created in this run".to_string());
    }

    let vm_name = orch.ctx.vm_name_for(opts.vm_number);
    let marker_file = orch.ctx.marker_file(&vm_name);
    if !marker_file.exists() {
        return Err(UserFacingError::new(format!(
            "Error: Provision marker is missing for existing VM '{vm_name}'.\n\
             In-place reprovision is unsafe after initial provisioning.\n\
             Recreate the VM instead:\n{}",
            render_recreate_commands(opts)
        )));
    }

    let Some(marker) = ProvisionMarker::from_file(&marker_file) else {
        return Err(UserFacingError::new(format!(
            "Error: Provision marker exists but could not be parsed: {}\n\
             In-place reprovision is unsafe after initial provisioning.\n\
             Recreate the VM instead:\n{}",
            marker_file.display(),
            render_recreate_commands(opts)
        )));
    };

    let sync_backend_mismatch = opts.profile.is_developer() && marker.sync_backend != "mutagen";
    if marker.profile != opts.profile.to_string()
        || marker.playwright != opts.services.playwright
        || marker.tailscale != opts.services.tailscale
        || marker.signal_cli != opts.services.signal_cli
        || marker.signal_payload != desired_signal_payload
        || sync_backend_mismatch
    {
        let bool_str = |b: bool| if b { "true" } else { "false" };
        return Err(UserFacingError::new(format!(
            "Error: Requested options do not match this VM's existing provision marker.\n\
             In-place reprovision is unsafe after initial provisioning.\n\
             \x20 marker file: {}\n\
             \x20 marker profile/playwright/tailscale/signal_cli/signal_payload: {}\n\
             \x20 requested profile/playwright/tailscale/signal_cli/signal_payload: {}/{}/{}/{}/{}\n\
             Recreate the VM instead:\n{}",
            marker_file.display(),
            marker.flags_summary(),
            opts.profile,
            bool_str(opts.services.playwright),
            bool_str(opts.services.tailscale),
            bool_str(opts.services.signal_cli),
            bool_str(desired_signal_payload),
            render_recreate_commands(opts)
        )));
    }
    Ok(String::new())
}

/// Make sure the VM is running, launching it when needed. Returns whether
/// this call launched it headless.
fn ensure_vm_running_for_up(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    opts: &UpOptions,
    provision_required: bool,
) -> Result<bool, UserFacingError> {
    if orch.backend.running(vm_name)? {
        println!("VM '{vm_name}' is already running.");
        return Ok(false);
    }

    println!("VM '{vm_name}' is not running; launching it...");
    let launched_headless = provision_required;
    orch.launch(&opts.launch_options(launched_headless))?;
    if !wait_for_running(orch.backend, vm_name, POST_LAUNCH_TIMEOUT, LIFECYCLE_POLL)? {
        return Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' did not transition to running state after launch."
        )));
    }
    Ok(launched_headless)
}

fn relaunch_gui_after_headless_provision(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    opts: &UpOptions,
    launched_headless: bool,
) -> Result<(), UserFacingError> {
    if !launched_headless {
        return Ok(());
    }

    println!("Provisioning completed; relaunching '{vm_name}' with a Tart window...");
    if opts.profile.is_developer() {
        println!("  note: the VM window may appear before file sync is ready.");
    }
    if orch.backend.running(vm_name)? && !orch.stop_vm_and_wait(vm_name, STOP_TIMEOUT)? {
        return Err(UserFacingError::new(format!(
            "Error: Timed out stopping headless VM '{vm_name}' before GUI relaunch.\n\
             Try: clawbox down {}",
            opts.vm_number
        )));
    }
    orch.launch(&opts.launch_options(false))?;
    if !wait_for_running(orch.backend, vm_name, POST_LAUNCH_TIMEOUT, LIFECYCLE_POLL)? {
        return Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' did not transition to running state after GUI relaunch.\n\
             Try: clawbox launch {}",
            opts.vm_number
        )));
    }
    Ok(())
}

fn ensure_running_after_provision(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    opts: &UpOptions,
    provision_ran: bool,
) -> Result<(), UserFacingError> {
    if !provision_ran || orch.backend.running(vm_name)? {
        return Ok(());
    }

    if !wait_for_running(orch.backend, vm_name, POST_PROVISION_GRACE, LIFECYCLE_POLL)? {
        println!("VM '{vm_name}' is not running after provisioning; launching it...");
        orch.launch(&opts.launch_options(false))?;
        if !wait_for_running(orch.backend, vm_name, POST_RELAUNCH_TIMEOUT, LIFECYCLE_POLL)? {
            return Err(UserFacingError::new(format!(
                "Error: VM '{vm_name}' did not return to running state after provisioning.\n\
                 Rerun:\n  {}",
                render_up_command(opts)
            )));
        }
    }
    Ok(())
}

pub(super) fn up(orch: &Orchestrator<'_>, opts: &UpOptions) -> Result<(), UserFacingError> {
    validate_profile_mount_args(
        opts.profile,
        &opts.openclaw_source,
        &opts.openclaw_payload,
        &opts.signal_payload,
    )?;
    let desired_signal_payload = !opts.signal_payload.is_empty();
    validate_feature_flags(
        opts.profile,
        opts.services,
        desired_signal_payload,
        &opts.signal_payload,
    )?;
    validate_dirs(&[&opts.openclaw_source, &opts.openclaw_payload, &opts.signal_payload])?;

    // Hygiene sweep: stale watchers and sync sessions from crashed runs.
    reconcile_vm_watchers(orch.backend, &orch.ctx.state_dir, &orch.ctx.lock_root);
    reconcile_vm_sync(orch.sync, orch.backend, &orch.ctx.ssh_dir, &orch.ctx.state_dir);

    let vm_name = orch.ctx.vm_name_for(opts.vm_number);
    orch.ensure_secrets_file(true)?;

    let mut created_vm = false;
    if !orch.backend.exists(&vm_name)? {
        println!("VM '{vm_name}' does not exist; creating it...");
        orch.create(opts.vm_number)?;
        created_vm = true;
        if !orch.backend.exists(&vm_name)? {
            return Err(UserFacingError::new(format!(
                "Error: VM '{vm_name}' was not found after create completed.\n\
                 Check tart output and verify the base image exists: {}",
                orch.ctx.base_image
            )));
        }
    }

    let was_running_at_entry = orch.backend.running(&vm_name)?;
    let provision_reason =
        compute_up_provision_reason(orch, opts, created_vm, desired_signal_payload)?;

    let launched_headless =
        ensure_vm_running_for_up(orch, &vm_name, opts, !provision_reason.is_empty())?;

    let mut provision_ran = false;
    if !provision_reason.is_empty() {
        println!("Provisioning is required for '{vm_name}' ({provision_reason}).");
        if opts.profile.is_developer() {
            let preflight_timeout =
                Duration::from_secs(orch.ctx.vm_boot_timeout_seconds.min(120));
            let shell = orch.bootstrap_shell();
            super::preflight::preflight_developer_mounts(
                orch,
                &shell,
                &vm_name,
                opts.vm_number,
                &opts.openclaw_payload,
                &opts.signal_payload,
                desired_signal_payload,
                preflight_timeout,
            )?;
        }
        orch.provision(&ProvisionOptions {
            vm_number: opts.vm_number,
            profile: opts.profile,
            services: opts.services,
            enable_signal_payload: desired_signal_payload,
            // launch() already activated sync when it ran in this process.
            sync_already_active: opts.profile.is_developer() && !was_running_at_entry,
        })?;
        provision_ran = true;

        relaunch_gui_after_headless_provision(orch, &vm_name, opts, launched_headless)?;
    } else {
        println!("Provision marker found for '{vm_name}'; skipping provisioning.");
        println!("  If this VM is not actually provisioned, recreate it with:");
        println!("{}", render_recreate_commands(opts));
    }

    println!();
    ensure_running_after_provision(orch, &vm_name, opts, provision_ran)?;

    // A developer VM that was already running never went through launch in
    // this process, so its sync sessions may be stale.
    if opts.profile.is_developer() && was_running_at_entry && !provision_ran {
        activate_vm_sync(
            orch,
            &vm_name,
            &opts.sync_paths(),
            SyncCredential::Auto,
            "cli",
            "up on running VM",
        )?;
    }

    if orch.backend.running(&vm_name)? {
        if provision_ran {
            println!("Clawbox is ready: {vm_name}");
        } else {
            println!("Clawbox is running: {vm_name} (provisioning skipped)");
        }
        return Ok(());
    }

    Err(UserFacingError::new(format!(
        "Error: VM '{vm_name}' is not running after orchestration.\nRerun:\n  {}",
        render_up_command(opts)
    )))
}

pub(super) fn recreate(orch: &Orchestrator<'_>, opts: &UpOptions) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(opts.vm_number);
    println!("Clean recreate requested for '{vm_name}'.");
    if orch.backend.exists(&vm_name)? {
        orch.down(opts.vm_number)?;
    }
    orch.delete(opts.vm_number)?;
    up(orch, opts)
}

#[cfg(test)]
#[path = "up_tests.rs"]
mod tests;
