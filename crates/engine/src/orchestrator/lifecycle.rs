// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `create` and `launch`.

use std::time::Duration;

use clawbox_adapters::wait_for_running;
use clawbox_core::tail_lines;

use crate::error::UserFacingError;
use crate::locks::{
    acquire_path_lock, OPENCLAW_PAYLOAD_LOCK, OPENCLAW_SOURCE_LOCK, SIGNAL_PAYLOAD_LOCK,
};

use super::preflight::ensure_signal_payload_host_marker;
use super::sync_activation::{activate_vm_sync, SyncCredential, SyncPaths};
use super::validate::{validate_dirs, validate_profile_mount_args, with_virtualization_limit_hint};
use super::{LaunchOptions, Orchestrator};

const LAUNCH_POLL: Duration = Duration::from_secs(1);

pub(super) fn create_vm(orch: &Orchestrator<'_>, vm_number: u32) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(vm_number);
    if orch.backend.exists(&vm_name)? {
        return Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' already exists. Delete it first with: clawbox delete {vm_number}"
        )));
    }

    if let Err(e) = orch.backend.clone_from(&orch.ctx.base_image, &vm_name) {
        return Err(UserFacingError::new(with_virtualization_limit_hint(&format!(
            "Error: Failed to create VM '{vm_name}' from base image '{}'.\n{e}",
            orch.ctx.base_image
        ))));
    }
    println!("Created VM: {vm_name}");
    Ok(())
}

/// Acquire the path locks this launch needs, in lock-kind order.
fn acquire_launch_locks(
    orch: &Orchestrator<'_>,
    vm_name: &str,
    opts: &LaunchOptions,
) -> Result<(), UserFacingError> {
    let lock_root = &orch.ctx.lock_root;
    if !opts.openclaw_source.is_empty() {
        acquire_path_lock(lock_root, &OPENCLAW_SOURCE_LOCK, vm_name, &opts.openclaw_source, orch.backend)?;
    }
    if !opts.openclaw_payload.is_empty() {
        acquire_path_lock(lock_root, &OPENCLAW_PAYLOAD_LOCK, vm_name, &opts.openclaw_payload, orch.backend)?;
    }
    if !opts.signal_payload.is_empty() {
        acquire_path_lock(lock_root, &SIGNAL_PAYLOAD_LOCK, vm_name, &opts.signal_payload, orch.backend)?;
    }
    Ok(())
}

fn launch_sync_paths(opts: &LaunchOptions) -> SyncPaths {
    SyncPaths {
        openclaw_source: opts.openclaw_source.clone().into(),
        openclaw_payload: opts.openclaw_payload.clone().into(),
        signal_payload: if opts.signal_payload.is_empty() {
            None
        } else {
            Some(opts.signal_payload.clone().into())
        },
    }
}

pub(super) fn launch_vm(orch: &Orchestrator<'_>, opts: &LaunchOptions) -> Result<(), UserFacingError> {
    validate_profile_mount_args(
        opts.profile,
        &opts.openclaw_source,
        &opts.openclaw_payload,
        &opts.signal_payload,
    )?;
    let vm_name = orch.ctx.vm_name_for(opts.vm_number);
    orch.require_vm_exists(&vm_name, opts.vm_number)?;

    if orch.backend.running(&vm_name)? {
        println!("VM '{vm_name}' is already running.");
        if opts.profile.is_developer() {
            validate_dirs(&[&opts.openclaw_source, &opts.openclaw_payload, &opts.signal_payload])?;
            acquire_launch_locks(orch, &vm_name, opts)?;
            if !opts.signal_payload.is_empty() {
                ensure_signal_payload_host_marker(orch, &opts.signal_payload, &vm_name)?;
            }
            orch.watchers.start(&orch.ctx.state_dir, &vm_name)?;
            activate_vm_sync(
                orch,
                &vm_name,
                &launch_sync_paths(opts),
                SyncCredential::Auto,
                "cli",
                "launch on running VM",
            )?;
        }
        return Ok(());
    }

    validate_dirs(&[&opts.openclaw_source, &opts.openclaw_payload, &opts.signal_payload])?;
    acquire_launch_locks(orch, &vm_name, opts)?;
    if !opts.signal_payload.is_empty() {
        ensure_signal_payload_host_marker(orch, &opts.signal_payload, &vm_name)?;
    }

    let mut run_args: Vec<String> = Vec::new();
    if opts.profile.is_developer() {
        run_args.push(format!("--dir=openclaw-source:{}", opts.openclaw_source));
        run_args.push(format!("--dir=openclaw-payload:{}", opts.openclaw_payload));
    }
    if !opts.signal_payload.is_empty() {
        run_args.push(format!("--dir=signal-cli-payload:{}", opts.signal_payload));
    }
    if opts.headless {
        run_args.push("--no-graphics".to_string());
    }

    println!("Launching {vm_name} (profile: {})...", opts.profile);
    if opts.profile.is_developer() {
        println!("  --openclaw-source     {}", opts.openclaw_source);
        println!("  --openclaw-payload    {}", opts.openclaw_payload);
    }
    if !opts.signal_payload.is_empty() {
        println!("  --signal-cli-payload  {}", opts.signal_payload);
    }
    if opts.headless {
        println!("  launch mode:          headless");
    }
    println!();

    let launch_log_file = orch.ctx.launch_log_file(&vm_name);
    let mut handle = match orch.backend.run_in_background(&vm_name, &run_args, &launch_log_file) {
        Ok(handle) => handle,
        Err(e) => {
            return Err(UserFacingError::new(with_virtualization_limit_hint(&format!(
                "Error: Failed to launch VM '{vm_name}'.\n{e}"
            ))));
        }
    };
    std::thread::sleep(Duration::from_secs(1));

    if handle.try_exit_code().is_some() {
        let mut message =
            vec![format!("Error: tart run exited before '{vm_name}' reached a running state.")];
        let tail = tail_lines(&launch_log_file, 20);
        if !tail.is_empty() {
            message.push(format!("Recent tart output ({}):", launch_log_file.display()));
            message.push(tail);
        }
        return Err(UserFacingError::new(with_virtualization_limit_hint(&message.join("\n"))));
    }

    let running_timeout = Duration::from_secs(orch.ctx.launch_running_timeout_seconds);
    if !wait_for_running(orch.backend, &vm_name, running_timeout, LAUNCH_POLL)? {
        let mut message = vec![
            format!(
                "Error: '{vm_name}' did not enter running state within {}s.",
                running_timeout.as_secs()
            ),
            format!("tart output log: {}", launch_log_file.display()),
        ];
        let tail = tail_lines(&launch_log_file, 20);
        if !tail.is_empty() {
            message.push(tail);
        }
        return Err(UserFacingError::new(with_virtualization_limit_hint(&message.join("\n"))));
    }

    println!("VM started in background (PID {}).", handle.pid());

    orch.watchers.start(&orch.ctx.state_dir, &vm_name)?;
    if opts.profile.is_developer() {
        activate_vm_sync(
            orch,
            &vm_name,
            &launch_sync_paths(opts),
            SyncCredential::Auto,
            "cli",
            "launch",
        )?;
    }
    Ok(())
}
