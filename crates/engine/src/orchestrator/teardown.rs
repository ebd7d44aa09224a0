// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `down`, `delete`, and `ip`.
//!
//! Teardown ordering: the watcher is stopped first (so it cannot race the
//! teardown), sync is torn down while the VM (and therefore SSH) is
//! still alive, then the VM is stopped. Lock cleanup runs on the main
//! paths rather than inside a scoped guard: if `down` itself fails, the
//! user reruns `down`.

use crate::error::UserFacingError;
use crate::locks::cleanup_locks_for_vm;
use crate::sync_flow::teardown_sync_logged;

use super::{Orchestrator, STOP_TIMEOUT};

fn teardown_sync_best_effort(orch: &Orchestrator<'_>, vm_name: &str, flush: bool, reason: &str) {
    if let Err(e) = teardown_sync_logged(
        orch.sync,
        &orch.ctx.ssh_dir,
        &orch.ctx.state_dir,
        vm_name,
        flush,
        "cli",
        reason,
    ) {
        tracing::warn!(vm = vm_name, error = %e, "sync teardown failed");
    }
}

pub(super) fn down_vm(orch: &Orchestrator<'_>, vm_number: u32) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(vm_number);

    if !orch.backend.exists(&vm_name)? {
        orch.watchers.stop(&orch.ctx.state_dir, &vm_name);
        teardown_sync_best_effort(orch, &vm_name, false, "down (vm absent)");
        cleanup_locks_for_vm(&orch.ctx.lock_root, &vm_name);
        println!("VM '{vm_name}' does not exist.");
        return Ok(());
    }

    orch.watchers.stop(&orch.ctx.state_dir, &vm_name);

    if orch.backend.running(&vm_name)? {
        // Flush while the guest is still reachable, then stop.
        teardown_sync_best_effort(orch, &vm_name, true, "down");
        println!("Stopping VM '{vm_name}'...");
        if !orch.stop_vm_and_wait(&vm_name, STOP_TIMEOUT)? {
            return Err(UserFacingError::new(format!(
                "Error: Timed out waiting for VM '{vm_name}' to stop.\n\
                 Try again: clawbox down {vm_number}"
            )));
        }
        println!("VM '{vm_name}' stopped.");
    } else {
        teardown_sync_best_effort(orch, &vm_name, false, "down (vm stopped)");
        println!("VM '{vm_name}' is already stopped.");
    }

    cleanup_locks_for_vm(&orch.ctx.lock_root, &vm_name);
    Ok(())
}

pub(super) fn delete_vm(orch: &Orchestrator<'_>, vm_number: u32) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(vm_number);
    let marker_file = orch.ctx.marker_file(&vm_name);

    if !orch.backend.exists(&vm_name)? {
        orch.watchers.stop(&orch.ctx.state_dir, &vm_name);
        teardown_sync_best_effort(orch, &vm_name, false, "delete (vm absent)");
        let _ = std::fs::remove_file(&marker_file);
        cleanup_locks_for_vm(&orch.ctx.lock_root, &vm_name);
        println!("VM '{vm_name}' does not exist.");
        return Ok(());
    }

    orch.watchers.stop(&orch.ctx.state_dir, &vm_name);

    if orch.backend.running(&vm_name)? {
        teardown_sync_best_effort(orch, &vm_name, true, "delete");
        println!("Stopping VM '{vm_name}' before delete...");
        if !orch.stop_vm_and_wait(&vm_name, STOP_TIMEOUT)? {
            return Err(UserFacingError::new(format!(
                "Error: Timed out waiting for VM '{vm_name}' to stop before deletion.\n\
                 Try again: clawbox delete {vm_number}"
            )));
        }
    } else {
        teardown_sync_best_effort(orch, &vm_name, false, "delete (vm stopped)");
    }

    println!("Deleting VM '{vm_name}'...");
    orch.backend.delete(&vm_name)?;
    if !orch.wait_for_vm_absent(&vm_name, STOP_TIMEOUT)? {
        return Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' still exists after delete attempt.\n\
             Try again: clawbox delete {vm_number}"
        )));
    }

    // Only after the backend confirms absence is local state forgotten.
    let _ = std::fs::remove_file(&marker_file);
    cleanup_locks_for_vm(&orch.ctx.lock_root, &vm_name);
    println!("Deleted VM: {vm_name}");
    Ok(())
}

pub(super) fn ip_vm(orch: &Orchestrator<'_>, vm_number: u32) -> Result<(), UserFacingError> {
    let vm_name = orch.ctx.vm_name_for(vm_number);
    orch.require_vm_exists(&vm_name, vm_number)?;
    orch.require_vm_running(&vm_name, vm_number)?;

    match orch.backend.ip(&vm_name)? {
        Some(ip) => {
            println!("{ip}");
            Ok(())
        }
        None => Err(UserFacingError::new(format!(
            "Error: Could not resolve IP for '{vm_name}'.\n\
             Wait for the VM to finish booting and retry."
        ))),
    }
}

#[cfg(test)]
#[path = "teardown_tests.rs"]
mod tests;
