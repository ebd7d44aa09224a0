// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync teardown with lifecycle events.

use std::path::Path;

use clawbox_adapters::{teardown_vm_sync, SyncCli, SyncError};

use crate::sync_events::emit_sync_event;

/// Tear down a VM's sync state, bracketing the attempt with
/// `teardown_start` / `teardown_ok` / `teardown_error` events.
pub fn teardown_sync_logged(
    sync: &dyn SyncCli,
    ssh_dir: &Path,
    state_dir: &Path,
    vm_name: &str,
    flush: bool,
    actor: &str,
    reason: &str,
) -> Result<(), SyncError> {
    emit_sync_event(state_dir, vm_name, "teardown_start", actor, reason, None);
    match teardown_vm_sync(sync, ssh_dir, state_dir, vm_name, flush) {
        Ok(()) => {
            emit_sync_event(state_dir, vm_name, "teardown_ok", actor, reason, None);
            Ok(())
        }
        Err(e) => {
            emit_sync_event(
                state_dir,
                vm_name,
                "teardown_error",
                actor,
                reason,
                Some(serde_json::json!({ "error": e.to_string() })),
            );
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "sync_flow_tests.rs"]
mod tests;
