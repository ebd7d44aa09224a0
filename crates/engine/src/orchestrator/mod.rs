// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator state machine.
//!
//! Per VM the state space is `ABSENT → STOPPED → RUNNING →
//! RUNNING+PROVISIONED`, with sync activation orthogonal for the
//! developer profile. Each command composes backend calls, path locks,
//! the watcher supervisor, and the sync controller into one transition
//! with preflights and recovery.

mod lifecycle;
mod preflight;
mod provision;
mod status_cmd;
mod sync_activation;
mod teardown;
mod up;
mod validate;

pub use provision::ProvisionOptions;
pub use sync_activation::SyncCredential;
pub use up::UpOptions;

use std::time::Duration;

use clawbox_adapters::{CredentialedShell, Provisioner, ShellRunner, SyncCli, VmBackend};
use clawbox_core::{ensure_vm_password_file, missing_secrets_message, Profile, SecretsError};

use crate::context::EngineContext;
use crate::error::UserFacingError;
use crate::watcher::WatcherSupervisor;

/// Poll cadence for stop/absence waits.
const LIFECYCLE_POLL: Duration = Duration::from_secs(2);
/// How long `down`/`delete` wait for the backend to reach the target state.
const STOP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub vm_number: u32,
    pub profile: Profile,
    pub openclaw_source: String,
    pub openclaw_payload: String,
    pub signal_payload: String,
    pub headless: bool,
}

/// The orchestration engine: context plus the external-tool seams.
pub struct Orchestrator<'a> {
    pub ctx: &'a EngineContext,
    pub backend: &'a dyn VmBackend,
    pub sync: &'a dyn SyncCli,
    pub shell: &'a dyn ShellRunner,
    pub provisioner: &'a dyn Provisioner,
    pub watchers: &'a dyn WatcherSupervisor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: &'a EngineContext,
        backend: &'a dyn VmBackend,
        sync: &'a dyn SyncCli,
        shell: &'a dyn ShellRunner,
        provisioner: &'a dyn Provisioner,
        watchers: &'a dyn WatcherSupervisor,
    ) -> Self {
        Self { ctx, backend, sync, shell, provisioner, watchers }
    }

    pub fn create(&self, vm_number: u32) -> Result<(), UserFacingError> {
        lifecycle::create_vm(self, vm_number)
    }

    pub fn launch(&self, opts: &LaunchOptions) -> Result<(), UserFacingError> {
        lifecycle::launch_vm(self, opts)
    }

    pub fn provision(&self, opts: &ProvisionOptions) -> Result<(), UserFacingError> {
        provision::provision_vm(self, opts)
    }

    pub fn up(&self, opts: &UpOptions) -> Result<(), UserFacingError> {
        up::up(self, opts)
    }

    pub fn recreate(&self, opts: &UpOptions) -> Result<(), UserFacingError> {
        up::recreate(self, opts)
    }

    pub fn down(&self, vm_number: u32) -> Result<(), UserFacingError> {
        teardown::down_vm(self, vm_number)
    }

    pub fn delete(&self, vm_number: u32) -> Result<(), UserFacingError> {
        teardown::delete_vm(self, vm_number)
    }

    pub fn ip(&self, vm_number: u32) -> Result<(), UserFacingError> {
        teardown::ip_vm(self, vm_number)
    }

    pub fn status_vm(&self, vm_number: u32, as_json: bool) -> Result<(), UserFacingError> {
        status_cmd::status_vm(self, vm_number, as_json)
    }

    pub fn status_environment(&self, as_json: bool) -> Result<(), UserFacingError> {
        status_cmd::status_environment(self, as_json)
    }

    // === Shared helpers ===

    /// Remote shell as the bootstrap admin account.
    pub(crate) fn bootstrap_shell(&self) -> CredentialedShell<'a> {
        CredentialedShell {
            runner: self.shell,
            user: self.ctx.bootstrap_admin_user.clone(),
            password: self.ctx.bootstrap_admin_password.clone(),
        }
    }

    pub(crate) fn require_vm_exists(
        &self,
        vm_name: &str,
        vm_number: u32,
    ) -> Result<(), UserFacingError> {
        if self.backend.exists(vm_name)? {
            return Ok(());
        }
        Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' does not exist.\nCreate it first with: clawbox create {vm_number}"
        )))
    }

    pub(crate) fn require_vm_running(
        &self,
        vm_name: &str,
        vm_number: u32,
    ) -> Result<(), UserFacingError> {
        if self.backend.running(vm_name)? {
            return Ok(());
        }
        Err(UserFacingError::new(format!(
            "Error: VM '{vm_name}' is not running.\nStart it first with: clawbox launch {vm_number}"
        )))
    }

    /// Poll the backend until the VM reports an IP or the timeout passes.
    pub(crate) fn resolve_vm_ip(
        &self,
        vm_name: &str,
        timeout: Duration,
    ) -> Result<String, UserFacingError> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(ip) = self.backend.ip(vm_name)? {
                return Ok(ip);
            }
            if waited >= timeout {
                break;
            }
            std::thread::sleep(LIFECYCLE_POLL);
            waited += LIFECYCLE_POLL;
        }
        Err(UserFacingError::new(format!(
            "Error: Timed out waiting for '{vm_name}' to report an IP address.\n\
             Ensure the VM is running and fully booted, then retry."
        )))
    }

    /// Best-effort stop then poll until stopped. Returns the final
    /// stopped observation.
    pub(crate) fn stop_vm_and_wait(
        &self,
        vm_name: &str,
        timeout: Duration,
    ) -> Result<bool, UserFacingError> {
        self.backend.stop(vm_name)?;
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if !self.backend.running(vm_name)? {
                return Ok(true);
            }
            std::thread::sleep(LIFECYCLE_POLL);
            waited += LIFECYCLE_POLL;
        }
        Ok(!self.backend.running(vm_name)?)
    }

    pub(crate) fn wait_for_vm_absent(
        &self,
        vm_name: &str,
        timeout: Duration,
    ) -> Result<bool, UserFacingError> {
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if !self.backend.exists(vm_name)? {
                return Ok(true);
            }
            std::thread::sleep(LIFECYCLE_POLL);
            waited += LIFECYCLE_POLL;
        }
        Ok(!self.backend.exists(vm_name)?)
    }

    /// Make sure the secrets file exists, creating the default one when
    /// allowed.
    pub(crate) fn ensure_secrets_file(&self, create_if_missing: bool) -> Result<(), UserFacingError> {
        match ensure_vm_password_file(&self.ctx.secrets_file, create_if_missing) {
            Ok(true) => {
                println!("Created secrets file: {}", self.ctx.secrets_file.display());
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(SecretsError::Missing(path)) => {
                Err(UserFacingError::new(missing_secrets_message(&path)))
            }
            Err(e) => Err(UserFacingError::new(format!(
                "Error: Could not write secrets file '{}': {e}",
                self.ctx.secrets_file.display()
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;
