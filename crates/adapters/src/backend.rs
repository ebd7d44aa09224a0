// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The VM backend adapter: a typed wrapper over the `tart` CLI.
//!
//! `stop` and `delete` are best-effort (the backend reports failure via
//! state, not exit codes, during shutdown races); everything else turns a
//! nonzero exit into a [`BackendError`] carrying the captured output.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::process::{run_captured, run_passthrough, CommandOutput};

/// Errors from the VM backend CLI.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Error: Command not found: {0}")]
    CommandNotFound(String),

    #[error("Error: Could not run command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Error: Command failed (exit {exit_code}): {command}{}", details_suffix(.details))]
    CommandFailed { command: String, exit_code: i32, details: String },

    #[error("Could not parse tart list output: {0}")]
    Protocol(String),
}

fn details_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!("\n{details}")
    }
}

/// One row of `tart list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRecord {
    pub name: String,
    pub running: bool,
}

/// Handle to a detached `tart run` child.
#[derive(Debug)]
pub struct LaunchHandle {
    pid: u32,
    child: Option<std::process::Child>,
    exited: Option<i32>,
}

impl LaunchHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit code if the child has already exited, `None` while running.
    pub fn try_exit_code(&mut self) -> Option<i32> {
        if let Some(code) = self.exited {
            return Some(code);
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                self.exited = Some(code);
                Some(code)
            }
            _ => None,
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn fake(pid: u32, exited: Option<i32>) -> Self {
        Self { pid, child: None, exited }
    }
}

/// Operations the orchestrator needs from the hypervisor CLI.
pub trait VmBackend {
    fn list(&self) -> Result<Vec<VmRecord>, BackendError>;

    fn exists(&self, vm_name: &str) -> Result<bool, BackendError> {
        Ok(self.list()?.iter().any(|vm| vm.name == vm_name))
    }

    fn running(&self, vm_name: &str) -> Result<bool, BackendError> {
        Ok(self.list()?.iter().any(|vm| vm.name == vm_name && vm.running))
    }

    fn clone_from(&self, base_image: &str, vm_name: &str) -> Result<(), BackendError>;

    /// Best-effort stop; shutdown races are resolved by polling `running`.
    fn stop(&self, vm_name: &str) -> Result<(), BackendError>;

    /// Best-effort delete; callers poll `exists` for confirmation.
    fn delete(&self, vm_name: &str) -> Result<(), BackendError>;

    /// Resolve the guest IP: agent resolver first, then the default one.
    /// `None` when both come back empty or nonzero.
    fn ip(&self, vm_name: &str) -> Result<Option<String>, BackendError>;

    /// Launch the VM detached, with stdout/stderr redirected to `log_file`.
    fn run_in_background(
        &self,
        vm_name: &str,
        run_args: &[String],
        log_file: &Path,
    ) -> Result<LaunchHandle, BackendError>;
}

/// Poll `running` until it is true or `timeout` elapses. Returns the
/// final observation.
pub fn wait_for_running(
    backend: &dyn VmBackend,
    vm_name: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<bool, BackendError> {
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if backend.running(vm_name)? {
            return Ok(true);
        }
        std::thread::sleep(poll);
        waited += poll;
    }
    backend.running(vm_name)
}

/// Decode the `tart list --format json` payload.
fn parse_list_payload(stdout: &str) -> Result<Vec<VmRecord>, BackendError> {
    let payload: serde_json::Value =
        serde_json::from_str(stdout).map_err(|e| BackendError::Protocol(e.to_string()))?;
    let serde_json::Value::Array(rows) = payload else {
        return Err(BackendError::Protocol("expected a JSON list".to_string()));
    };

    let mut vms = Vec::new();
    for row in rows {
        // Rows without a string Name are skipped; a non-boolean Running
        // reads as stopped.
        let Some(name) = row.get("Name").and_then(|v| v.as_str()) else {
            continue;
        };
        let running = row.get("Running").and_then(|v| v.as_bool()).unwrap_or(false);
        vms.push(VmRecord { name: name.to_string(), running });
    }
    Ok(vms)
}

/// The real `tart` CLI.
#[derive(Debug, Clone)]
pub struct TartBackend {
    bin: String,
}

impl Default for TartBackend {
    fn default() -> Self {
        Self { bin: "tart".to_string() }
    }
}

impl TartBackend {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[String], check: bool) -> Result<CommandOutput, BackendError> {
        let output = run_captured(&self.bin, args, None, &[]).map_err(|e| self.spawn_error(args, e))?;
        if check && !output.success() {
            return Err(BackendError::CommandFailed {
                command: self.render_command(args),
                exit_code: output.exit_code,
                details: output.details(),
            });
        }
        Ok(output)
    }

    fn spawn_error(&self, args: &[String], source: io::Error) -> BackendError {
        if source.kind() == io::ErrorKind::NotFound {
            return BackendError::CommandNotFound(self.bin.clone());
        }
        BackendError::Spawn { command: self.render_command(args), source }
    }

    fn render_command(&self, args: &[String]) -> String {
        let mut parts = vec![self.bin.clone()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }
}

impl VmBackend for TartBackend {
    fn list(&self) -> Result<Vec<VmRecord>, BackendError> {
        let args = vec!["list".to_string(), "--format".to_string(), "json".to_string()];
        let output = self.run(&args, true)?;
        parse_list_payload(&output.stdout)
    }

    fn clone_from(&self, base_image: &str, vm_name: &str) -> Result<(), BackendError> {
        let args =
            vec!["clone".to_string(), base_image.to_string(), vm_name.to_string()];
        let exit_code = run_passthrough(&self.bin, &args, None)
            .map_err(|e| self.spawn_error(&args, e))?;
        if exit_code != 0 {
            return Err(BackendError::CommandFailed {
                command: self.render_command(&args),
                exit_code,
                details: String::new(),
            });
        }
        Ok(())
    }

    fn stop(&self, vm_name: &str) -> Result<(), BackendError> {
        let args = vec!["stop".to_string(), vm_name.to_string()];
        self.run(&args, false)?;
        Ok(())
    }

    fn delete(&self, vm_name: &str) -> Result<(), BackendError> {
        let args = vec!["delete".to_string(), vm_name.to_string()];
        self.run(&args, false)?;
        Ok(())
    }

    fn ip(&self, vm_name: &str) -> Result<Option<String>, BackendError> {
        let attempts = [
            vec!["ip".to_string(), "--resolver=agent".to_string(), vm_name.to_string()],
            vec!["ip".to_string(), vm_name.to_string()],
        ];
        for args in attempts {
            let output = self.run(&args, false)?;
            let ip = output.stdout.trim();
            if output.success() && !ip.is_empty() {
                return Ok(Some(ip.to_string()));
            }
        }
        Ok(None)
    }

    fn run_in_background(
        &self,
        vm_name: &str,
        run_args: &[String],
        log_file: &Path,
    ) -> Result<LaunchHandle, BackendError> {
        use std::os::unix::process::CommandExt;

        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BackendError::Spawn {
                command: format!("{} run {vm_name}", self.bin),
                source: e,
            })?;
        }
        let log = std::fs::File::create(log_file).map_err(|e| BackendError::Spawn {
            command: format!("{} run {vm_name}", self.bin),
            source: e,
        })?;
        let log_err = log.try_clone().map_err(|e| BackendError::Spawn {
            command: format!("{} run {vm_name}", self.bin),
            source: e,
        })?;

        let mut cmd = Command::new(&self.bin);
        cmd.arg("run")
            .arg(vm_name)
            .args(run_args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BackendError::CommandNotFound(self.bin.clone())
            } else {
                BackendError::Spawn {
                    command: format!("{} run {vm_name}", self.bin),
                    source: e,
                }
            }
        })?;
        debug!(vm = vm_name, pid = child.id(), "launched VM in background");
        Ok(LaunchHandle { pid: child.id(), child: Some(child), exited: None })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBackend;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeState {
        vms: BTreeMap<String, bool>,
        ips: BTreeMap<String, String>,
        clone_error: Option<String>,
        launch_marks_running: bool,
        launch_exit: Option<i32>,
        calls: Vec<String>,
    }

    /// In-memory backend for engine tests: VMs are rows in a map, launch
    /// optionally flips them to running, and every call is recorded.
    #[derive(Debug, Default)]
    pub struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        pub fn with_vm(self, name: &str, running: bool) -> Self {
            self.lock().vms.insert(name.to_string(), running);
            self
        }

        pub fn with_ip(self, name: &str, ip: &str) -> Self {
            self.lock().ips.insert(name.to_string(), ip.to_string());
            self
        }

        /// Make `run_in_background` flip the VM to running, simulating a
        /// successful boot.
        pub fn with_boot_on_launch(self) -> Self {
            self.lock().launch_marks_running = true;
            self
        }

        pub fn with_clone_error(self, message: &str) -> Self {
            self.lock().clone_error = Some(message.to_string());
            self
        }

        pub fn with_launch_exit(self, code: i32) -> Self {
            self.lock().launch_exit = Some(code);
            self
        }

        pub fn set_running(&self, name: &str, running: bool) {
            self.lock().vms.insert(name.to_string(), running);
        }

        pub fn remove_vm(&self, name: &str) {
            self.lock().vms.remove(name);
        }

        pub fn calls(&self) -> Vec<String> {
            self.lock().calls.clone()
        }

        fn record(&self, call: String) {
            self.lock().calls.push(call);
        }
    }

    impl VmBackend for FakeBackend {
        fn list(&self) -> Result<Vec<VmRecord>, BackendError> {
            let state = self.lock();
            Ok(state
                .vms
                .iter()
                .map(|(name, running)| VmRecord { name: name.clone(), running: *running })
                .collect())
        }

        fn clone_from(&self, base_image: &str, vm_name: &str) -> Result<(), BackendError> {
            self.record(format!("clone {base_image} {vm_name}"));
            let mut state = self.lock();
            if let Some(message) = state.clone_error.clone() {
                return Err(BackendError::CommandFailed {
                    command: format!("tart clone {base_image} {vm_name}"),
                    exit_code: 1,
                    details: message,
                });
            }
            state.vms.insert(vm_name.to_string(), false);
            Ok(())
        }

        fn stop(&self, vm_name: &str) -> Result<(), BackendError> {
            self.record(format!("stop {vm_name}"));
            self.lock().vms.insert(vm_name.to_string(), false);
            Ok(())
        }

        fn delete(&self, vm_name: &str) -> Result<(), BackendError> {
            self.record(format!("delete {vm_name}"));
            self.lock().vms.remove(vm_name);
            Ok(())
        }

        fn ip(&self, vm_name: &str) -> Result<Option<String>, BackendError> {
            Ok(self.lock().ips.get(vm_name).cloned())
        }

        fn run_in_background(
            &self,
            vm_name: &str,
            run_args: &[String],
            _log_file: &Path,
        ) -> Result<LaunchHandle, BackendError> {
            self.record(format!("run {vm_name} {}", run_args.join(" ")));
            let mut state = self.lock();
            if state.launch_marks_running {
                state.vms.insert(vm_name.to_string(), true);
            }
            Ok(LaunchHandle::fake(4242, state.launch_exit))
        }
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
