// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-shell invocations against the guest via the `ansible` CLI.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::process::{run_captured, CommandOutput};

pub const DEFAULT_INVENTORY_PATH: &str = "inventory/tart_inventory.py";

#[derive(Debug, Error)]
pub enum RemoteShellError {
    #[error("Error: Command not found: {0}")]
    CommandNotFound(String),

    #[error("Error: Could not run command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Settings shared by every remote-shell invocation.
#[derive(Debug, Clone)]
pub struct RemoteShellContext {
    pub ansible_dir: PathBuf,
    pub connect_timeout_seconds: u64,
    pub command_timeout_seconds: u64,
    pub default_inventory_path: String,
}

impl RemoteShellContext {
    pub fn new(ansible_dir: PathBuf, connect_timeout_seconds: u64, command_timeout_seconds: u64) -> Self {
        Self {
            ansible_dir,
            connect_timeout_seconds,
            command_timeout_seconds,
            default_inventory_path: DEFAULT_INVENTORY_PATH.to_string(),
        }
    }
}

/// Build the `ansible … -m shell` argv. `become_root` adds `-b` plus the
/// become variables using the same password.
#[allow(clippy::too_many_arguments)]
pub fn build_shell_command(
    inventory_path: &str,
    target: &str,
    shell_cmd: &str,
    ansible_user: &str,
    ansible_password: &str,
    connect_timeout_seconds: u64,
    command_timeout_seconds: u64,
    become_root: bool,
) -> Vec<String> {
    let mut cmd = vec![
        "ansible".to_string(),
        "-i".to_string(),
        inventory_path.to_string(),
        target.to_string(),
        "-T".to_string(),
        connect_timeout_seconds.to_string(),
        "-m".to_string(),
        "shell".to_string(),
        "-a".to_string(),
        shell_cmd.to_string(),
        "-e".to_string(),
        format!("ansible_user={ansible_user}"),
        "-e".to_string(),
        format!("ansible_password={ansible_password}"),
        "-e".to_string(),
        format!("ansible_command_timeout={command_timeout_seconds}"),
        "-e".to_string(),
        "ansible_become=false".to_string(),
    ];
    if become_root {
        cmd.push("-b".to_string());
        cmd.push("-e".to_string());
        cmd.push("ansible_become=true".to_string());
        cmd.push("-e".to_string());
        cmd.push(format!("ansible_become_password={ansible_password}"));
    }
    cmd
}

/// Run a shell command in the guest, capturing output. Only spawn-level
/// failures are errors; a nonzero remote exit comes back in the output.
#[allow(clippy::too_many_arguments)]
pub fn run_ansible_shell(
    context: &RemoteShellContext,
    inventory_path: &str,
    target: &str,
    shell_cmd: &str,
    ansible_user: &str,
    ansible_password: &str,
    become_root: bool,
) -> Result<CommandOutput, RemoteShellError> {
    let cmd = build_shell_command(
        inventory_path,
        target,
        shell_cmd,
        ansible_user,
        ansible_password,
        context.connect_timeout_seconds,
        context.command_timeout_seconds,
        become_root,
    );
    let envs = vec![("ANSIBLE_HOST_KEY_CHECKING".to_string(), "False".to_string())];
    run_captured(&cmd[0], &cmd[1..], Some(&context.ansible_dir), &envs).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            RemoteShellError::CommandNotFound("ansible".to_string())
        } else {
            RemoteShellError::Spawn { command: "ansible".to_string(), source: e }
        }
    })
}

/// The provisioning-tool seam: run the playbook with inherited stdio and
/// return its exit code.
pub trait Provisioner {
    fn run_playbook(&self, ansible_dir: &Path, args: &[String]) -> Result<i32, RemoteShellError>;
}

/// The real `ansible-playbook` CLI.
#[derive(Debug, Clone, Default)]
pub struct AnsiblePlaybook;

impl Provisioner for AnsiblePlaybook {
    fn run_playbook(&self, ansible_dir: &Path, args: &[String]) -> Result<i32, RemoteShellError> {
        crate::process::run_passthrough("ansible-playbook", args, Some(ansible_dir)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RemoteShellError::CommandNotFound("ansible-playbook".to_string())
            } else {
                RemoteShellError::Spawn { command: "ansible-playbook".to_string(), source: e }
            }
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProvisioner;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Records playbook invocations and returns a configured exit code.
    #[derive(Debug)]
    pub struct FakeProvisioner {
        exit_code: i32,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Default for FakeProvisioner {
        fn default() -> Self {
            Self { exit_code: 0, calls: Mutex::new(Vec::new()) }
        }
    }

    impl FakeProvisioner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(exit_code: i32) -> Self {
            Self { exit_code, calls: Mutex::new(Vec::new()) }
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
        }
    }

    impl Provisioner for FakeProvisioner {
        fn run_playbook(&self, _ansible_dir: &Path, args: &[String]) -> Result<i32, RemoteShellError> {
            self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(args.to_vec());
            Ok(self.exit_code)
        }
    }
}

#[cfg(test)]
#[path = "ansible_tests.rs"]
mod tests;
