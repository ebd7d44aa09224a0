// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote probe runtime: short guest-side shell commands whose output
//! is parsed into `path=status` tokens.
//!
//! Status tokens are `mounted`, `dir`, `missing`, and `ok`. Paths that are
//! never observed stay `unknown`. Unparseable lines are ignored; ansible
//! wraps remote stdout in its own chatter, so the parser scans every line
//! for known tokens instead of trusting the stream shape.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ansible::{run_ansible_shell, RemoteShellContext, RemoteShellError};
use crate::process::{sh_quote, CommandOutput};

pub const STATUS_UNKNOWN: &str = "unknown";
pub const PROBE_POLL: Duration = Duration::from_secs(2);

const STATUS_TOKENS: [&str; 4] = ["mounted", "dir", "missing", "ok"];

/// A remote-shell seam: run `shell_cmd` in the guest as `target`.
pub trait RemoteShell {
    fn run_shell(
        &self,
        target: &str,
        shell_cmd: &str,
        become_root: bool,
        inventory_path: Option<&str>,
    ) -> Result<CommandOutput, RemoteShellError>;
}

/// A credential-parameterized shell seam, for callers that pick the guest
/// account per invocation (bootstrap admin vs provisioned VM user).
pub trait ShellRunner {
    #[allow(clippy::too_many_arguments)]
    fn run_shell_as(
        &self,
        target: &str,
        shell_cmd: &str,
        user: &str,
        password: &str,
        become_root: bool,
        inventory_path: Option<&str>,
    ) -> Result<CommandOutput, RemoteShellError>;
}

/// The production runner: ansible with password auth.
#[derive(Debug, Clone)]
pub struct AnsibleRunner {
    pub context: RemoteShellContext,
}

impl ShellRunner for AnsibleRunner {
    fn run_shell_as(
        &self,
        target: &str,
        shell_cmd: &str,
        user: &str,
        password: &str,
        become_root: bool,
        inventory_path: Option<&str>,
    ) -> Result<CommandOutput, RemoteShellError> {
        let inventory = inventory_path.unwrap_or(&self.context.default_inventory_path);
        run_ansible_shell(&self.context, inventory, target, shell_cmd, user, password, become_root)
    }
}

/// A [`ShellRunner`] with credentials bound, usable wherever a plain
/// [`RemoteShell`] is expected.
pub struct CredentialedShell<'a> {
    pub runner: &'a dyn ShellRunner,
    pub user: String,
    pub password: String,
}

impl RemoteShell for CredentialedShell<'_> {
    fn run_shell(
        &self,
        target: &str,
        shell_cmd: &str,
        become_root: bool,
        inventory_path: Option<&str>,
    ) -> Result<CommandOutput, RemoteShellError> {
        self.runner.run_shell_as(
            target,
            shell_cmd,
            &self.user,
            &self.password,
            become_root,
            inventory_path,
        )
    }
}

/// Result of one probe round.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub exit_code: i32,
    pub statuses: BTreeMap<String, String>,
    pub last_error: String,
}

impl ProbeOutcome {
    pub fn all_ok(&self) -> bool {
        self.statuses.values().all(|status| status == "ok")
    }
}

/// Run one probe and classify each path by the tokens in stdout.
pub fn run_path_probe(
    shell: &dyn RemoteShell,
    target: &str,
    shell_cmd: &str,
    paths: &[String],
    inventory_path: Option<&str>,
) -> Result<ProbeOutcome, RemoteShellError> {
    let output = shell.run_shell(target, shell_cmd, false, inventory_path)?;
    let statuses = parse_path_statuses(&output.stdout, paths);
    let last_error = {
        let err = output.stderr.trim();
        if err.is_empty() { output.stdout.trim() } else { err }.to_string()
    };
    Ok(ProbeOutcome { exit_code: output.exit_code, statuses, last_error })
}

/// Poll the probe every 2 seconds until `is_success` or `timeout`.
/// Returns `(succeeded, last_statuses, last_error)` with the statuses of
/// the final round.
pub fn wait_for_probe(
    shell: &dyn RemoteShell,
    target: &str,
    shell_cmd: &str,
    paths: &[String],
    timeout: Duration,
    inventory_path: Option<&str>,
    is_success: impl Fn(i32, &BTreeMap<String, String>) -> bool,
) -> Result<(bool, BTreeMap<String, String>, String), RemoteShellError> {
    let mut waited = Duration::ZERO;
    let mut last_statuses: BTreeMap<String, String> =
        paths.iter().map(|p| (p.clone(), STATUS_UNKNOWN.to_string())).collect();
    let mut last_error = String::new();

    while waited < timeout {
        let outcome = run_path_probe(shell, target, shell_cmd, paths, inventory_path)?;
        last_statuses = outcome.statuses;
        last_error = outcome.last_error;
        if is_success(outcome.exit_code, &last_statuses) {
            return Ok((true, last_statuses, last_error));
        }
        std::thread::sleep(PROBE_POLL);
        waited += PROBE_POLL;
    }

    Ok((false, last_statuses, last_error))
}

/// One shell command that reports, per path: present in the mount table
/// (`mounted`), else a directory (`dir`), else `missing`.
pub fn mount_status_command(mount_paths: &[String]) -> String {
    let clauses: Vec<String> = mount_paths
        .iter()
        .map(|path| {
            let quoted_path = sh_quote(path);
            let mount_probe = sh_quote(&format!(" on {path} ("));
            format!(
                "if /sbin/mount | /usr/bin/grep -F -- {mount_probe} >/dev/null 2>&1; then \
                 printf '%s=%s\\n' {quoted_path} mounted; \
                 elif [ -d {quoted_path} ]; then \
                 printf '%s=%s\\n' {quoted_path} dir; \
                 else printf '%s=%s\\n' {quoted_path} missing; fi"
            )
        })
        .collect();
    clauses.join("; ")
}

/// Scan stdout for `path=status` tokens, tolerating shell quoting around
/// the path. Unobserved paths stay `unknown`.
pub fn parse_path_statuses(stdout: &str, paths: &[String]) -> BTreeMap<String, String> {
    let mut statuses: BTreeMap<String, String> =
        paths.iter().map(|p| (p.clone(), STATUS_UNKNOWN.to_string())).collect();

    for raw in stdout.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        for path in paths {
            if statuses.get(path).map(String::as_str) != Some(STATUS_UNKNOWN) {
                continue;
            }
            for status in STATUS_TOKENS {
                let bare = format!("{path}={status}");
                let single = format!("'{path}'={status}");
                let double = format!("\"{path}\"={status}");
                if line.contains(&bare) || line.contains(&single) || line.contains(&double) {
                    statuses.insert(path.clone(), status.to_string());
                    break;
                }
            }
        }
    }
    statuses
}

/// Indented `- path: status` lines, in the order of `paths`.
pub fn format_path_statuses(paths: &[String], statuses: &BTreeMap<String, String>) -> String {
    paths
        .iter()
        .map(|path| {
            let status = statuses.get(path).map(String::as_str).unwrap_or(STATUS_UNKNOWN);
            format!("    - {path}: {status}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRemoteShell;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Scripted remote shell: pops one canned output per call and records
    /// every command it was asked to run.
    #[derive(Debug, Default)]
    pub struct FakeRemoteShell {
        state: Mutex<FakeShellState>,
    }

    #[derive(Debug, Default)]
    struct FakeShellState {
        responses: Vec<CommandOutput>,
        calls: Vec<(String, String, bool)>,
    }

    impl FakeRemoteShell {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, FakeShellState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Queue a response; calls consume them in order, and the last
        /// response repeats once the queue is drained.
        pub fn push_response(&self, exit_code: i32, stdout: &str, stderr: &str) {
            self.lock().responses.push(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            });
        }

        pub fn with_response(self, exit_code: i32, stdout: &str, stderr: &str) -> Self {
            self.push_response(exit_code, stdout, stderr);
            self
        }

        pub fn calls(&self) -> Vec<(String, String, bool)> {
            self.lock().calls.clone()
        }
    }

    impl RemoteShell for FakeRemoteShell {
        fn run_shell(
            &self,
            target: &str,
            shell_cmd: &str,
            become_root: bool,
            _inventory_path: Option<&str>,
        ) -> Result<CommandOutput, RemoteShellError> {
            let mut state = self.lock();
            state.calls.push((target.to_string(), shell_cmd.to_string(), become_root));
            let output = if state.responses.len() > 1 {
                state.responses.remove(0)
            } else {
                state.responses.first().cloned().unwrap_or_default()
            };
            Ok(output)
        }
    }

    impl ShellRunner for FakeRemoteShell {
        fn run_shell_as(
            &self,
            target: &str,
            shell_cmd: &str,
            _user: &str,
            _password: &str,
            become_root: bool,
            inventory_path: Option<&str>,
        ) -> Result<CommandOutput, RemoteShellError> {
            self.run_shell(target, shell_cmd, become_root, inventory_path)
        }
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
