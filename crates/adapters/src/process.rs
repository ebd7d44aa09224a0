// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess plumbing shared by the adapters: captured runs, PID probes,
//! and shell quoting.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// The result of a captured external-tool invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr if nonempty, else stdout, trimmed. The detail line appended
    /// to command-failure errors.
    pub fn details(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        self.stdout.trim().to_string()
    }
}

/// Run a command to completion, capturing stdout and stderr.
pub fn run_captured(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    envs: &[(String, String)],
) -> io::Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd.output()?;
    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command with inherited stdio, returning its exit code. Used for
/// long interactive tools (clone progress bars, ansible-playbook output).
pub fn run_passthrough(program: &str, args: &[String], cwd: Option<&Path>) -> io::Result<i32> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let status = cmd.status()?;
    Ok(status.code().unwrap_or(-1))
}

/// Whether a PID refers to a live process (null-signal probe). A
/// permission error still means the process exists.
pub fn pid_running(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// The command line of a live PID, via `ps`. Empty when the process is
/// gone or `ps` fails.
pub fn pid_command_line(pid: i32) -> String {
    if !pid_running(pid) {
        return String::new();
    }
    let args = vec!["-o".to_string(), "command=".to_string(), "-p".to_string(), pid.to_string()];
    match run_captured("ps", &args, None, &[]) {
        Ok(output) if output.success() => output.stdout.trim().to_string(),
        _ => String::new(),
    }
}

/// Whether `name` resolves to an executable on `PATH`.
pub fn command_on_path(name: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| {
        let candidate = dir.join(name);
        candidate
            .metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    })
}

/// POSIX-shell quote a single word, `shlex.quote` style: safe words pass
/// through, everything else is single-quoted with embedded quotes escaped.
pub fn sh_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"@%+=:,./-_".contains(&b))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
