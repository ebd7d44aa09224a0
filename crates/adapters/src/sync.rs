// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync controller: lifecycle of bidirectional host↔guest sessions
//! over the `mutagen` CLI, plus the SSH plumbing the sync daemon needs to
//! reach the guest.
//!
//! Sessions are addressed by a stable name `clawbox-<vm>-<kind>` and
//! labeled `clawbox.vm=<vm>`, `clawbox.managed=true`, `clawbox.kind=<kind>`
//! so teardown and diagnostics can select by label without knowing which
//! kinds were created. Host SSH configuration lives in two fenced regions:
//! an `Include` line in `~/.ssh/config` and a per-VM `Host` stanza in the
//! managed file, both upserted atomically.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use clawbox_core::fsio::{atomic_write_text, read_text_or_empty};

use crate::backend::VmBackend;
use crate::probe::RemoteShell;
use crate::process::{command_on_path, run_captured, sh_quote, CommandOutput};

pub const SSH_CONFIG_INCLUDE: &str = "Include ~/.ssh/clawbox_mutagen_config";
pub const MANAGED_SSH_CONFIG_NAME: &str = "clawbox_mutagen_config";
const ACTIVE_VMS_FILE: &str = "active_vms.json";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Error: Command not found: mutagen")]
    CliUnavailable,

    #[error("Error: Could not run command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Error: Command failed (exit {exit_code}): {command}{}", details_suffix(.details))]
    CommandFailed { command: String, exit_code: i32, details: String },

    #[error("Error: Could not generate sync keypair for '{vm_name}': {details}")]
    Keygen { vm_name: String, details: String },

    #[error("Error: Failed to {step} in guest.{}", details_suffix(.details))]
    Guest { step: String, details: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn details_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!("\n{details}")
    }
}

/// One sync session to establish for a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub kind: String,
    pub host_path: PathBuf,
    pub guest_path: String,
    pub ignore_vcs: bool,
    pub ignored_paths: Vec<String>,
    /// Required sessions gate readiness; optional ones may still be
    /// propagating when activation reports success.
    pub ready_required: bool,
}

impl SessionSpec {
    pub fn new(kind: &str, host_path: PathBuf, guest_path: String) -> Self {
        Self {
            kind: kind.to_string(),
            host_path,
            guest_path,
            ignore_vcs: false,
            ignored_paths: Vec::new(),
            ready_required: true,
        }
    }
}

/// The sync CLI seam.
pub trait SyncCli {
    fn available(&self) -> bool;

    /// Run a mutagen subcommand. With `check`, a nonzero exit is an error.
    fn run(&self, args: &[String], check: bool) -> Result<CommandOutput, SyncError>;
}

/// The real `mutagen` CLI.
#[derive(Debug, Clone, Default)]
pub struct MutagenCli;

impl SyncCli for MutagenCli {
    fn available(&self) -> bool {
        command_on_path("mutagen")
    }

    fn run(&self, args: &[String], check: bool) -> Result<CommandOutput, SyncError> {
        let render = || {
            let mut parts = vec!["mutagen".to_string()];
            parts.extend(args.iter().cloned());
            parts.join(" ")
        };
        let output = run_captured("mutagen", args, None, &[]).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SyncError::CliUnavailable
            } else {
                SyncError::Spawn { command: render(), source: e }
            }
        })?;
        if check && !output.success() {
            return Err(SyncError::CommandFailed {
                command: render(),
                exit_code: output.exit_code,
                details: output.details(),
            });
        }
        Ok(output)
    }
}

fn sanitize_vm_name(vm_name: &str) -> String {
    vm_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '-' })
        .collect()
}

/// SSH host alias the sync daemon connects through.
pub fn sync_ssh_alias(vm_name: &str) -> String {
    format!("clawbox-mutagen-{}", sanitize_vm_name(vm_name))
}

pub fn session_name(vm_name: &str, kind: &str) -> String {
    format!("clawbox-{}-{kind}", sanitize_vm_name(vm_name))
}

fn vm_label(vm_name: &str) -> String {
    format!("clawbox.vm={vm_name}")
}

// === SSH alias blocks ===

fn upsert_named_block(
    path: &Path,
    begin_marker: &str,
    end_marker: &str,
    block: &str,
) -> io::Result<()> {
    let existing = read_text_or_empty(path);
    let mut kept = strip_named_block(&existing, begin_marker, end_marker);
    while kept.last().map(String::as_str) == Some("") {
        kept.pop();
    }
    let rendered = if kept.is_empty() {
        format!("{}\n", block.trim_end())
    } else {
        format!("{}\n\n{}\n", kept.join("\n"), block.trim_end())
    };
    atomic_write_text(path, &rendered)
}

fn remove_named_block(path: &Path, begin_marker: &str, end_marker: &str) -> io::Result<()> {
    let existing = read_text_or_empty(path);
    if existing.is_empty() {
        return Ok(());
    }
    let mut kept = strip_named_block(&existing, begin_marker, end_marker);
    while kept.last().map(String::as_str) == Some("") {
        kept.pop();
    }
    let rendered = if kept.is_empty() { String::new() } else { format!("{}\n", kept.join("\n")) };
    atomic_write_text(path, &rendered)
}

fn strip_named_block(existing: &str, begin_marker: &str, end_marker: &str) -> Vec<String> {
    let lines: Vec<&str> = existing.lines().collect();
    let mut kept = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim() == begin_marker {
            i += 1;
            while i < lines.len() && lines[i].trim() != end_marker {
                i += 1;
            }
            if i < lines.len() {
                i += 1;
            }
            continue;
        }
        kept.push(lines[i].to_string());
        i += 1;
    }
    kept
}

fn ensure_main_ssh_config_include(ssh_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(ssh_dir)?;
    let main_config = ssh_dir.join("config");
    let existing = read_text_or_empty(&main_config);
    if existing.contains(SSH_CONFIG_INCLUDE) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(SSH_CONFIG_INCLUDE);
    updated.push('\n');
    atomic_write_text(&main_config, &updated)
}

fn block_markers(vm_name: &str) -> (String, String) {
    (
        format!("# CLAWBOX MUTAGEN BEGIN {vm_name}"),
        format!("# CLAWBOX MUTAGEN END {vm_name}"),
    )
}

/// Upsert the per-VM `Host` stanza and the `Include` line. Returns the
/// alias. Applying twice yields identical file content.
pub fn ensure_ssh_alias(
    ssh_dir: &Path,
    vm_name: &str,
    vm_ip: &str,
    vm_user: &str,
    identity_file: &Path,
) -> io::Result<String> {
    ensure_main_ssh_config_include(ssh_dir)?;
    let alias = sync_ssh_alias(vm_name);
    let (begin, end) = block_markers(vm_name);
    let block = format!(
        "{begin}\n\
         Host {alias}\n\
         \x20 HostName {vm_ip}\n\
         \x20 User {vm_user}\n\
         \x20 Port 22\n\
         \x20 IdentityFile {identity}\n\
         \x20 IdentitiesOnly yes\n\
         \x20 StrictHostKeyChecking no\n\
         \x20 UserKnownHostsFile /dev/null\n\
         \x20 LogLevel ERROR\n\
         {end}",
        identity = identity_file.display(),
    );
    upsert_named_block(&ssh_dir.join(MANAGED_SSH_CONFIG_NAME), &begin, &end, &block)?;
    Ok(alias)
}

pub fn remove_ssh_alias(ssh_dir: &Path, vm_name: &str) -> io::Result<()> {
    let (begin, end) = block_markers(vm_name);
    remove_named_block(&ssh_dir.join(MANAGED_SSH_CONFIG_NAME), &begin, &end)
}

// === Key provisioning ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypairPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Create the per-VM ed25519 keypair under `<state>/mutagen/keys/<vm>/`
/// if it does not already exist.
pub fn ensure_vm_keypair(state_dir: &Path, vm_name: &str) -> Result<KeypairPaths, SyncError> {
    let key_dir = state_dir.join("mutagen").join("keys").join(vm_name);
    let private_key = key_dir.join("id_ed25519");
    let public_key = key_dir.join("id_ed25519.pub");
    if private_key.exists() && public_key.exists() {
        return Ok(KeypairPaths { private_key, public_key });
    }

    std::fs::create_dir_all(&key_dir)?;
    let args = vec![
        "-q".to_string(),
        "-t".to_string(),
        "ed25519".to_string(),
        "-N".to_string(),
        String::new(),
        "-C".to_string(),
        format!("clawbox-{vm_name}"),
        "-f".to_string(),
        private_key.display().to_string(),
    ];
    let output = run_captured("ssh-keygen", &args, None, &[]).map_err(|e| SyncError::Keygen {
        vm_name: vm_name.to_string(),
        details: e.to_string(),
    })?;
    if !output.success() {
        return Err(SyncError::Keygen { vm_name: vm_name.to_string(), details: output.details() });
    }
    Ok(KeypairPaths { private_key, public_key })
}

// === Guest-side preparation ===

/// Append the public key to the login user's authorized keys, once.
pub fn install_authorized_key(
    shell: &dyn RemoteShell,
    target: &str,
    inventory_path: Option<&str>,
    public_key_line: &str,
) -> Result<(), SyncError> {
    let key = sh_quote(public_key_line.trim());
    let cmd = format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && touch ~/.ssh/authorized_keys && \
         chmod 600 ~/.ssh/authorized_keys && \
         grep -qxF {key} ~/.ssh/authorized_keys || printf '%s\\n' {key} >> ~/.ssh/authorized_keys"
    );
    let output = shell
        .run_shell(target, &cmd, false, inventory_path)
        .map_err(|e| SyncError::Guest { step: "install sync key".to_string(), details: e.to_string() })?;
    if !output.success() {
        return Err(SyncError::Guest {
            step: "install sync key".to_string(),
            details: output.details(),
        });
    }
    Ok(())
}

/// Prepare each session's guest destination: drop a stale symlink, create
/// the directory, and open up permissions for the sync agent.
pub fn prepare_guest_dirs(
    shell: &dyn RemoteShell,
    target: &str,
    inventory_path: Option<&str>,
    specs: &[SessionSpec],
) -> Result<(), SyncError> {
    if specs.is_empty() {
        return Ok(());
    }
    let clauses: Vec<String> = specs
        .iter()
        .map(|spec| {
            let dest = sh_quote(&spec.guest_path);
            format!("if [ -L {dest} ]; then rm -f {dest}; fi; mkdir -p {dest}; chmod -R a+rwX {dest}")
        })
        .collect();
    let cmd = clauses.join("; ");
    let output = shell
        .run_shell(target, &cmd, true, inventory_path)
        .map_err(|e| SyncError::Guest {
            step: "prepare sync directories".to_string(),
            details: e.to_string(),
        })?;
    if !output.success() {
        return Err(SyncError::Guest {
            step: "prepare sync directories".to_string(),
            details: output.details(),
        });
    }
    Ok(())
}

// === Session lifecycle ===

/// Recreate the VM's sessions: terminate any same-named session, create a
/// fresh two-way-resolved one per spec, then flush by label as the initial
/// synchronization barrier.
pub fn ensure_vm_sessions(
    cli: &dyn SyncCli,
    vm_name: &str,
    alias: &str,
    specs: &[SessionSpec],
) -> Result<(), SyncError> {
    if !cli.available() {
        return Err(SyncError::CliUnavailable);
    }

    let mut created = 0usize;
    for spec in specs {
        let name = session_name(vm_name, &spec.kind);
        cli.run(&["sync".to_string(), "terminate".to_string(), name.clone()], false)?;

        let mut args = vec![
            "sync".to_string(),
            "create".to_string(),
            "--name".to_string(),
            name,
            "--mode".to_string(),
            "two-way-resolved".to_string(),
            "--label".to_string(),
            vm_label(vm_name),
            "--label".to_string(),
            "clawbox.managed=true".to_string(),
            "--label".to_string(),
            format!("clawbox.kind={}", spec.kind),
        ];
        if spec.ignore_vcs {
            args.push("--ignore-vcs".to_string());
        }
        for ignored in &spec.ignored_paths {
            args.push("--ignore".to_string());
            args.push(ignored.clone());
        }
        args.push(spec.host_path.display().to_string());
        args.push(format!("{alias}:{}", spec.guest_path));
        cli.run(&args, true)?;
        created += 1;
    }

    if created > 0 {
        cli.run(
            &[
                "sync".to_string(),
                "flush".to_string(),
                "--label-selector".to_string(),
                vm_label(vm_name),
            ],
            true,
        )?;
    }
    Ok(())
}

pub fn vm_sessions_exist(cli: &dyn SyncCli, vm_name: &str) -> bool {
    if !cli.available() {
        return false;
    }
    let args = vec![
        "sync".to_string(),
        "list".to_string(),
        "--label-selector".to_string(),
        vm_label(vm_name),
        "--template".to_string(),
        "{{range .}}{{.Identifier}}{{\"\\n\"}}{{end}}".to_string(),
    ];
    match cli.run(&args, false) {
        Ok(output) => !output.stdout.trim().is_empty(),
        Err(_) => false,
    }
}

/// Textual session summary for diagnostics, scoped by label selector.
pub fn vm_sessions_status(cli: &dyn SyncCli, vm_name: &str) -> String {
    if !cli.available() {
        return "mutagen not available".to_string();
    }
    let args = vec![
        "sync".to_string(),
        "list".to_string(),
        "-l".to_string(),
        "--label-selector".to_string(),
        vm_label(vm_name),
    ];
    match cli.run(&args, false) {
        Ok(output) => {
            let stdout = output.stdout.trim();
            if stdout.is_empty() {
                output.stderr.trim().to_string()
            } else {
                stdout.to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}

/// Best-effort teardown of a VM's sessions, optionally flushing first so
/// pending changes reach the other side while SSH is still alive. Safe
/// when the sync tool is absent.
pub fn terminate_vm_sessions(cli: &dyn SyncCli, vm_name: &str, flush: bool) -> Result<(), SyncError> {
    if !cli.available() {
        return Ok(());
    }
    let selector = vm_label(vm_name);
    if flush {
        cli.run(
            &["sync".to_string(), "flush".to_string(), "--label-selector".to_string(), selector.clone()],
            false,
        )?;
    }
    cli.run(
        &["sync".to_string(), "terminate".to_string(), "--label-selector".to_string(), selector],
        false,
    )?;
    Ok(())
}

// === Active-VM registry ===

fn registry_path(state_dir: &Path) -> PathBuf {
    state_dir.join("mutagen").join(ACTIVE_VMS_FILE)
}

fn read_active_vms(path: &Path) -> Vec<String> {
    let raw = read_text_or_empty(path);
    if raw.is_empty() {
        return Vec::new();
    }
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return Vec::new();
    };
    let Some(vms) = payload.get("vms").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    let set: BTreeSet<String> = vms
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    set.into_iter().collect()
}

fn write_active_vms(path: &Path, vms: &[String]) -> io::Result<()> {
    let set: BTreeSet<&str> = vms.iter().map(String::as_str).collect();
    let payload = serde_json::json!({ "vms": set });
    atomic_write_text(path, &format!("{payload}\n"))
}

pub fn active_vms(state_dir: &Path) -> Vec<String> {
    read_active_vms(&registry_path(state_dir))
}

pub fn mark_vm_active(state_dir: &Path, vm_name: &str) -> io::Result<()> {
    let path = registry_path(state_dir);
    let mut vms = read_active_vms(&path);
    if !vms.iter().any(|name| name == vm_name) {
        vms.push(vm_name.to_string());
    }
    write_active_vms(&path, &vms)
}

pub fn clear_vm_active(state_dir: &Path, vm_name: &str) -> io::Result<()> {
    let path = registry_path(state_dir);
    let vms: Vec<String> =
        read_active_vms(&path).into_iter().filter(|name| name != vm_name).collect();
    write_active_vms(&path, &vms)
}

// === Composite teardown and reconciliation ===

/// Tear down everything sync-related for a VM: sessions (optionally
/// flushed), registry entry, and the SSH alias block.
pub fn teardown_vm_sync(
    cli: &dyn SyncCli,
    ssh_dir: &Path,
    state_dir: &Path,
    vm_name: &str,
    flush: bool,
) -> Result<(), SyncError> {
    terminate_vm_sessions(cli, vm_name, flush)?;
    clear_vm_active(state_dir, vm_name)?;
    remove_ssh_alias(ssh_dir, vm_name)?;
    Ok(())
}

/// Drop sessions for every registered VM the backend reports as not
/// running. VMs the backend cannot answer for are left alone.
pub fn reconcile_vm_sync(
    cli: &dyn SyncCli,
    backend: &dyn VmBackend,
    ssh_dir: &Path,
    state_dir: &Path,
) {
    for vm_name in active_vms(state_dir) {
        let running = match backend.running(&vm_name) {
            Ok(running) => running,
            Err(e) => {
                debug!(vm = %vm_name, error = %e, "skipping sync reconcile; backend unavailable");
                continue;
            }
        };
        if !running {
            if let Err(e) = teardown_vm_sync(cli, ssh_dir, state_dir, &vm_name, false) {
                warn!(vm = %vm_name, error = %e, "sync reconcile teardown failed");
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingSyncCli;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Records every mutagen invocation; responses can be scripted by
    /// argument prefix.
    #[derive(Debug)]
    pub struct RecordingSyncCli {
        available: bool,
        state: Mutex<RecordingState>,
    }

    #[derive(Debug, Default)]
    struct RecordingState {
        calls: Vec<Vec<String>>,
        responses: Vec<(Vec<String>, CommandOutput)>,
    }

    impl Default for RecordingSyncCli {
        fn default() -> Self {
            Self { available: true, state: Mutex::new(RecordingState::default()) }
        }
    }

    impl RecordingSyncCli {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unavailable() -> Self {
            Self { available: false, state: Mutex::new(RecordingState::default()) }
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Respond with `output` to any call whose args start with `prefix`.
        pub fn respond_with(&self, prefix: &[&str], exit_code: i32, stdout: &str) {
            self.lock().responses.push((
                prefix.iter().map(|s| s.to_string()).collect(),
                CommandOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            ));
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.lock().calls.clone()
        }
    }

    impl SyncCli for RecordingSyncCli {
        fn available(&self) -> bool {
            self.available
        }

        fn run(&self, args: &[String], check: bool) -> Result<CommandOutput, SyncError> {
            let mut state = self.lock();
            state.calls.push(args.to_vec());
            let output = state
                .responses
                .iter()
                .find(|(prefix, _)| args.len() >= prefix.len() && args[..prefix.len()] == prefix[..])
                .map(|(_, output)| output.clone())
                .unwrap_or_default();
            drop(state);
            if check && !output.success() {
                return Err(SyncError::CommandFailed {
                    command: format!("mutagen {}", args.join(" ")),
                    exit_code: output.exit_code,
                    details: output.details(),
                });
            }
            Ok(output)
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
