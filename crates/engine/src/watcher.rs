// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watcher supervisor: one detached child per running VM, polling
//! liveness and tearing down sync and locks when the VM stops.
//!
//! Ownership is anchored in the record file `<state>/watchers/<vm>.json`:
//! a record whose PID is live and whose command line carries the
//! `_watch-vm` token plus the VM name owns the VM. Anything else is stale
//! and is reclaimed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use clawbox_adapters::{pid_command_line, pid_running, SyncCli, VmBackend};
use clawbox_core::fsio::{atomic_write_text, tail_lines};
use clawbox_core::utc_timestamp;

use crate::locks::cleanup_locks_for_vm;
use crate::sync_flow::teardown_sync_logged;

/// Token in the watcher child's command line used for ownership checks.
pub const WATCH_VM_COMMAND: &str = "_watch-vm";
pub const DEFAULT_POLL_SECONDS: u64 = 2;
const SPAWN_GRACE: Duration = Duration::from_millis(150);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher poll_seconds must be > 0")]
    InvalidPollInterval,

    #[error("Error: Could not launch watcher for '{vm_name}': {source}")]
    Spawn {
        vm_name: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    StartFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The persisted claim of a watcher process on a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherRecord {
    pub vm_name: String,
    pub pid: i32,
    pub poll_seconds: u64,
    pub started_at: String,
}

fn watchers_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("watchers")
}

fn record_path(state_dir: &Path, vm_name: &str) -> PathBuf {
    watchers_dir(state_dir).join(format!("{vm_name}.json"))
}

fn watcher_log_path(state_dir: &Path, vm_name: &str) -> PathBuf {
    state_dir.join("logs").join(format!("{vm_name}.watcher.log"))
}

pub(crate) fn read_record(path: &Path) -> Option<WatcherRecord> {
    let raw = std::fs::read_to_string(path).ok()?;
    let record: WatcherRecord = serde_json::from_str(&raw).ok()?;
    if record.vm_name.is_empty() || record.pid <= 0 || record.poll_seconds == 0 {
        return None;
    }
    Some(record)
}

pub(crate) fn write_record(state_dir: &Path, record: &WatcherRecord) -> io::Result<()> {
    let payload = serde_json::json!({
        "vm_name": record.vm_name,
        "pid": record.pid,
        "poll_seconds": record.poll_seconds,
        "started_at": record.started_at,
    });
    atomic_write_text(&record_path(state_dir, &record.vm_name), &format!("{payload}\n"))
}

fn remove_record_if_owner(state_dir: &Path, vm_name: &str, pid: i32) {
    let path = record_path(state_dir, vm_name);
    match read_record(&path) {
        None => {
            let _ = std::fs::remove_file(&path);
        }
        Some(record) if record.pid == pid => {
            let _ = std::fs::remove_file(&path);
        }
        Some(_) => {}
    }
}

/// Whether `pid`'s command line identifies it as the watcher for this VM.
fn is_watcher_pid(pid: i32, vm_name: &str) -> bool {
    let cmd = pid_command_line(pid);
    if cmd.is_empty() {
        return false;
    }
    let mut has_token = false;
    let mut has_vm = false;
    for part in cmd.split_whitespace() {
        if part == WATCH_VM_COMMAND {
            has_token = true;
        }
        if part == vm_name {
            has_vm = true;
        }
    }
    has_token && has_vm
}

/// Signal the watcher's process group first (it may have children of its
/// own), then the PID directly. Best effort throughout.
fn signal_watcher(pid: i32, signal: Signal) {
    if pid <= 0 {
        return;
    }
    let pgid = match getpgid(Some(Pid::from_raw(pid))) {
        Ok(pgid) => pgid,
        Err(_) => return,
    };
    if matches!(killpg(pgid, signal), Err(nix::errno::Errno::ESRCH)) {
        return;
    }
    let _ = kill(Pid::from_raw(pid), signal);
}

/// Start (or adopt) the watcher for a VM. Idempotent: a live record whose
/// PID checks out is returned as-is; stale records are replaced by a fresh
/// detached child.
pub fn start_vm_watcher(
    state_dir: &Path,
    vm_name: &str,
    poll_seconds: u64,
) -> Result<i32, WatcherError> {
    use std::os::unix::process::CommandExt;

    if poll_seconds == 0 {
        return Err(WatcherError::InvalidPollInterval);
    }

    let path = record_path(state_dir, vm_name);
    if let Some(existing) = read_record(&path) {
        if pid_running(existing.pid) && is_watcher_pid(existing.pid, vm_name) {
            return Ok(existing.pid);
        }
        let _ = std::fs::remove_file(&path);
    }

    let log_file = watcher_log_path(state_dir, vm_name);
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = std::fs::File::create(&log_file)?;
    let log_err = log.try_clone()?;

    let exe = std::env::current_exe()
        .map_err(|e| WatcherError::Spawn { vm_name: vm_name.to_string(), source: e })?;
    let mut child = std::process::Command::new(exe)
        .arg(WATCH_VM_COMMAND)
        .arg(vm_name)
        .arg("--state-dir")
        .arg(state_dir)
        .arg("--poll-seconds")
        .arg(poll_seconds.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::from(log))
        .stderr(std::process::Stdio::from(log_err))
        .process_group(0)
        .spawn()
        .map_err(|e| WatcherError::Spawn { vm_name: vm_name.to_string(), source: e })?;

    std::thread::sleep(SPAWN_GRACE);
    if let Ok(Some(_)) = child.try_wait() {
        let mut message = vec![format!("Error: watcher failed to start for '{vm_name}'.")];
        let tail = tail_lines(&log_file, 20);
        if !tail.is_empty() {
            message.push(format!("Recent watcher output ({}):", log_file.display()));
            message.push(tail);
        }
        return Err(WatcherError::StartFailed(message.join("\n")));
    }

    let pid = child.id() as i32;
    write_record(
        state_dir,
        &WatcherRecord {
            vm_name: vm_name.to_string(),
            pid,
            poll_seconds,
            started_at: utc_timestamp(),
        },
    )?;
    info!(vm = vm_name, pid, "watcher started");
    Ok(pid)
}

/// Stop a VM's watcher: SIGTERM (group, then PID), bounded wait, SIGKILL
/// as a last resort. Returns whether a record existed.
pub fn stop_vm_watcher(state_dir: &Path, vm_name: &str, timeout: Duration) -> bool {
    let path = record_path(state_dir, vm_name);
    let Some(record) = read_record(&path) else {
        let _ = std::fs::remove_file(&path);
        return false;
    };

    if is_watcher_pid(record.pid, vm_name) {
        signal_watcher(record.pid, Signal::SIGTERM);
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if !pid_running(record.pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        if pid_running(record.pid) {
            signal_watcher(record.pid, Signal::SIGKILL);
        }
    }
    let _ = std::fs::remove_file(&path);
    true
}

/// Sweep the watcher records directory: drop records whose PID is dead
/// (cleaning locks when the VM is also gone), and stop watchers whose VM
/// is no longer running.
pub fn reconcile_vm_watchers(backend: &dyn VmBackend, state_dir: &Path, lock_root: &Path) {
    let vm_running = |name: &str| backend.running(name).ok();

    let Ok(entries) = std::fs::read_dir(watchers_dir(state_dir)) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(record) = read_record(&path) else {
            let _ = std::fs::remove_file(&path);
            continue;
        };
        if !pid_running(record.pid) {
            let _ = std::fs::remove_file(&path);
            if vm_running(&record.vm_name) == Some(false) {
                cleanup_locks_for_vm(lock_root, &record.vm_name);
            }
            continue;
        }
        if vm_running(&record.vm_name) == Some(false) {
            stop_vm_watcher(state_dir, &record.vm_name, Duration::from_secs(5));
            cleanup_locks_for_vm(lock_root, &record.vm_name);
        }
    }
}

/// The watcher-supervision seam the orchestrator drives: start is
/// idempotent, stop is bounded and forceful.
pub trait WatcherSupervisor {
    fn start(&self, state_dir: &Path, vm_name: &str) -> Result<i32, WatcherError>;
    fn stop(&self, state_dir: &Path, vm_name: &str) -> bool;
}

/// The real supervisor, spawning detached watcher children.
#[derive(Debug, Clone, Default)]
pub struct ProcessWatcherSupervisor;

impl WatcherSupervisor for ProcessWatcherSupervisor {
    fn start(&self, state_dir: &Path, vm_name: &str) -> Result<i32, WatcherError> {
        start_vm_watcher(state_dir, vm_name, DEFAULT_POLL_SECONDS)
    }

    fn stop(&self, state_dir: &Path, vm_name: &str) -> bool {
        stop_vm_watcher(state_dir, vm_name, Duration::from_secs(5))
    }
}

/// Dependencies of the watcher child's poll loop.
pub struct WatcherLoopDeps<'a> {
    pub backend: &'a dyn VmBackend,
    pub sync: &'a dyn SyncCli,
    pub state_dir: &'a Path,
    pub ssh_dir: &'a Path,
    pub lock_root: &'a Path,
}

/// The watcher child's main loop. Polls VM liveness every `poll_seconds`;
/// on a stopped observation tears down sync (no flush; the VM is gone)
/// and the VM's locks, then exits. SIGTERM/SIGINT exit the loop cleanly.
/// Either exit path releases the record if this process still owns it.
pub fn run_watcher_loop(deps: &WatcherLoopDeps<'_>, vm_name: &str, poll_seconds: u64) {
    let poll = Duration::from_secs(poll_seconds.max(1));
    let should_exit = Arc::new(AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&should_exit));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&should_exit));

    info!(vm = vm_name, poll_seconds, "watcher loop started");
    while !should_exit.load(Ordering::Relaxed) {
        let running = match deps.backend.running(vm_name) {
            Ok(running) => running,
            Err(e) => {
                warn!(vm = vm_name, error = %e, "backend poll failed");
                std::thread::sleep(poll);
                continue;
            }
        };

        if !running {
            info!(vm = vm_name, "VM stopped; tearing down sync and locks");
            if let Err(e) = teardown_sync_logged(
                deps.sync,
                deps.ssh_dir,
                deps.state_dir,
                vm_name,
                false,
                "watcher",
                "vm stopped",
            ) {
                warn!(vm = vm_name, error = %e, "sync teardown failed");
            }
            cleanup_locks_for_vm(deps.lock_root, vm_name);
            break;
        }
        std::thread::sleep(poll);
    }

    remove_record_if_owner(deps.state_dir, vm_name, std::process::id() as i32);
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
