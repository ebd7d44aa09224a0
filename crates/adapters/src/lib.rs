// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! clawbox-adapters: typed wrappers over the external tools Clawbox
//! orchestrates: the `tart` VM backend, the `ansible` remote shell, and
//! the `mutagen` sync daemon.
//!
//! Every adapter turns a subprocess result into either typed data or a
//! structured error carrying the exit code and captured output. Traits sit
//! at each process boundary so the engine can be exercised against fakes.

pub mod ansible;
pub mod backend;
pub mod probe;
pub mod process;
pub mod sync;

pub use ansible::{
    build_shell_command, run_ansible_shell, AnsiblePlaybook, Provisioner, RemoteShellContext,
    RemoteShellError,
};
pub use backend::{wait_for_running, BackendError, LaunchHandle, TartBackend, VmBackend, VmRecord};
pub use probe::{
    format_path_statuses, mount_status_command, parse_path_statuses, run_path_probe,
    wait_for_probe, AnsibleRunner, CredentialedShell, ProbeOutcome, RemoteShell, ShellRunner,
    STATUS_UNKNOWN,
};
pub use process::{pid_command_line, pid_running, sh_quote, CommandOutput};
pub use sync::{
    active_vms, clear_vm_active, ensure_ssh_alias, ensure_vm_keypair, ensure_vm_sessions,
    install_authorized_key, mark_vm_active, prepare_guest_dirs, reconcile_vm_sync,
    remove_ssh_alias, session_name, sync_ssh_alias, teardown_vm_sync, terminate_vm_sessions,
    vm_sessions_exist, vm_sessions_status, KeypairPaths, MutagenCli, SessionSpec, SyncCli,
    SyncError,
};

#[cfg(any(test, feature = "test-support"))]
pub use ansible::FakeProvisioner;
#[cfg(any(test, feature = "test-support"))]
pub use backend::FakeBackend;
#[cfg(any(test, feature = "test-support"))]
pub use probe::FakeRemoteShell;
#[cfg(any(test, feature = "test-support"))]
pub use sync::RecordingSyncCli;
