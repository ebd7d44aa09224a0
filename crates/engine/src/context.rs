// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine context: every path, scalar, and timeout the orchestrator
//! needs, resolved once at startup and threaded through explicitly.

use std::path::{Path, PathBuf};

use clawbox_adapters::RemoteShellContext;
use clawbox_core::{
    default_secrets_file, default_state_dir, resolve_data_root, vm_name_for, GroupVars,
};

pub const BASE_IMAGE: &str = "macos-base";

pub const DEFAULT_OPENCLAW_SOURCE_MOUNT: &str = "/Volumes/My Shared Files/openclaw-source";
pub const DEFAULT_OPENCLAW_PAYLOAD_MOUNT: &str = "/Volumes/My Shared Files/openclaw-payload";
pub const DEFAULT_SIGNAL_PAYLOAD_MOUNT: &str = "/Volumes/My Shared Files/signal-cli-payload";
pub const DEFAULT_SIGNAL_PAYLOAD_MARKER_FILENAME: &str = ".clawbox-signal-payload-host-marker";
pub const DEFAULT_BOOTSTRAP_ADMIN_USER: &str = "admin";
pub const DEFAULT_BOOTSTRAP_ADMIN_PASSWORD: &str = "admin";

const ANSIBLE_CONNECT_TIMEOUT_ENV: &str = "CLAWBOX_ANSIBLE_CONNECT_TIMEOUT_SECONDS";
const ANSIBLE_COMMAND_TIMEOUT_ENV: &str = "CLAWBOX_ANSIBLE_COMMAND_TIMEOUT_SECONDS";
const MUTAGEN_READY_TIMEOUT_ENV: &str = "CLAWBOX_MUTAGEN_READY_TIMEOUT_SECONDS";
const VM_BOOT_TIMEOUT_ENV: &str = "VM_BOOT_TIMEOUT_SECONDS";

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct EngineContext {
    pub data_root: PathBuf,
    pub ansible_dir: PathBuf,
    pub state_dir: PathBuf,
    pub secrets_file: PathBuf,
    /// `~/.ssh`, where the sync alias blocks live.
    pub ssh_dir: PathBuf,
    /// `~/.clawbox/locks`, the cross-process lock namespace.
    pub lock_root: PathBuf,
    pub base_image: String,
    pub vm_base_name: String,
    pub openclaw_source_mount: String,
    pub openclaw_payload_mount: String,
    pub signal_payload_mount: String,
    pub signal_payload_marker_filename: String,
    pub bootstrap_admin_user: String,
    pub bootstrap_admin_password: String,
    /// How long `launch` waits for the backend to report running.
    pub launch_running_timeout_seconds: u64,
    pub ansible_connect_timeout_seconds: u64,
    pub ansible_command_timeout_seconds: u64,
    pub mutagen_ready_timeout_seconds: u64,
    pub vm_boot_timeout_seconds: u64,
}

impl EngineContext {
    /// Resolve from the environment: data root discovery, group vars, env
    /// timeout overrides.
    pub fn resolve() -> Self {
        let data_root = resolve_data_root();
        let group_vars = GroupVars::load(&data_root.join("ansible").join("group_vars").join("all.yml"));
        Self::from_parts(data_root, &group_vars)
    }

    /// Build from explicit parts. The home-anchored paths (`ssh_dir`,
    /// `lock_root`) stay overridable for isolated test runs.
    pub fn from_parts(data_root: PathBuf, group_vars: &GroupVars) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = default_state_dir(&data_root);
        let secrets_file = default_secrets_file(&data_root);
        Self {
            ansible_dir: data_root.join("ansible"),
            state_dir,
            secrets_file,
            ssh_dir: home.join(".ssh"),
            lock_root: home.join(".clawbox").join("locks"),
            base_image: BASE_IMAGE.to_string(),
            vm_base_name: group_vars.vm_base_name(),
            openclaw_source_mount: group_vars
                .scalar("openclaw_source_mount", DEFAULT_OPENCLAW_SOURCE_MOUNT),
            openclaw_payload_mount: group_vars
                .scalar("openclaw_payload_mount", DEFAULT_OPENCLAW_PAYLOAD_MOUNT),
            signal_payload_mount: group_vars
                .scalar("signal_cli_payload_mount", DEFAULT_SIGNAL_PAYLOAD_MOUNT),
            signal_payload_marker_filename: group_vars.scalar(
                "signal_cli_payload_marker_filename",
                DEFAULT_SIGNAL_PAYLOAD_MARKER_FILENAME,
            ),
            bootstrap_admin_user: group_vars
                .scalar("bootstrap_admin_user", DEFAULT_BOOTSTRAP_ADMIN_USER),
            bootstrap_admin_password: group_vars
                .scalar("bootstrap_admin_password", DEFAULT_BOOTSTRAP_ADMIN_PASSWORD),
            launch_running_timeout_seconds: 30,
            ansible_connect_timeout_seconds: env_u64(ANSIBLE_CONNECT_TIMEOUT_ENV, 8),
            ansible_command_timeout_seconds: env_u64(ANSIBLE_COMMAND_TIMEOUT_ENV, 30),
            mutagen_ready_timeout_seconds: env_u64(MUTAGEN_READY_TIMEOUT_ENV, 60),
            vm_boot_timeout_seconds: env_u64(VM_BOOT_TIMEOUT_ENV, 300),
            data_root,
        }
    }

    pub fn vm_name_for(&self, number: u32) -> String {
        vm_name_for(&self.vm_base_name, number)
    }

    pub fn marker_file(&self, vm_name: &str) -> PathBuf {
        self.state_dir.join(format!("{vm_name}.provisioned"))
    }

    pub fn launch_log_file(&self, vm_name: &str) -> PathBuf {
        self.state_dir.join("logs").join(format!("{vm_name}.launch.log"))
    }

    pub fn remote_shell_context(&self) -> RemoteShellContext {
        RemoteShellContext::new(
            self.ansible_dir.clone(),
            self.ansible_connect_timeout_seconds,
            self.ansible_command_timeout_seconds,
        )
    }

    /// Test constructor rooting every host path under `root`.
    #[doc(hidden)]
    pub fn for_test_root(root: &Path) -> Self {
        let data_root = root.join("data");
        Self {
            ansible_dir: data_root.join("ansible"),
            state_dir: root.join("state"),
            secrets_file: root.join("secrets.yml"),
            ssh_dir: root.join(".ssh"),
            lock_root: root.join("locks"),
            base_image: BASE_IMAGE.to_string(),
            vm_base_name: "clawbox".to_string(),
            openclaw_source_mount: DEFAULT_OPENCLAW_SOURCE_MOUNT.to_string(),
            openclaw_payload_mount: DEFAULT_OPENCLAW_PAYLOAD_MOUNT.to_string(),
            signal_payload_mount: DEFAULT_SIGNAL_PAYLOAD_MOUNT.to_string(),
            signal_payload_marker_filename: DEFAULT_SIGNAL_PAYLOAD_MARKER_FILENAME.to_string(),
            bootstrap_admin_user: DEFAULT_BOOTSTRAP_ADMIN_USER.to_string(),
            bootstrap_admin_password: DEFAULT_BOOTSTRAP_ADMIN_PASSWORD.to_string(),
            launch_running_timeout_seconds: 0,
            ansible_connect_timeout_seconds: 8,
            ansible_command_timeout_seconds: 30,
            mutagen_ready_timeout_seconds: 0,
            vm_boot_timeout_seconds: 0,
            data_root,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
