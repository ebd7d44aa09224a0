// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for orchestrator tests.

use std::path::Path;
use std::sync::Mutex;

use clawbox_adapters::process::run_captured;
use clawbox_adapters::{
    CommandOutput, FakeBackend, FakeProvisioner, FakeRemoteShell, RecordingSyncCli, RemoteShell,
    RemoteShellError,
};

use crate::context::EngineContext;
use crate::watcher::{WatcherError, WatcherSupervisor};

use super::Orchestrator;

/// Records start/stop calls instead of spawning children.
#[derive(Debug, Default)]
pub(crate) struct FakeWatcherSupervisor {
    starts: Mutex<Vec<String>>,
    stops: Mutex<Vec<String>>,
}

impl FakeWatcherSupervisor {
    pub(crate) fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub(crate) fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl WatcherSupervisor for FakeWatcherSupervisor {
    fn start(&self, _state_dir: &Path, vm_name: &str) -> Result<i32, WatcherError> {
        self.starts.lock().unwrap_or_else(|p| p.into_inner()).push(vm_name.to_string());
        Ok(4242)
    }

    fn stop(&self, _state_dir: &Path, vm_name: &str) -> bool {
        self.stops.lock().unwrap_or_else(|p| p.into_inner()).push(vm_name.to_string());
        true
    }
}

/// Runs probe commands on the host via `sh -c`, so tests can point the
/// guest mount scalars at real temp directories.
#[derive(Debug, Default)]
pub(crate) struct LocalShell;

impl RemoteShell for LocalShell {
    fn run_shell(
        &self,
        _target: &str,
        shell_cmd: &str,
        _become_root: bool,
        _inventory_path: Option<&str>,
    ) -> Result<CommandOutput, RemoteShellError> {
        run_captured("sh", &["-c".to_string(), shell_cmd.to_string()], None, &[])
            .map_err(|e| RemoteShellError::Spawn { command: "sh".to_string(), source: e })
    }
}

/// The full orchestrator test rig: a temp root plus fakes at every seam.
pub(crate) struct Rig {
    pub tmp: tempfile::TempDir,
    pub ctx: EngineContext,
    pub backend: FakeBackend,
    pub sync: RecordingSyncCli,
    pub shell: FakeRemoteShell,
    pub provisioner: FakeProvisioner,
    pub watchers: FakeWatcherSupervisor,
}

impl Rig {
    pub(crate) fn new(backend: FakeBackend) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = EngineContext::for_test_root(tmp.path());
        Self {
            tmp,
            ctx,
            backend,
            sync: RecordingSyncCli::new(),
            shell: FakeRemoteShell::new(),
            provisioner: FakeProvisioner::new(),
            watchers: FakeWatcherSupervisor::default(),
        }
    }

    pub(crate) fn with_provisioner(mut self, provisioner: FakeProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator {
            ctx: &self.ctx,
            backend: &self.backend,
            sync: &self.sync,
            shell: &self.shell,
            provisioner: &self.provisioner,
            watchers: &self.watchers,
        }
    }

    pub(crate) fn marker_path(&self, vm_name: &str) -> std::path::PathBuf {
        self.ctx.marker_file(vm_name)
    }

    pub(crate) fn write_marker(&self, vm_name: &str, content: &str) {
        let path = self.marker_path(vm_name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

pub(crate) fn standard_marker(vm_name: &str) -> String {
    format!(
        "vm_name: {vm_name}\nprofile: standard\nplaywright: false\ntailscale: false\n\
         signal_cli: false\nsignal_payload: false\nsync_backend: mutagen\n\
         provisioned_at: 2026-02-01T10:00:00Z\n"
    )
}
