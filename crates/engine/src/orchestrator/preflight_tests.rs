// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clawbox_adapters::{FakeBackend, FakeRemoteShell};

use super::super::test_support::{LocalShell, Rig};

#[test]
fn file_check_command_reports_ok_or_missing_per_path() {
    let cmd = file_check_command(&["/a/package.json".to_string(), "/b with space/x".to_string()]);
    assert!(cmd.starts_with("missing=0; "));
    assert!(cmd.ends_with("; exit $missing"));
    assert!(cmd.contains("if [ -f /a/package.json ]"));
    assert!(cmd.contains("if [ -f '/b with space/x' ]"));
    assert!(cmd.contains("missing=1"));
}

#[test]
fn signal_payload_host_marker_names_the_vm() {
    let rig = Rig::new(FakeBackend::new());
    let dir = rig.tmp.path().join("signal");
    std::fs::create_dir_all(&dir).unwrap();

    ensure_signal_payload_host_marker(&rig.orchestrator(), dir.to_str().unwrap(), "clawbox-1")
        .unwrap();

    let marker = dir.join(".clawbox-signal-payload-host-marker");
    let content = std::fs::read_to_string(&marker).unwrap();
    assert!(content.contains("vm: clawbox-1"));
}

#[test]
fn signal_payload_host_marker_unwritable_dir_is_a_user_error() {
    let rig = Rig::new(FakeBackend::new());
    let err = ensure_signal_payload_host_marker(
        &rig.orchestrator(),
        "/nonexistent-root-dir/signal",
        "clawbox-1",
    )
    .unwrap_err();
    assert!(err.message.contains("Could not write signal payload marker file"));
}

#[test]
fn developer_mounts_preflight_succeeds_when_guest_sees_probe_files() {
    let rig = Rig::new(FakeBackend::new());
    let mut ctx = rig.ctx.clone();
    // Point the guest mount scalars at host directories so LocalShell's
    // file checks exercise the real probe files.
    let source = rig.tmp.path().join("source");
    let payload = rig.tmp.path().join("payload");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&payload).unwrap();
    std::fs::write(source.join("package.json"), "{}\n").unwrap();
    ctx.openclaw_source_mount = source.display().to_string();
    ctx.openclaw_payload_mount = payload.display().to_string();

    let orch = Orchestrator {
        ctx: &ctx,
        backend: &rig.backend,
        sync: &rig.sync,
        shell: &rig.shell,
        provisioner: &rig.provisioner,
        watchers: &rig.watchers,
    };
    preflight_developer_mounts(
        &orch,
        &LocalShell,
        "clawbox-1",
        1,
        payload.to_str().unwrap(),
        "",
        false,
        std::time::Duration::from_secs(10),
    )
    .unwrap();

    // Probe files are removed on success.
    let leftovers: Vec<_> = std::fs::read_dir(&payload).unwrap().flatten().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn developer_mounts_preflight_failure_lists_checks_and_cleans_probes() {
    let rig = Rig::new(FakeBackend::new());
    let payload = rig.tmp.path().join("payload");
    std::fs::create_dir_all(&payload).unwrap();

    let shell = FakeRemoteShell::new().with_response(1, "", "unreachable\n");
    let err = preflight_developer_mounts(
        &rig.orchestrator(),
        &shell,
        "clawbox-1",
        1,
        payload.to_str().unwrap(),
        "",
        false,
        std::time::Duration::ZERO,
    )
    .unwrap_err();

    assert!(err.message.contains("Required shared folders failed preflight checks"));
    assert!(err.message.contains("file visibility checks:"));
    assert!(err.message.contains("package.json"));
    assert!(err.message.contains("clawbox delete 1"));
    assert!(err.message.contains("clawbox up 1 --developer"));

    let leftovers: Vec<_> = std::fs::read_dir(&payload).unwrap().flatten().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn signal_marker_preflight_succeeds_when_marker_visible() {
    let rig = Rig::new(FakeBackend::new());
    let mut ctx = rig.ctx.clone();
    let signal = rig.tmp.path().join("signal");
    std::fs::create_dir_all(&signal).unwrap();
    std::fs::write(signal.join(".clawbox-signal-payload-host-marker"), "marker\n").unwrap();
    ctx.signal_payload_mount = signal.display().to_string();

    let orch = Orchestrator {
        ctx: &ctx,
        backend: &rig.backend,
        sync: &rig.sync,
        shell: &rig.shell,
        provisioner: &rig.provisioner,
        watchers: &rig.watchers,
    };
    preflight_signal_payload_marker(
        &orch,
        &LocalShell,
        "clawbox-1",
        1,
        std::time::Duration::from_secs(10),
        None,
        None,
    )
    .unwrap();
}

#[test]
fn signal_marker_preflight_failure_names_the_marker() {
    let rig = Rig::new(FakeBackend::new());
    let shell = FakeRemoteShell::new().with_response(1, "", "");
    let err = preflight_signal_payload_marker(
        &rig.orchestrator(),
        &shell,
        "clawbox-1",
        1,
        std::time::Duration::ZERO,
        Some("10.0.0.5,"),
        Some("10.0.0.5"),
    )
    .unwrap_err();
    assert!(err.message.contains("signal-cli payload marker was not visible"));
    assert!(err.message.contains(".clawbox-signal-payload-host-marker"));
    assert!(err.message.contains("last marker status: unknown"));
}
