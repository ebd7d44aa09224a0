// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clawbox_adapters::{active_vms, mark_vm_active, FakeBackend};

use crate::locks::{acquire_path_lock, locked_path_for_vm, OPENCLAW_SOURCE_LOCK};
use crate::watcher::{write_record, WatcherRecord};

use super::super::test_support::{standard_marker, Rig};

fn developer_marker(vm_name: &str) -> String {
    format!(
        "vm_name: {vm_name}\nprofile: developer\nplaywright: false\ntailscale: false\n\
         signal_cli: false\nsignal_payload: false\nsync_backend: mutagen\n\
         provisioned_at: 2026-02-01T10:00:00Z\n"
    )
}

#[test]
fn probe_auth_is_skipped_without_a_developer_marker() {
    let rig = Rig::new(FakeBackend::new());
    let orch = rig.orchestrator();

    // No marker at all.
    let (creds, warnings) = status_probe_auth(&orch, "clawbox-1");
    assert_eq!(creds, None);
    assert!(warnings.is_empty());

    // Standard-profile marker: still no probe credentials.
    rig.write_marker("clawbox-1", &standard_marker("clawbox-1"));
    let (creds, warnings) = status_probe_auth(&orch, "clawbox-1");
    assert_eq!(creds, None);
    assert!(warnings.is_empty());
}

#[test]
fn probe_auth_reads_vm_user_credentials_for_developer_marker() {
    let rig = Rig::new(FakeBackend::new());
    rig.write_marker("clawbox-1", &developer_marker("clawbox-1"));
    std::fs::write(&rig.ctx.secrets_file, "vm_password: \"hunter2\"\n").unwrap();

    let (creds, warnings) = status_probe_auth(&rig.orchestrator(), "clawbox-1");
    assert_eq!(creds, Some(("clawbox-1".to_string(), "hunter2".to_string())));
    assert!(warnings.is_empty());
}

#[test]
fn probe_auth_missing_secrets_becomes_a_warning() {
    let rig = Rig::new(FakeBackend::new());
    rig.write_marker("clawbox-1", &developer_marker("clawbox-1"));

    let (creds, warnings) = status_probe_auth(&rig.orchestrator(), "clawbox-1");
    assert_eq!(creds, None);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("Secrets file not found"));
}

#[test]
fn report_without_credentials_marks_sync_paths_unavailable() {
    let rig = Rig::new(
        FakeBackend::new().with_vm("clawbox-1", true).with_ip("clawbox-1", "192.168.64.9"),
    );
    rig.write_marker("clawbox-1", &developer_marker("clawbox-1"));
    // No secrets file: credentials resolve to a warning instead.

    let report = build_report(&rig.orchestrator(), "clawbox-1").unwrap();
    assert_eq!(report.sync_paths.probe, "unavailable");
    assert!(report.warnings.iter().any(|w| w.contains("Secrets file not found")));
}

#[test]
fn report_with_credentials_probes_through_the_shell_seam() {
    let rig = Rig::new(
        FakeBackend::new().with_vm("clawbox-1", true).with_ip("clawbox-1", "192.168.64.9"),
    );
    rig.write_marker("clawbox-1", &developer_marker("clawbox-1"));
    std::fs::write(&rig.ctx.secrets_file, "vm_password: \"hunter2\"\n").unwrap();
    rig.shell.push_response(
        0,
        &format!("'{}'=mounted\n", rig.ctx.openclaw_source_mount),
        "",
    );

    let report = build_report(&rig.orchestrator(), "clawbox-1").unwrap();
    assert_eq!(report.sync_paths.probe, "ok");
    assert_eq!(report.sync_paths.paths[&rig.ctx.openclaw_source_mount], "mounted");

    // The probe ran the mount-status command over the fake shell.
    let calls = rig.shell.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.contains("/sbin/mount"));
}

#[test]
fn status_vm_renders_text_and_json_without_error() {
    let rig = Rig::new(FakeBackend::new());
    rig.orchestrator().status_vm(1, false).unwrap();
    rig.orchestrator().status_vm(1, true).unwrap();
}

#[test]
fn empty_environment_status_succeeds_in_both_modes() {
    let rig = Rig::new(FakeBackend::new());
    rig.orchestrator().status_environment(false).unwrap();
    rig.orchestrator().status_environment(true).unwrap();
}

#[test]
fn environment_status_reports_each_candidate_vm() {
    let rig = Rig::new(FakeBackend::new().with_vm("clawbox-1", true).with_vm("clawbox-2", false));
    rig.write_marker("clawbox-3", &standard_marker("clawbox-3"));
    rig.orchestrator().status_environment(true).unwrap();
}

#[test]
fn environment_status_runs_the_reconciliation_sweep() {
    let rig = Rig::new(FakeBackend::new().with_vm("clawbox-1", false));
    let resource = rig.tmp.path().join("src");
    std::fs::create_dir_all(&resource).unwrap();
    acquire_path_lock(
        &rig.ctx.lock_root,
        &OPENCLAW_SOURCE_LOCK,
        "clawbox-1",
        resource.to_str().unwrap(),
        &rig.backend,
    )
    .unwrap();
    // A dead watcher and a stale sync registration for a stopped VM.
    write_record(
        &rig.ctx.state_dir,
        &WatcherRecord {
            vm_name: "clawbox-1".to_string(),
            pid: 0x3fff_fffe,
            poll_seconds: 2,
            started_at: "2026-02-01T10:00:00Z".to_string(),
        },
    )
    .unwrap();
    mark_vm_active(&rig.ctx.state_dir, "clawbox-1").unwrap();

    rig.orchestrator().status_environment(false).unwrap();

    assert!(!rig.ctx.state_dir.join("watchers").join("clawbox-1.json").exists());
    assert!(active_vms(&rig.ctx.state_dir).is_empty());
    assert_eq!(locked_path_for_vm(&rig.ctx.lock_root, &OPENCLAW_SOURCE_LOCK, "clawbox-1"), None);
}
