// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clawbox_adapters::FakeBackend;

use crate::locks::{acquire_path_lock, OPENCLAW_PAYLOAD_LOCK, OPENCLAW_SOURCE_LOCK};

use super::super::test_support::Rig;

#[test]
fn developer_specs_bind_the_fixed_guest_paths() {
    let paths = SyncPaths {
        openclaw_source: "/src".into(),
        openclaw_payload: "/payload".into(),
        signal_payload: None,
    };
    let specs = developer_session_specs("clawbox-1", &paths);
    assert_eq!(specs.len(), 2);

    assert_eq!(specs[0].kind, "openclaw-source");
    assert_eq!(specs[0].guest_path, "/Users/clawbox-1/Developer/openclaw");
    assert!(specs[0].ignore_vcs);
    assert_eq!(specs[0].ignored_paths, vec!["node_modules"]);
    assert!(specs[0].ready_required);

    assert_eq!(specs[1].kind, "openclaw-payload");
    assert_eq!(specs[1].guest_path, "/Users/clawbox-1/.openclaw");
    assert!(!specs[1].ignore_vcs);
    assert!(specs[1].ready_required);
}

#[test]
fn signal_payload_session_is_optional_for_readiness() {
    let paths = SyncPaths {
        openclaw_source: "/src".into(),
        openclaw_payload: "/payload".into(),
        signal_payload: Some("/signal".into()),
    };
    let specs = developer_session_specs("clawbox-2", &paths);
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[2].kind, "signal-payload");
    assert_eq!(specs[2].guest_path, "/Users/clawbox-2/.local/share/signal-cli");
    assert!(!specs[2].ready_required);
}

#[test]
fn locked_sync_paths_require_both_openclaw_locks() {
    let rig = Rig::new(FakeBackend::new());
    let orch = rig.orchestrator();
    assert!(locked_sync_paths(&orch, "clawbox-1").is_none());

    let source = rig.tmp.path().join("src");
    let payload = rig.tmp.path().join("payload");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&payload).unwrap();

    acquire_path_lock(
        &rig.ctx.lock_root,
        &OPENCLAW_SOURCE_LOCK,
        "clawbox-1",
        source.to_str().unwrap(),
        &rig.backend,
    )
    .unwrap();
    assert!(locked_sync_paths(&orch, "clawbox-1").is_none());

    acquire_path_lock(
        &rig.ctx.lock_root,
        &OPENCLAW_PAYLOAD_LOCK,
        "clawbox-1",
        payload.to_str().unwrap(),
        &rig.backend,
    )
    .unwrap();

    let paths = locked_sync_paths(&orch, "clawbox-1").unwrap();
    assert_eq!(paths.openclaw_source, source.canonicalize().unwrap());
    assert_eq!(paths.openclaw_payload, payload.canonicalize().unwrap());
    assert_eq!(paths.signal_payload, None);
}

#[test]
#[serial_test::serial]
fn activation_failure_emits_start_and_error_events() {
    // No IP resolvable: activation fails in its first step.
    let rig = Rig::new(FakeBackend::new().with_vm("clawbox-1", true));
    let paths = SyncPaths {
        openclaw_source: rig.tmp.path().join("src"),
        openclaw_payload: rig.tmp.path().join("payload"),
        signal_payload: None,
    };
    let err = activate_vm_sync(
        &rig.orchestrator(),
        "clawbox-1",
        &paths,
        SyncCredential::Auto,
        "cli",
        "launch",
    )
    .unwrap_err();
    assert!(err.message.contains("Timed out waiting for 'clawbox-1' to report an IP address"));

    let log = rig.ctx.state_dir.join("logs").join("sync-events.jsonl");
    let text = std::fs::read_to_string(&log).unwrap();
    let events: Vec<serde_json::Value> =
        text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "activate_start");
    assert_eq!(events[0]["reason"], "launch");
    assert_eq!(events[1]["event"], "activate_error");
    assert!(events[1]["details"]["error"].as_str().unwrap().contains("IP address"));
}
