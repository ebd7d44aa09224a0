// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::FakeBackend;

fn developer_specs() -> Vec<SessionSpec> {
    vec![
        SessionSpec {
            kind: "openclaw-source".to_string(),
            host_path: PathBuf::from("/tmp/source"),
            guest_path: "/Users/clawbox-1/Developer/openclaw".to_string(),
            ignore_vcs: true,
            ignored_paths: vec!["node_modules".to_string()],
            ready_required: true,
        },
        SessionSpec::new(
            "openclaw-payload",
            PathBuf::from("/tmp/payload"),
            "/Users/clawbox-1/.openclaw".to_string(),
        ),
    ]
}

#[test]
fn ssh_alias_writes_include_and_host_block() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let alias = ensure_ssh_alias(
        &ssh_dir,
        "clawbox-1",
        "192.168.64.201",
        "clawbox-1",
        &tmp.path().join("id_ed25519"),
    )
    .unwrap();
    assert_eq!(alias, "clawbox-mutagen-clawbox-1");

    let main_config = std::fs::read_to_string(ssh_dir.join("config")).unwrap();
    assert!(main_config.contains(SSH_CONFIG_INCLUDE));

    let managed = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    assert!(managed.contains("# CLAWBOX MUTAGEN BEGIN clawbox-1"));
    assert!(managed.contains("Host clawbox-mutagen-clawbox-1"));
    assert!(managed.contains("HostName 192.168.64.201"));
    assert!(managed.contains("StrictHostKeyChecking no"));
    assert!(managed.contains("UserKnownHostsFile /dev/null"));
    assert!(managed.contains("# CLAWBOX MUTAGEN END clawbox-1"));
}

#[test]
fn ssh_alias_upsert_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let identity = tmp.path().join("id_ed25519");
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.201", "clawbox-1", &identity).unwrap();
    let first = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.201", "clawbox-1", &identity).unwrap();
    let second = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    assert_eq!(first, second);

    let main_first = std::fs::read_to_string(ssh_dir.join("config")).unwrap();
    assert_eq!(main_first.matches(SSH_CONFIG_INCLUDE).count(), 1);
}

#[test]
fn ssh_alias_update_replaces_block_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let identity = tmp.path().join("id_ed25519");
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.201", "clawbox-1", &identity).unwrap();
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.202", "clawbox-1", &identity).unwrap();
    let managed = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    assert!(managed.contains("HostName 192.168.64.202"));
    assert!(!managed.contains("HostName 192.168.64.201"));
    assert_eq!(managed.matches("# CLAWBOX MUTAGEN BEGIN clawbox-1").count(), 1);
}

#[test]
fn remove_ssh_alias_preserves_other_blocks() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let identity = tmp.path().join("id_ed25519");
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.201", "clawbox-1", &identity).unwrap();
    ensure_ssh_alias(&ssh_dir, "clawbox-2", "192.168.64.202", "clawbox-2", &identity).unwrap();
    remove_ssh_alias(&ssh_dir, "clawbox-1").unwrap();
    let managed = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    assert!(!managed.contains("BEGIN clawbox-1"));
    assert!(managed.contains("BEGIN clawbox-2"));
    assert!(managed.contains("HostName 192.168.64.202"));
}

#[test]
fn ensure_sessions_creates_labeled_two_way_sessions_then_flushes() {
    let cli = RecordingSyncCli::new();
    ensure_vm_sessions(&cli, "clawbox-1", "clawbox-mutagen-clawbox-1", &developer_specs()).unwrap();

    let calls = cli.calls();
    let creates: Vec<&Vec<String>> =
        calls.iter().filter(|call| call[..2] == ["sync", "create"]).collect();
    assert_eq!(creates.len(), 2);
    for create in &creates {
        assert!(create.windows(2).any(|w| w == ["--mode", "two-way-resolved"]));
        assert!(create.windows(2).any(|w| w == ["--label", "clawbox.vm=clawbox-1"]));
        assert!(create.windows(2).any(|w| w == ["--label", "clawbox.managed=true"]));
    }
    assert!(creates[0].contains(&"--ignore-vcs".to_string()));
    assert!(creates[0].windows(2).any(|w| w == ["--ignore", "node_modules"]));
    assert_eq!(
        creates[0].last().map(String::as_str),
        Some("clawbox-mutagen-clawbox-1:/Users/clawbox-1/Developer/openclaw")
    );

    let flushes: Vec<&Vec<String>> =
        calls.iter().filter(|call| call[..2] == ["sync", "flush"]).collect();
    assert_eq!(
        flushes,
        vec![&vec![
            "sync".to_string(),
            "flush".to_string(),
            "--label-selector".to_string(),
            "clawbox.vm=clawbox-1".to_string(),
        ]]
    );
}

#[test]
fn ensure_sessions_terminates_same_named_sessions_first() {
    let cli = RecordingSyncCli::new();
    ensure_vm_sessions(&cli, "clawbox-1", "alias", &developer_specs()).unwrap();
    let calls = cli.calls();
    assert_eq!(
        calls[0],
        vec!["sync", "terminate", "clawbox-clawbox-1-openclaw-source"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert_eq!(calls[1][..2], ["sync", "create"]);
}

#[test]
fn ensure_sessions_requires_the_cli() {
    let cli = RecordingSyncCli::unavailable();
    let err = ensure_vm_sessions(&cli, "clawbox-1", "alias", &developer_specs()).unwrap_err();
    assert!(matches!(err, SyncError::CliUnavailable));
    assert!(cli.calls().is_empty());
}

#[test]
fn ensure_sessions_propagates_create_failures() {
    let cli = RecordingSyncCli::new();
    cli.respond_with(&["sync", "create"], 1, "");
    let err = ensure_vm_sessions(&cli, "clawbox-1", "alias", &developer_specs()).unwrap_err();
    assert!(matches!(err, SyncError::CommandFailed { exit_code: 1, .. }));
}

#[test]
fn terminate_is_noop_without_cli() {
    let cli = RecordingSyncCli::unavailable();
    terminate_vm_sessions(&cli, "clawbox-1", true).unwrap();
    assert!(cli.calls().is_empty());
}

#[test]
fn terminate_with_flush_flushes_first() {
    let cli = RecordingSyncCli::new();
    terminate_vm_sessions(&cli, "clawbox-1", true).unwrap();
    let calls = cli.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][..2], ["sync", "flush"]);
    assert_eq!(calls[1][..2], ["sync", "terminate"]);
    assert!(calls[1].windows(2).any(|w| w == ["--label-selector", "clawbox.vm=clawbox-1"]));
}

#[test]
fn sessions_exist_uses_label_selector() {
    let cli = RecordingSyncCli::new();
    cli.respond_with(&["sync", "list"], 0, "sync_abc\n");
    assert!(vm_sessions_exist(&cli, "clawbox-1"));
    let calls = cli.calls();
    assert!(calls[0].windows(2).any(|w| w == ["--label-selector", "clawbox.vm=clawbox-1"]));

    let cli = RecordingSyncCli::new();
    assert!(!vm_sessions_exist(&cli, "clawbox-1"));
}

#[test]
fn sessions_status_prefers_stdout() {
    let cli = RecordingSyncCli::new();
    cli.respond_with(&["sync", "list"], 0, "session status\n");
    assert_eq!(vm_sessions_status(&cli, "clawbox-1"), "session status");

    let cli = RecordingSyncCli::unavailable();
    assert_eq!(vm_sessions_status(&cli, "clawbox-1"), "mutagen not available");
}

#[test]
fn registry_sorts_and_deduplicates() {
    let tmp = tempfile::tempdir().unwrap();
    mark_vm_active(tmp.path(), "clawbox-2").unwrap();
    mark_vm_active(tmp.path(), "clawbox-1").unwrap();
    mark_vm_active(tmp.path(), "clawbox-2").unwrap();
    assert_eq!(active_vms(tmp.path()), vec!["clawbox-1", "clawbox-2"]);

    clear_vm_active(tmp.path(), "clawbox-1").unwrap();
    assert_eq!(active_vms(tmp.path()), vec!["clawbox-2"]);
}

#[test]
fn registry_tolerates_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mutagen").join("active_vms.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();
    assert!(active_vms(tmp.path()).is_empty());

    std::fs::write(&path, "{\"vms\": \"not a list\"}").unwrap();
    assert!(active_vms(tmp.path()).is_empty());
}

#[test]
fn teardown_clears_registry_and_alias() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let state_dir = tmp.path().join("state");
    let identity = tmp.path().join("id_ed25519");
    ensure_ssh_alias(&ssh_dir, "clawbox-1", "192.168.64.201", "clawbox-1", &identity).unwrap();
    mark_vm_active(&state_dir, "clawbox-1").unwrap();

    let cli = RecordingSyncCli::new();
    teardown_vm_sync(&cli, &ssh_dir, &state_dir, "clawbox-1", false).unwrap();

    assert!(active_vms(&state_dir).is_empty());
    let managed = std::fs::read_to_string(ssh_dir.join(MANAGED_SSH_CONFIG_NAME)).unwrap();
    assert!(!managed.contains("clawbox-1"));
    let calls = cli.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][..2], ["sync", "terminate"]);
}

#[test]
fn reconcile_tears_down_stopped_vms_only() {
    let tmp = tempfile::tempdir().unwrap();
    let ssh_dir = tmp.path().join(".ssh");
    let state_dir = tmp.path().join("state");
    mark_vm_active(&state_dir, "clawbox-1").unwrap();
    mark_vm_active(&state_dir, "clawbox-2").unwrap();

    let backend =
        FakeBackend::new().with_vm("clawbox-1", true).with_vm("clawbox-2", false);
    let cli = RecordingSyncCli::new();
    reconcile_vm_sync(&cli, &backend, &ssh_dir, &state_dir);

    assert_eq!(active_vms(&state_dir), vec!["clawbox-1"]);
}

#[test]
fn keypair_is_reused_once_created() {
    let tmp = tempfile::tempdir().unwrap();
    let key_dir = tmp.path().join("mutagen").join("keys").join("clawbox-1");
    std::fs::create_dir_all(&key_dir).unwrap();
    std::fs::write(key_dir.join("id_ed25519"), "private").unwrap();
    std::fs::write(key_dir.join("id_ed25519.pub"), "public").unwrap();

    let paths = ensure_vm_keypair(tmp.path(), "clawbox-1").unwrap();
    assert_eq!(paths.private_key, key_dir.join("id_ed25519"));
    assert_eq!(std::fs::read_to_string(&paths.private_key).unwrap(), "private");
}

#[test]
fn authorized_key_install_is_guarded_by_grep() {
    let shell = crate::probe::FakeRemoteShell::new().with_response(0, "", "");
    install_authorized_key(&shell, "clawbox-1", None, "ssh-ed25519 AAAA key\n").unwrap();
    let calls = shell.calls();
    assert_eq!(calls.len(), 1);
    let (target, cmd, become_root) = &calls[0];
    assert_eq!(target, "clawbox-1");
    assert!(!become_root);
    assert!(cmd.contains("grep -qxF 'ssh-ed25519 AAAA key'"));
    assert!(cmd.contains(">> ~/.ssh/authorized_keys"));
}

#[test]
fn guest_dir_prep_handles_symlinks_and_permissions() {
    let shell = crate::probe::FakeRemoteShell::new().with_response(0, "", "");
    prepare_guest_dirs(&shell, "clawbox-1", None, &developer_specs()).unwrap();
    let calls = shell.calls();
    assert_eq!(calls.len(), 1);
    let (_, cmd, become_root) = &calls[0];
    assert!(become_root);
    assert!(cmd.contains("if [ -L /Users/clawbox-1/.openclaw ]; then rm -f"));
    assert!(cmd.contains("mkdir -p /Users/clawbox-1/Developer/openclaw"));
    assert!(cmd.contains("chmod -R a+rwX"));
}

#[test]
fn session_names_sanitize_vm_names() {
    assert_eq!(session_name("claw.box 1", "kind"), "clawbox-claw-box-1-kind");
    assert_eq!(sync_ssh_alias("claw.box 1"), "clawbox-mutagen-claw-box-1");
}
