// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level specs driving the compiled `clawbox` binary.
//!
//! These exercise the argument surface and the earliest validation layer,
//! which fail before any external tool is consulted. Each invocation gets
//! an isolated state directory so nothing under `~/.clawbox` is touched.

use assert_cmd::Command;

fn clawbox(state_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("clawbox").expect("binary builds");
    cmd.env("CLAWBOX_STATE_DIR", state_dir);
    cmd.env("CLAWBOX_DATA_DIR", state_dir.join("data"));
    cmd.env("CLAWBOX_SECRETS_FILE", state_dir.join("secrets.yml"));
    cmd
}

#[test]
fn no_arguments_shows_usage() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path()).assert().failure().stderr(predicates::str::contains("Usage"));
}

#[test]
fn help_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Clawbox macOS VM orchestration"));
}

#[test]
fn zero_vm_number_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path()).args(["create", "0"]).assert().failure();
}

#[test]
fn developer_up_requires_mount_paths() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args(["up", "1", "--developer"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains(
            "Developer profile requires --openclaw-source and --openclaw-payload",
        ));
}

#[test]
fn standard_up_rejects_mount_paths() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args(["up", "1", "--openclaw-source", "/tmp/src"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("only valid in developer mode"));
}

#[test]
fn signal_payload_requires_signal_cli_provisioning() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args([
            "up",
            "1",
            "--developer",
            "--openclaw-source",
            "/S",
            "--openclaw-payload",
            "/P",
            "--signal-cli-payload",
            "/G",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains(
            "--signal-cli-payload requires --add-signal-cli-provisioning",
        ));
}

#[test]
fn profile_shortcuts_are_mutually_exclusive() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args(["launch", "1", "--developer", "--standard"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--standard"));
}

#[test]
fn up_rejects_duplicate_vm_number() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args(["up", "2", "--number", "3"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("VM number provided more than once"));
}

#[test]
fn image_build_without_template_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    clawbox(tmp.path())
        .args(["image", "build"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("Packer template not found"));
}
