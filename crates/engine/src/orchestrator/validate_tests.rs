// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clawbox_core::{Profile, ServiceSelection};

#[test]
fn developer_profile_requires_both_openclaw_paths() {
    let err = validate_profile_mount_args(Profile::Developer, "", "/p", "").unwrap_err();
    assert!(err.message.contains("requires --openclaw-source and --openclaw-payload"));

    let err = validate_profile_mount_args(Profile::Developer, "/s", "", "").unwrap_err();
    assert!(err.message.contains("requires --openclaw-source and --openclaw-payload"));

    validate_profile_mount_args(Profile::Developer, "/s", "/p", "").unwrap();
    validate_profile_mount_args(Profile::Developer, "/s", "/p", "/g").unwrap();
}

#[yare::parameterized(
    source = { "/s", "", "" },
    payload = { "", "/p", "" },
    signal = { "", "", "/g" },
)]
fn standard_profile_rejects_mount_paths(source: &str, payload: &str, signal: &str) {
    let err = validate_profile_mount_args(Profile::Standard, source, payload, signal).unwrap_err();
    assert!(err.message.contains("only valid in developer mode"));
}

#[test]
fn standard_profile_without_mounts_is_fine() {
    validate_profile_mount_args(Profile::Standard, "", "", "").unwrap();
}

#[test]
fn signal_payload_requires_developer_profile() {
    let services = ServiceSelection { signal_cli: true, ..Default::default() };
    let err = validate_feature_flags(Profile::Standard, services, true, "").unwrap_err();
    assert!(err.message.contains("signal-cli payload mode is only valid in developer mode"));
}

#[test]
fn signal_payload_requires_signal_cli_provisioning() {
    let err = validate_feature_flags(Profile::Developer, ServiceSelection::default(), true, "/g")
        .unwrap_err();
    assert!(err
        .message
        .contains("--signal-cli-payload requires --add-signal-cli-provisioning"));

    let err = validate_feature_flags(Profile::Developer, ServiceSelection::default(), true, "")
        .unwrap_err();
    assert!(err
        .message
        .contains("--enable-signal-payload requires --add-signal-cli-provisioning"));
}

#[test]
fn enabled_services_pass_for_both_profiles() {
    let services = ServiceSelection { playwright: true, tailscale: true, signal_cli: true };
    validate_feature_flags(Profile::Standard, services, false, "").unwrap();
    validate_feature_flags(Profile::Developer, services, true, "/g").unwrap();
}

#[test]
fn validate_dirs_accepts_existing_and_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();
    validate_dirs(&[dir, "", ""]).unwrap();
}

#[test]
fn validate_dirs_rejects_missing_paths() {
    let err = validate_dirs(&["/definitely/not/a/dir"]).unwrap_err();
    assert!(err.message.contains("Expected directory does not exist: /definitely/not/a/dir"));
}

#[yare::parameterized(
    vz_domain = { "operation failed: VZErrorDomain code 3" },
    system_limit = { "the host exceeds the system limit for VMs" },
    resource_busy = { "Resource busy" },
    max_vms = { "maximum number of virtual machines reached" },
)]
fn limit_indicators_trigger_the_hint(message: &str) {
    let hinted = with_virtualization_limit_hint(message);
    assert!(hinted.contains("Virtualization.framework"));
    assert!(hinted.starts_with(message));
}

#[test]
fn unrelated_errors_are_left_alone() {
    let message = "disk quota exceeded";
    assert_eq!(with_virtualization_limit_hint(message), message);
}

#[test]
fn hint_is_idempotent() {
    let once = with_virtualization_limit_hint("VZErrorDomain error");
    let twice = with_virtualization_limit_hint(&once);
    assert_eq!(once, twice);
}
