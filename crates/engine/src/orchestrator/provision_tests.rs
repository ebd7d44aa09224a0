// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clawbox_adapters::FakeBackend;

use super::super::test_support::Rig;

fn standard_provision(vm_number: u32) -> ProvisionOptions {
    ProvisionOptions {
        vm_number,
        profile: Profile::Standard,
        services: ServiceSelection::default(),
        enable_signal_payload: false,
        sync_already_active: false,
    }
}

fn seed_secrets(rig: &Rig) {
    std::fs::write(&rig.ctx.secrets_file, "vm_password: \"clawbox\"\n").unwrap();
}

#[test]
fn provision_requires_the_secrets_file() {
    let rig = Rig::new(FakeBackend::new().with_vm("clawbox-1", true));
    let err = rig.orchestrator().provision(&standard_provision(1)).unwrap_err();
    assert!(err.message.contains("Secrets file not found"));
    assert!(err.message.contains("EOF_SECRETS"));
}

#[test]
fn provision_requires_an_existing_running_vm() {
    let rig = Rig::new(FakeBackend::new());
    seed_secrets(&rig);
    let err = rig.orchestrator().provision(&standard_provision(1)).unwrap_err();
    assert!(err.message.contains("does not exist"));

    let rig = Rig::new(FakeBackend::new().with_vm("clawbox-1", false));
    seed_secrets(&rig);
    let err = rig.orchestrator().provision(&standard_provision(1)).unwrap_err();
    assert!(err.message.contains("is not running"));
}

#[test]
fn provision_passes_the_variable_block_and_writes_the_marker() {
    let rig = Rig::new(
        FakeBackend::new().with_vm("clawbox-2", true).with_ip("clawbox-2", "192.168.64.7"),
    );
    seed_secrets(&rig);

    let opts = ProvisionOptions {
        vm_number: 2,
        profile: Profile::Standard,
        services: ServiceSelection { playwright: true, tailscale: true, signal_cli: false },
        enable_signal_payload: false,
        sync_already_active: false,
    };
    rig.orchestrator().provision(&opts).unwrap();

    let calls = rig.provisioner.calls();
    assert_eq!(calls.len(), 1);
    let args = &calls[0];
    assert_eq!(args[0], "-i");
    assert_eq!(args[1], "192.168.64.7,");
    assert_eq!(args[2], "playbooks/provision.yml");
    assert!(args.contains(&format!("@{}", rig.ctx.secrets_file.display())));
    assert!(args.contains(&"ansible_become=true".to_string()));
    assert!(args.contains(&"vm_number=2".to_string()));
    assert!(args.contains(&"clawbox_enable_playwright=true".to_string()));
    assert!(args.contains(&"clawbox_enable_tailscale=true".to_string()));
    assert!(args.contains(&"clawbox_enable_signal_cli=false".to_string()));

    let marker =
        clawbox_core::ProvisionMarker::from_file(&rig.marker_path("clawbox-2")).unwrap();
    assert!(marker.playwright && marker.tailscale && !marker.signal_cli);
}

#[test]
fn failed_playbook_leaves_no_marker() {
    let rig = Rig::new(
        FakeBackend::new().with_vm("clawbox-1", true).with_ip("clawbox-1", "192.168.64.7"),
    )
    .with_provisioner(clawbox_adapters::FakeProvisioner::failing(2));
    seed_secrets(&rig);

    let err = rig.orchestrator().provision(&standard_provision(1)).unwrap_err();
    assert_eq!(err.message, "Provisioning failed.");
    assert!(!rig.marker_path("clawbox-1").exists());
}

#[test]
fn developer_provision_without_locked_paths_points_at_launch() {
    let rig = Rig::new(
        FakeBackend::new().with_vm("clawbox-1", true).with_ip("clawbox-1", "192.168.64.7"),
    );
    seed_secrets(&rig);

    let opts = ProvisionOptions {
        vm_number: 1,
        profile: Profile::Developer,
        services: ServiceSelection::default(),
        enable_signal_payload: false,
        sync_already_active: false,
    };
    let err = rig.orchestrator().provision(&opts).unwrap_err();
    assert!(err.message.contains("No locked source/payload paths found"));
    assert!(err.message.contains("clawbox launch 1 --developer"));
}
