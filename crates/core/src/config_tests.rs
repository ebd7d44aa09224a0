// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn scalar_falls_back_to_default() {
    let vars = GroupVars::empty();
    assert_eq!(vars.scalar("vm_base_name", "clawbox"), "clawbox");

    let vars = GroupVars::from_text("vm_base_name:\n");
    assert_eq!(vars.scalar("vm_base_name", "clawbox"), "clawbox");
}

#[test]
fn scalar_reads_configured_value() {
    let vars = GroupVars::from_text("bootstrap_admin_user: \"admin2\"\n");
    assert_eq!(vars.scalar("bootstrap_admin_user", "admin"), "admin2");
}

#[test]
fn base_name_accepts_valid_names() {
    let vars = GroupVars::from_text("vm_base_name: my-fleet2\n");
    assert_eq!(vars.vm_base_name(), "my-fleet2");
}

#[yare::parameterized(
    leading_dash = { "-bad" },
    underscore = { "bad_name" },
    space = { "bad name" },
    empty_quotes = { "\"\"" },
    unicode = { "bäd" },
)]
fn base_name_rejects_invalid_names(raw: &str) {
    let vars = GroupVars::from_text(format!("vm_base_name: {raw}\n"));
    assert_eq!(vars.vm_base_name(), DEFAULT_VM_BASE_NAME);
}

#[test]
fn vm_name_formatting() {
    assert_eq!(vm_name_for("clawbox", 1), "clawbox-1");
    assert_eq!(vm_name_for("fleet", 12), "fleet-12");
}

#[yare::parameterized(
    simple = { "clawbox-1", Some(1) },
    multi_digit = { "clawbox-42", Some(42) },
    zero = { "clawbox-0", None },
    no_suffix = { "clawbox", None },
    empty_suffix = { "clawbox-", None },
    non_numeric = { "clawbox-abc", None },
    wrong_base = { "other-1", None },
    nested_dash = { "clawbox-1-2", None },
)]
fn suffix_number_parsing(name: &str, expected: Option<u32>) {
    assert_eq!(parse_vm_suffix_number(name, "clawbox"), expected);
}
