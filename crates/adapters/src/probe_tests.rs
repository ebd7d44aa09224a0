// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn paths(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_bare_and_quoted_status_tokens() {
    let mount_paths = paths(&["/Volumes/My Shared Files/openclaw-source", "/tmp/plain"]);
    let stdout = "clawbox-1 | CHANGED | rc=0 >>\n\
                  '/Volumes/My Shared Files/openclaw-source'=mounted\n\
                  /tmp/plain=dir\n";
    let statuses = parse_path_statuses(stdout, &mount_paths);
    assert_eq!(statuses["/Volumes/My Shared Files/openclaw-source"], "mounted");
    assert_eq!(statuses["/tmp/plain"], "dir");
}

#[test]
fn unobserved_paths_stay_unknown() {
    let mount_paths = paths(&["/a", "/b"]);
    let statuses = parse_path_statuses("/a=ok\n", &mount_paths);
    assert_eq!(statuses["/a"], "ok");
    assert_eq!(statuses["/b"], STATUS_UNKNOWN);
}

#[test]
fn unparseable_lines_are_ignored() {
    let mount_paths = paths(&["/a"]);
    let statuses = parse_path_statuses("garbage\n/a=nonsense\n/a=missing\n", &mount_paths);
    assert_eq!(statuses["/a"], "missing");
}

#[test]
fn first_observation_wins() {
    let mount_paths = paths(&["/a"]);
    let statuses = parse_path_statuses("/a=dir\n/a=missing\n", &mount_paths);
    assert_eq!(statuses["/a"], "dir");
}

#[test]
fn mount_command_covers_all_states() {
    let cmd = mount_status_command(&paths(&["/Volumes/My Shared Files/x"]));
    assert!(cmd.contains("/sbin/mount"));
    assert!(cmd.contains("grep -F -- ' on /Volumes/My Shared Files/x ('"));
    assert!(cmd.contains("mounted"));
    assert!(cmd.contains("dir"));
    assert!(cmd.contains("missing"));
}

#[test]
fn run_path_probe_classifies_and_reports_error_text() {
    let shell = FakeRemoteShell::new().with_response(2, "/a=missing\n", "unreachable\n");
    let outcome = run_path_probe(&shell, "clawbox-1", "cmd", &paths(&["/a"]), None).unwrap();
    assert_eq!(outcome.exit_code, 2);
    assert_eq!(outcome.statuses["/a"], "missing");
    assert_eq!(outcome.last_error, "unreachable");
}

#[test]
fn wait_for_probe_succeeds_on_predicate() {
    let shell = FakeRemoteShell::new().with_response(0, "/a=ok\n", "");
    let (ok, statuses, _) = wait_for_probe(
        &shell,
        "clawbox-1",
        "cmd",
        &paths(&["/a"]),
        Duration::from_secs(4),
        None,
        |exit, statuses| exit == 0 && statuses.values().all(|s| s == "ok"),
    )
    .unwrap();
    assert!(ok);
    assert_eq!(statuses["/a"], "ok");
}

#[test]
fn wait_for_probe_times_out_with_last_observation() {
    let shell = FakeRemoteShell::new().with_response(1, "/a=missing\n", "not yet\n");
    let (ok, statuses, last_error) = wait_for_probe(
        &shell,
        "clawbox-1",
        "cmd",
        &paths(&["/a"]),
        Duration::ZERO,
        None,
        |exit, _| exit == 0,
    )
    .unwrap();
    assert!(!ok);
    assert_eq!(statuses["/a"], STATUS_UNKNOWN);
    assert_eq!(last_error, "");
}

#[test]
fn format_follows_input_order() {
    let mount_paths = paths(&["/b", "/a"]);
    let statuses = parse_path_statuses("/a=ok\n/b=dir\n", &mount_paths);
    assert_eq!(format_path_statuses(&mount_paths, &statuses), "    - /b: dir\n    - /a: ok");
}
