// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod helpers;

use helpers::{DEFAULT_TIMEOUT, DaemonHandle, pid_is_alive, wait_for_pid_gone, write_config};
use nix::sys::signal::Signal;
use std::time::Duration;

fn sleeper(name: &str, auto_start: bool) -> String {
    format!(
        "  - name: {name}\n    full_path: /bin/sleep\n    start_command: [\"300\"]\n    expected_return: 0\n    exec_on_startup: {auto_start}\n"
    )
}

fn config(entries: &[String]) -> String {
    format!("supervisor-processes:\n{}", entries.concat())
}

// ===========================================================================
// Group 1: Startup
// ===========================================================================

#[test]
fn test_daemon_starts_auto_start_processes() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = config(&[sleeper("web", true), sleeper("manual", false)]);
    let mut daemon = DaemonHandle::start(dir.path(), &yaml);

    assert!(daemon.wait_for_event("SUCCESS: web: Started (pid"));
    assert!(daemon.events()[0].ends_with("taskmaster: Starting taskmaster..."));
    let pids = daemon.started_pids();
    assert_eq!(pids.len(), 1, "only the exec_on_startup entry should start");
    assert!(pid_is_alive(pids[0]));

    let status = daemon.exit();
    assert!(status.success(), "daemon should exit cleanly");
    assert!(wait_for_pid_gone(pids[0], Duration::from_secs(5)));
    assert!(daemon.wait_for_event("Killed: 1 process(es)"));
    assert!(daemon.wait_for_event("Exiting taskmaster..."));
}

#[test]
fn test_missing_config_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start_with(
        &dir.path().join("nonexistent.yaml"),
        &dir.path().join("taskmaster.log"),
    );
    let status = daemon.wait_with_timeout(DEFAULT_TIMEOUT);
    assert!(!status.success());
    assert!(daemon.wait_for_event("nonexistent.yaml: cannot read"));
}

#[test]
fn test_config_without_valid_entry_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "supervisor-processes:\n  - name: broken\n    start_command: []\n    expected_return: 0\n";
    let mut daemon = DaemonHandle::start(dir.path(), yaml);
    let status = daemon.wait_with_timeout(DEFAULT_TIMEOUT);
    assert!(!status.success());
    assert!(daemon.wait_for_event("ERROR: broken: full_path does not exist or is invalid"));
}

// ===========================================================================
// Group 2: Commands
// ===========================================================================

#[test]
fn test_start_stop_status_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("job", false)]));
    assert!(daemon.wait_for_output("taskmasterctl>$ ", DEFAULT_TIMEOUT));

    daemon.send_command("start job");
    assert!(daemon.wait_for_output("taskmaster: success: job: starting", DEFAULT_TIMEOUT));
    assert!(daemon.wait_for_event("SUCCESS: job: Started (pid"));
    let pid = daemon.started_pids()[0];

    daemon.send_command("status job");
    assert!(daemon.wait_for_output("running", DEFAULT_TIMEOUT));

    daemon.send_command("start job");
    assert!(daemon.wait_for_output("job: already running", DEFAULT_TIMEOUT));

    daemon.send_command("stop job");
    assert!(daemon.wait_for_output("taskmaster: success: job: stopping", DEFAULT_TIMEOUT));
    assert!(wait_for_pid_gone(pid, Duration::from_secs(5)));
    assert!(daemon.wait_for_event("SUCCESS: job: Stopped by operator (signal 15)."));
    assert_eq!(daemon.started_pids().len(), 1);

    daemon.send_command("stop job");
    assert!(daemon.wait_for_output("job: is not running", DEFAULT_TIMEOUT));

    assert!(daemon.exit().success());
}

#[test]
fn test_unknown_command_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("job", false)]));

    daemon.send_command("frobnicate");
    assert!(daemon.wait_for_output("Command not found: frobnicate", DEFAULT_TIMEOUT));

    daemon.send_command("list");
    assert!(daemon.wait_for_output("configured programs list ====\njob\n", DEFAULT_TIMEOUT));

    daemon.send_command("history");
    assert!(daemon.wait_for_output("   1  frobnicate\n   2  list\n   3  history\n", DEFAULT_TIMEOUT));

    assert!(daemon.exit().success());
}

#[test]
fn test_end_of_input_exits_and_stops_processes() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("web", true)]));
    assert!(daemon.wait_for_event("Started (pid"));
    let pid = daemon.started_pids()[0];

    daemon.close_stdin();
    let status = daemon.wait_with_timeout(Duration::from_secs(30));
    assert!(status.success());
    assert!(!pid_is_alive(pid));
}

#[test]
fn test_sigterm_exits_and_stops_processes() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("web", true)]));
    assert!(daemon.wait_for_event("Started (pid"));
    let pid = daemon.started_pids()[0];
    // Signal handlers are installed before the first prompt is written.
    assert!(daemon.wait_for_output("taskmasterctl>$ ", DEFAULT_TIMEOUT));

    daemon.send_signal(Signal::SIGTERM);
    let status = daemon.wait_with_timeout(Duration::from_secs(30));
    assert!(status.success());
    assert!(!pid_is_alive(pid));
}

// ===========================================================================
// Group 3: Restart policy
// ===========================================================================

#[test]
fn test_unexpected_exit_restarted_up_to_limit() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "\
supervisor-processes:
  - name: flaky
    full_path: /bin/sh
    start_command: [\"-c\", \"exit 3\"]
    expected_return: 0
    should_restart: 1
    number_of_restarts: 2
    exec_on_startup: true
";
    let mut daemon = DaemonHandle::start(dir.path(), yaml);

    assert!(daemon.wait_for_event("ERROR: flaky: Gave up after 2 restart(s)."));
    assert_eq!(daemon.count_events("SUCCESS: flaky: Started (pid"), 3);
    assert_eq!(
        daemon.count_events("ERROR: flaky: Unexpected return value: 3 expected: 0"),
        3
    );
    assert!(daemon.exit().success());
}

#[test]
fn test_expected_exit_code_not_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "\
supervisor-processes:
  - name: done
    full_path: /bin/sh
    start_command: [\"-c\", \"exit 2\"]
    expected_return: [0, 2]
    should_restart: 1
    number_of_restarts: 5
    exec_on_startup: true
";
    let mut daemon = DaemonHandle::start(dir.path(), yaml);

    assert!(daemon.wait_for_event("SUCCESS: done: Terminated without errors."));
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(daemon.count_events("Started (pid"), 1);
    assert!(daemon.exit().success());
}

#[test]
fn test_launch_failure_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "\
supervisor-processes:
  - name: ghost
    full_path: /nonexistent/binary
    start_command: []
    expected_return: 0
    exec_on_startup: true
";
    let mut daemon = DaemonHandle::start(dir.path(), yaml);
    assert!(daemon.wait_for_event("ERROR: ghost: Did not start. strerror:"));

    daemon.send_command("status ghost");
    assert!(daemon.wait_for_output("failed", DEFAULT_TIMEOUT));
    assert!(daemon.exit().success());
}

// ===========================================================================
// Group 4: Reload
// ===========================================================================

#[test]
fn test_sighup_reload_of_identical_config_keeps_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("web", true)]));
    assert!(daemon.wait_for_event("Started (pid"));
    let pid = daemon.started_pids()[0];
    assert!(daemon.wait_for_output("taskmasterctl>$ ", DEFAULT_TIMEOUT));

    daemon.send_signal(Signal::SIGHUP);
    assert!(daemon.wait_for_output("reloaded (1 registered, 0 skipped, 0 restarted)", DEFAULT_TIMEOUT));
    assert!(pid_is_alive(pid));
    assert_eq!(daemon.started_pids(), vec![pid]);
    assert!(daemon.exit().success());
}

#[test]
fn test_reload_with_changed_path_relaunches() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("web", true)]));
    assert!(daemon.wait_for_event("Started (pid"));
    let old_pid = daemon.started_pids()[0];

    let changed = "\
supervisor-processes:
  - name: web
    full_path: /bin/sh
    start_command: [\"-c\", \"exec sleep 300\"]
    expected_return: 0
    exec_on_startup: true
";
    write_config(daemon.config_path(), changed);
    daemon.send_command("reload");
    assert!(daemon.wait_for_output("1 restarted", DEFAULT_TIMEOUT));
    assert!(daemon.wait_for_event_count("Started (pid", 2, DEFAULT_TIMEOUT));

    let pids = daemon.started_pids();
    assert_ne!(pids[1], old_pid);
    assert!(!pid_is_alive(old_pid));
    assert!(pid_is_alive(pids[1]));
    assert!(daemon.exit().success());
}

#[test]
fn test_reload_adds_new_entries() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonHandle::start(dir.path(), &config(&[sleeper("web", false)]));

    write_config(
        daemon.config_path(),
        &config(&[sleeper("web", false), sleeper("api", false)]),
    );
    daemon.send_command("reload");
    assert!(daemon.wait_for_output("reloaded (2 registered", DEFAULT_TIMEOUT));

    daemon.send_command("list");
    assert!(daemon.wait_for_output("list ====\napi\nweb\n", DEFAULT_TIMEOUT));
    assert!(daemon.exit().success());
}

// ===========================================================================
// Group 5: Replicas and output
// ===========================================================================

#[test]
fn test_replicas_registered_and_started() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "\
supervisor-processes:
  - name: worker
    full_path: /bin/sleep
    start_command: [\"300\"]
    expected_return: 0
    number_of_processes: 2
    exec_on_startup: true
";
    let mut daemon = DaemonHandle::start(dir.path(), yaml);
    assert!(daemon.wait_for_event_count("Started (pid", 3, DEFAULT_TIMEOUT));

    daemon.send_command("list");
    assert!(daemon.wait_for_output("worker\nworker_1\nworker_2\n", DEFAULT_TIMEOUT));

    let pids = daemon.started_pids();
    assert_eq!(pids.len(), 3);
    assert!(daemon.exit().success());
    for pid in pids {
        assert!(wait_for_pid_gone(pid, Duration::from_secs(5)));
    }
}

#[test]
fn test_output_redirect_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("hello.out");
    let yaml = format!(
        "\
supervisor-processes:
  - name: hello
    full_path: /bin/sh
    start_command: [\"-c\", \"echo \\\"$GREETING\\\"; echo oops >&2\"]
    expected_return: 0
    additional_env:
      - GREETING=bonjour
    output_redirect_path: {}
    exec_on_startup: true
",
        out.display()
    );
    let mut daemon = DaemonHandle::start(dir.path(), &yaml);
    assert!(daemon.wait_for_event("SUCCESS: hello: Terminated without errors."));

    let contents = std::fs::read_to_string(&out).unwrap();
    assert_eq!(contents, "bonjour\noops\n");
    assert!(daemon.exit().success());
}
