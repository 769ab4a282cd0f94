#![cfg(not(windows))]
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

// The first `ps` answer feeds the duplicate-start guard; every later one
// feeds the watcher and its readiness re-check.
fn write_fake_docker(bin_path: &Path) {
    let script = r#"#!/usr/bin/env bash
set -euo pipefail

if [[ -n "${WARDEN_TEST_CMD_LOG:-}" ]]; then
  printf "%s\n" "$*" >> "${WARDEN_TEST_CMD_LOG}"
fi

if [[ "${1:-}" == "compose" && "${2:-}" == "ps" ]]; then
  count_file="${WARDEN_TEST_COUNT_FILE:-}"
  n=1
  if [[ -n "$count_file" ]]; then
    [[ -f "$count_file" ]] && n=$(( $(cat "$count_file") + 1 ))
    echo "$n" > "$count_file"
  fi
  if [[ "$n" -le 1 && -n "${WARDEN_TEST_PS_FIRST+x}" ]]; then
    printf "%s\n" "${WARDEN_TEST_PS_FIRST}"
  else
    printf "%s\n" "${WARDEN_TEST_PS_JSON:-}"
  fi
  exit 0
fi

if [[ "${1:-}" == "compose" && "${2:-}" == "up" ]]; then
  exit "${WARDEN_TEST_UP_EXIT:-0}"
fi

if [[ "${1:-}" == "compose" && "${2:-}" == "down" ]]; then
  exit 0
fi

exit 0
"#;
    fs::write(bin_path, script).expect("write fake docker");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(bin_path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(bin_path, perms).expect("chmod");
    }
}

fn seed_compose_dir(dir: &Path) {
    fs::create_dir_all(dir).expect("mkdir compose dir");
    fs::write(dir.join("docker-compose.yml"), "services:\n  app: {}\n").expect("compose file");
}

fn base_cmd(tmp: &Path, home: &Path, compose: &Path, docker: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("warden");
    cmd.current_dir(tmp)
        .env("WARDEN_HOME", home)
        .env("WARDEN_COMPOSE_DIR", compose)
        .env("WARDEN_DOCKER_BIN", docker)
        .env("WARDEN_START_SETTLE_SECS", "0")
        .env("WARDEN_START_POLL_INTERVAL_SECS", "1")
        .env("WARDEN_START_TIMEOUT_SECS", "5")
        .env("WARDEN_START_EARLY_FAIL_SECS", "5");
    cmd
}

#[test]
fn start_confirms_once_service_is_running_and_healthy() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_TEST_COUNT_FILE", tmp.path().join("ps-count"))
        .env("WARDEN_TEST_PS_FIRST", "")
        .env(
            "WARDEN_TEST_PS_JSON",
            r#"[{"Service":"app","State":"running","Health":"healthy"}]"#,
        )
        .arg("start")
        .assert()
        .success()
        .stdout(contains("start issued; watcher supervising until confirmation"))
        .stdout(contains("service started successfully"));

    let log = fs::read_to_string(home.join("events.log")).expect("events log");
    assert!(log.contains("SERVICE_START_CONFIRMED - manual_start_confirmed"));

    let stats = fs::read_to_string(home.join("stats.json")).expect("stats");
    assert!(stats.contains("\"total_starts\": 1"));
}

#[test]
fn start_fails_when_no_containers_appear() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_START_EARLY_FAIL_SECS", "0")
        .env("WARDEN_TEST_PS_JSON", "")
        .arg("start")
        .assert()
        .failure()
        .stdout(contains("no containers present"));

    let log = fs::read_to_string(home.join("events.log")).expect("events log");
    assert!(log.contains("START_FAILED - no_containers_after_start"));
    assert!(!home.join("sessions.json").exists());
}

#[test]
fn start_fails_fast_when_a_container_exits() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_TEST_COUNT_FILE", tmp.path().join("ps-count"))
        .env("WARDEN_TEST_PS_FIRST", "")
        .env(
            "WARDEN_TEST_PS_JSON",
            r#"[{"Service":"app","State":"exited (1)","Health":""}]"#,
        )
        .arg("start")
        .assert()
        .failure()
        .stdout(contains("container exited during start"));

    let log = fs::read_to_string(home.join("events.log")).expect("events log");
    assert!(log.contains("START_FAILED - container_exited_during_start"));
}

#[test]
fn start_is_refused_while_already_running() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);
    let cmd_log = tmp.path().join("docker-calls.log");

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_TEST_CMD_LOG", &cmd_log)
        .env(
            "WARDEN_TEST_PS_JSON",
            r#"[{"Service":"app","State":"running","Health":"healthy"}]"#,
        )
        .arg("start")
        .assert()
        .success()
        .stdout(contains("duplicate start ignored"));

    let calls = fs::read_to_string(&cmd_log).expect("docker call log");
    assert!(!calls.contains("compose up"));
    assert!(!home.join("events.log").exists());
}

#[test]
fn failed_start_command_reports_error_and_writes_nothing() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_TEST_PS_JSON", "")
        .env("WARDEN_TEST_UP_EXIT", "7")
        .arg("start")
        .assert()
        .failure()
        .stdout(contains("start command failed"));

    assert!(!home.join("events.log").exists());
}

#[test]
fn stop_closes_nothing_but_still_records_the_stop() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("warden");
    let compose_dir = tmp.path().join("stack");
    seed_compose_dir(&compose_dir);
    let docker = tmp.path().join("docker");
    write_fake_docker(&docker);

    base_cmd(tmp.path(), &home, &compose_dir, &docker)
        .env("WARDEN_TEST_PS_JSON", "")
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("service stopped"));

    let log = fs::read_to_string(home.join("events.log")).expect("events log");
    assert!(log.contains("SERVICE_STOP - manual_stop"));
    let stats = fs::read_to_string(home.join("stats.json")).expect("stats");
    assert!(stats.contains("last_stop"));
}
