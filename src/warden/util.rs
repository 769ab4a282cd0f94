use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime};
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Local wall-clock time, as stamped into event-log lines and session records.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// ISO-8601 with microsecond precision, no offset. `parse_timestamp` must
/// round-trip anything this produces.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Parse an event-log timestamp. Accepts the native naive-local form and,
/// for hand-edited or migrated logs, RFC 3339 with an offset.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = raw.parse::<NaiveDateTime>() {
        return Some(ts);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_local())
}

/// Day bucket key used by the stats snapshot.
pub fn day_key(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Truncate `input` to at most `max_chars` Unicode characters, stripping
/// control characters and appending `…` when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // The fs2 exclusive-lock probe is the real liveness check on Windows;
        // `kill -0` has no counterpart without pulling in winapi.
        true
    } else {
        let mut cmd = Command::new("kill");
        cmd.arg("-0").arg(pid.to_string());
        let Ok(output) = run_command_with_optional_timeout(&mut cmd, Some(2)) else {
            return false;
        };
        output.status.success()
    }
}

pub fn run_command_with_optional_timeout(
    cmd: &mut Command,
    timeout_secs: Option<u64>,
) -> Result<Output> {
    let Some(timeout_secs) = timeout_secs else {
        return Ok(cmd.output()?);
    };
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    let mut child = cmd.spawn()?;
    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if started.elapsed() >= Duration::from_secs(timeout_secs) {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("command timed out after {}s", timeout_secs);
        }
        thread::sleep(Duration::from_millis(50));
    }
}
