use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};
use crate::warden::daemon_lock;
use crate::warden::util;

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("monitoring-status");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.monitoring_status();
    if !reply.ok {
        report.issue(reply.message);
        return Ok(report);
    }

    // The in-process monitor is never running for a one-shot CLI call; the
    // daemon lock is the cross-process liveness signal.
    let mut daemon_running = false;
    match daemon_lock::read_daemon_lock_payload(manager.recorder().paths()) {
        Ok(Some(payload)) => {
            daemon_running = util::pid_alive(payload.pid);
            report.detail(format!("daemon_pid={}", payload.pid));
            if payload.started_at_epoch_secs > 0 {
                report.detail(format!(
                    "daemon_started_at_epoch_secs={}",
                    payload.started_at_epoch_secs
                ));
            }
        }
        Ok(None) => {}
        Err(err) => report.detail(format!("daemon lock unreadable: {err:#}")),
    }

    report.detail(reply.message);
    report.detail(format!(
        "monitor_running={}",
        reply.monitor_running || daemon_running
    ));
    report.detail(format!("check_interval_secs={}", reply.check_interval_secs));
    report.detail(format!("last_known_status={}", reply.last_known_status));
    report.detail(format!(
        "auto_detected_events={}",
        reply.auto_detected_events
    ));
    report.detail(format!(
        "current_session_active={}",
        reply.current_session_active
    ));

    Ok(report)
}
