use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::commands::{CommandReport, manager_or_issue};
use crate::warden::daemon_lock;
use crate::warden::events::{Event, EventListener};
use crate::warden::util;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

/// Stand-in notification collaborator for daemon mode: every dispatched
/// event becomes one stdout line.
struct ConsoleListener;

impl EventListener for ConsoleListener {
    fn on_event(&self, event: &Event) -> Result<()> {
        println!(
            "event kind={} message={}",
            event.kind.as_str(),
            event.message.replace('\n', " ")
        );
        Ok(())
    }
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    if opts.daemon {
        let lock = match daemon_lock::acquire_daemon_lock(manager.recorder().paths()) {
            Ok(lock) => lock,
            Err(err) => {
                report.issue(format!("{err:#}"));
                return Ok(report);
            }
        };

        manager.register_event_listener(Arc::new(ConsoleListener));
        manager.start_monitoring();

        let handler_manager = manager.clone();
        ctrlc::set_handler(move || handler_manager.request_stop())
            .context("failed to install signal handler")?;

        report.detail(format!(
            "monitor daemon running (interval={}s); waiting for SIGINT/SIGTERM",
            manager.config().monitor.interval_secs
        ));
        manager.wait_for_stop();
        manager.shutdown(SHUTDOWN_JOIN_TIMEOUT);
        drop(lock);
        report.detail("monitor stopped");
        return Ok(report);
    }

    let outcome = manager.poll_once(util::now_local());
    report.detail("monitor cycle completed");
    report.detail(format!("any_running={}", outcome.any_running));
    report.detail(format!("health={}", outcome.health.as_str()));
    report.detail(format!(
        "effective_health={}",
        outcome.effective_health.as_str()
    ));
    for container in &outcome.snapshots {
        report.detail(format!(
            "container service={} state={} health={}",
            container.service, container.state, container.health
        ));
    }
    let paths = manager.recorder().paths();
    report.detail(format!("events_log={}", paths.events_log.display()));
    report.detail(format!("stats_file={}", paths.stats_file.display()));
    report.detail(format!("sessions_file={}", paths.sessions_file.display()));

    Ok(report)
}
