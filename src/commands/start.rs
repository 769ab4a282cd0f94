use anyhow::Result;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::{CommandReport, manager_or_issue};
use crate::warden::events::{Event, EventKind, EventListener};
use crate::warden::service::StartOutcome;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub no_wait: bool,
}

/// Forwards the single terminal outcome of a start attempt to the waiting
/// command.
struct TerminalOutcomeListener {
    tx: Mutex<Sender<Event>>,
}

impl EventListener for TerminalOutcomeListener {
    fn on_event(&self, event: &Event) -> Result<()> {
        if matches!(
            event.kind,
            EventKind::ManualStartConfirmed
                | EventKind::ManualStartDuplicate
                | EventKind::ManualStartFailed
        ) && let Ok(tx) = self.tx.lock()
        {
            let _ = tx.send(event.clone());
        }
        Ok(())
    }
}

pub fn run(opts: &StartOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("start");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let (tx, rx) = mpsc::channel();
    let listener: Arc<dyn EventListener> = Arc::new(TerminalOutcomeListener {
        tx: Mutex::new(tx),
    });
    if !opts.no_wait {
        manager.register_event_listener(listener.clone());
    }

    match manager.start() {
        StartOutcome::Pending => report.detail("start already pending; not reissued"),
        StartOutcome::AlreadyRunning => {
            report.detail("service already running; duplicate start ignored")
        }
        StartOutcome::Failed { message } => report.issue(message),
        StartOutcome::Starting { details } => {
            report.detail("start issued; watcher supervising until confirmation");
            if !details.is_empty() {
                report.detail(details);
            }
            if opts.no_wait {
                report.detail("not waiting for confirmation (--no-wait)");
            } else {
                let deadline = Duration::from_secs(manager.config().start.timeout_secs + 5);
                match rx.recv_timeout(deadline) {
                    Ok(event) => match event.kind {
                        EventKind::ManualStartFailed => report.issue(event.message),
                        _ => report.detail(event.message),
                    },
                    Err(_) => {
                        report.issue("start watcher produced no outcome before the deadline")
                    }
                }
                manager.join_start_watcher();
            }
        }
    }

    manager.unregister_event_listener(&listener);
    Ok(report)
}
