use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};
use crate::warden::service::StopOutcome;

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    match manager.stop_service() {
        StopOutcome::Stopped { details } => {
            report.detail("service stopped");
            if !details.is_empty() {
                report.detail(details);
            }
        }
        StopOutcome::Failed { message } => report.issue(message),
    }

    Ok(report)
}
