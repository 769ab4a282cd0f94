use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.status();
    report.detail(format!("status={}", reply.status));
    for line in reply.message.lines() {
        report.detail(line.to_string());
    }
    for container in &reply.containers {
        report.detail(format!(
            "container service={} state={} health={}",
            container.service, container.state, container.health
        ));
    }
    if let Some(error) = reply.error {
        report.issue(error);
    }

    Ok(report)
}
