use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};

pub fn run(lines: usize) -> Result<CommandReport> {
    let mut report = CommandReport::new("uptime-log");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.uptime_log(lines);
    if !reply.ok {
        report.issue(reply.message);
        return Ok(report);
    }

    report.detail(reply.message);
    for line in &reply.lines {
        report.detail(line.clone());
    }

    Ok(report)
}
