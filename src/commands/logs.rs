use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};

pub fn run(lines: usize) -> Result<CommandReport> {
    let mut report = CommandReport::new("logs");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.logs(lines);
    if !reply.ok {
        report.issue(reply.message);
        return Ok(report);
    }

    report.detail(reply.message);
    for line in reply.logs.lines() {
        report.detail(line.to_string());
    }

    Ok(report)
}
