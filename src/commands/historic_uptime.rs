use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("historic-uptime");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.historic_uptime();
    if !reply.ok {
        report.issue(reply.message);
        return Ok(report);
    }

    report.detail(reply.message);
    report.detail(format!("total_uptime_hours={}", reply.total_uptime_hours));
    report.detail(format!("total_sessions={}", reply.total_sessions));
    report.detail(format!(
        "average_session_hours={}",
        reply.average_session_hours
    ));
    report.detail(format!(
        "longest_session_hours={}",
        reply.longest_session_hours
    ));
    for (date, hours) in &reply.uptime_by_day {
        report.detail(format!("uptime date={date} hours={hours}"));
    }

    Ok(report)
}
